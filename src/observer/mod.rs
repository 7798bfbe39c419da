use crate::network::{Diagnostics, Network};

/// A read-only snapshot of what the network currently holds.
///
/// Design intent:
/// - Observers cannot mutate or steer the network.
/// - Snapshotting is *on-demand* and can allocate; the tick loop stays
///   unchanged.
#[derive(Debug, Clone)]
pub struct NetworkSnapshot {
    pub age_ticks: u64,
    pub diagnostics: Diagnostics,

    /// Recently activated cells, oldest first.
    pub recent_activations: Vec<String>,

    /// Every known cell with its current intensity, in index order.
    pub intensities: Vec<(String, f32)>,
}

pub struct NetworkAdapter<'a> {
    network: &'a Network,
}

impl<'a> NetworkAdapter<'a> {
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let net = self.network;

        NetworkSnapshot {
            age_ticks: net.age_ticks(),
            diagnostics: net.diagnostics(),
            recent_activations: net
                .recent_activations()
                .into_iter()
                .map(str::to_string)
                .collect(),
            intensities: net
                .cell_names()
                .iter()
                .map(|name| (name.clone(), net.intensity(name)))
                .collect(),
        }
    }

    /// Learned association strengths from `from` toward every other
    /// cell at `delay`, strongest magnitude first. Handy for inspecting
    /// what a cell predicts (e.g. how strongly "success" points at a
    /// reward cell).
    pub fn strongest_associations(&self, from: &str, delay: usize, top_n: usize) -> Vec<(String, f32)> {
        let net = self.network;
        let Some(source) = net.cell_index(from) else {
            return Vec::new();
        };
        if delay >= net.config().fire_window {
            return Vec::new();
        }

        let mut out: Vec<(String, f32)> = net
            .weights()
            .row(delay, source)
            .iter()
            .enumerate()
            .filter(|(_, &w)| w != 0.0)
            .filter_map(|(target, &w)| net.cell_name(target).map(|name| (name.to_string(), w)))
            .collect();

        out.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        out.truncate(top_n);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkConfig;

    fn observed_net() -> Network {
        let cfg = NetworkConfig::default()
            .with_seed(31)
            .with_learning(1.0, 0.0);
        let mut net = Network::new(cfg);
        net.grow(&["success", "fail", "reward"]);
        net.reinforce("success", "reward", 0, 0.9).unwrap();
        net.reinforce("success", "reward", 0, 0.9).unwrap();
        net.update(&["success"], &[]).unwrap();
        net
    }

    #[test]
    fn snapshot_reflects_network_state() {
        let net = observed_net();
        let snap = NetworkAdapter::new(&net).snapshot();

        assert_eq!(snap.age_ticks, 1);
        assert_eq!(snap.diagnostics.cell_count, 3);
        assert_eq!(snap.recent_activations, vec!["success"]);
        assert_eq!(snap.intensities.len(), 3);
        assert_eq!(snap.intensities[0].0, "success");
        assert_eq!(snap.intensities[0].1, 1.0);
    }

    #[test]
    fn strongest_associations_rank_by_magnitude() {
        let net = observed_net();
        let adapter = NetworkAdapter::new(&net);

        let assocs = adapter.strongest_associations("success", 0, 5);
        assert_eq!(assocs.len(), 1);
        assert_eq!(assocs[0].0, "reward");
        assert!(assocs[0].1 > 0.0);

        assert!(adapter.strongest_associations("ghost", 0, 5).is_empty());
        assert!(adapter.strongest_associations("success", 99, 5).is_empty());
    }
}
