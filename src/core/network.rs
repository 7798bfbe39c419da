use hashbrown::{HashMap, HashSet};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cells::{CellIndex, CellNum};
use crate::prng::Prng;
use crate::select;
use crate::tensors::{DelayTensor, SquareMatrix, SynapseStore};

/// Tunables for a [`Network`], fixed at construction.
///
/// These were process-wide globals in earlier incarnations of the
/// model; here they travel with the instance so independent networks
/// can be tuned independently.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkConfig {
    /// Length of the activation history, and the delay depth of the
    /// weight tensor.
    pub fire_window: usize,

    /// Co-activation count a cell pair must accumulate before its
    /// weights start moving (the consolidation gate).
    pub learn_threshold: f32,

    /// Fraction of a cell's total outgoing count decayed on each
    /// reinforcement of that cell.
    pub forget_rate: f32,

    /// Exponent applied to candidate magnitudes in the selection
    /// lottery. 1.0 keeps selection probability proportional to
    /// `|strength|`; higher values sharpen toward the strongest
    /// candidate.
    pub stiffness: f32,

    /// Eligibility bonus for the most recently activated cell.
    pub recency_bonus: f32,

    /// Eligibility bonus for perceived cells.
    pub percept_bonus: f32,

    /// Eligibility bonus for reflex cells. Large, so reflex-sourced
    /// candidates dominate the draw.
    pub reflex_bonus: f32,

    // If set, makes behavior reproducible for evaluation.
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            fire_window: 5,
            learn_threshold: 10.0,
            forget_rate: 0.1,
            stiffness: 1.0,
            recency_bonus: 0.5,
            percept_bonus: 1.0,
            reflex_bonus: 10.0,
            seed: None,
        }
    }
}

impl NetworkConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_fire_window(mut self, fire_window: usize) -> Self {
        self.fire_window = fire_window;
        self
    }

    pub fn with_learning(mut self, threshold: f32, forget_rate: f32) -> Self {
        self.learn_threshold = threshold;
        self.forget_rate = forget_rate;
        self
    }

    pub fn with_stiffness(mut self, stiffness: f32) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.fire_window == 0 {
            return Err("fire_window must be at least 1");
        }
        if !(self.learn_threshold > 0.0) {
            return Err("learn_threshold must be positive");
        }
        if !(0.0..1.0).contains(&self.forget_rate) {
            return Err("forget_rate must be in [0, 1)");
        }
        if !(self.stiffness > 0.0) {
            return Err("stiffness must be positive");
        }
        if self.recency_bonus < 0.0 || self.percept_bonus < 0.0 || self.reflex_bonus < 0.0 {
            return Err("eligibility bonuses must be non-negative");
        }
        Ok(())
    }
}

/// Caller-bug errors surfaced by [`Network`] operations.
///
/// Shape problems in loaded snapshots are deliberately NOT here: those
/// degrade to zeroed tensors with a logged warning (see
/// [`Network::from_image`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// An identifier was referenced without being registered first.
    #[error("unknown cell `{0}`")]
    UnknownCell(String),
}

/// Bounded, oldest-first log of recently activated cells.
///
/// A push shifts everything toward the front and appends at the back;
/// the front entry is evicted once the log is full. An entry's position
/// from the front is the `delay` used to index the weight tensor.
#[derive(Debug, Clone)]
struct ActivationLog {
    entries: Vec<CellNum>,
    capacity: usize,
}

impl ActivationLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, cell: CellNum) {
        if self.entries.len() == self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(cell);
    }

    fn last(&self) -> Option<CellNum> {
        self.entries.last().copied()
    }

    fn as_slice(&self) -> &[CellNum] {
        &self.entries
    }

    fn iter_with_delay(&self) -> impl Iterator<Item = (usize, CellNum)> + '_ {
        self.entries.iter().copied().enumerate()
    }
}

/// Read-only summary counters, cheap enough to compute on demand.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub cell_count: usize,
    /// Cell pairs whose co-activation count has passed the learning
    /// threshold.
    pub confirmed_pairs: usize,
    pub avg_intensity: f32,
    pub history_len: usize,
}

/// A hebbian-inspired associative memory over named concept cells.
///
/// Spreading activation picks one "activated" cell per tick via a
/// weighted lottery; connections are reinforced only when the winner
/// was externally triggered (percept or reflex), never by internal
/// thought flow alone.
#[derive(Debug, Clone)]
pub struct Network {
    cfg: NetworkConfig,

    cells: CellIndex,

    // Per-cell truth-like activation in [-1, 1], indexed by CellNum.
    intensities: Vec<f32>,

    synapses: SynapseStore,

    history: ActivationLog,

    // Cells whose intensity was already written during the current
    // reinforcement-triggering event. Distinguishes real perception
    // from the flow of thought: reset only when an exogenous winner
    // fires, not on every tick.
    modified: HashSet<CellNum>,

    rng: Prng,

    age_ticks: u64,
}

impl Network {
    /// Creates an empty network.
    ///
    /// # Panics
    /// Panics when the configuration is invalid (see
    /// [`NetworkConfig::validate`]); that is a programmer error, not a
    /// runtime condition.
    pub fn new(cfg: NetworkConfig) -> Self {
        if let Err(msg) = cfg.validate() {
            panic!("invalid network config: {msg}");
        }

        Self {
            synapses: SynapseStore::new(cfg.fire_window),
            history: ActivationLog::new(cfg.fire_window),
            rng: Prng::new(cfg.seed.unwrap_or(1)),
            cfg,
            cells: CellIndex::new(),
            intensities: Vec::new(),
            modified: HashSet::new(),
            age_ticks: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_loaded_parts(
        cfg: NetworkConfig,
        cells: CellIndex,
        intensities: Vec<f32>,
        synapses: SynapseStore,
        history_cells: &[CellNum],
        modified_cells: &[CellNum],
        rng: Prng,
        age_ticks: u64,
    ) -> Self {
        let mut history = ActivationLog::new(cfg.fire_window);
        for &cell in history_cells {
            history.push(cell);
        }
        Self {
            cfg,
            cells,
            intensities,
            synapses,
            history,
            modified: modified_cells.iter().copied().collect(),
            rng,
            age_ticks,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.cfg
    }

    /// Registers every unseen identifier in `ids`, giving each a
    /// default intensity of 0, and grows all three synaptic tensors in
    /// one swap. Already-known identifiers are left untouched.
    pub fn grow(&mut self, ids: &[&str]) {
        for id in ids {
            let num = self.cells.register(id);
            if num == self.intensities.len() {
                self.intensities.push(0.0);
            }
        }
        self.synapses.grow(self.cells.len());
    }

    /// Runs one simulation tick and returns the newly activated cell,
    /// or `None` when no candidate was eligible (a no-op tick: nothing
    /// is recorded, nothing is reinforced).
    ///
    /// Every identifier in `percepts` and `reflexes` must already be
    /// registered; anything else is a caller bug reported as
    /// [`NetworkError::UnknownCell`] before any state changes.
    pub fn update(
        &mut self,
        percepts: &[&str],
        reflexes: &[&str],
    ) -> Result<Option<String>, NetworkError> {
        let percepts = self.resolve_distinct(percepts)?;
        let reflexes = self.resolve_distinct(reflexes)?;

        self.age_ticks = self.age_ticks.wrapping_add(1);

        let mut eligibility: HashMap<CellNum, f32> = HashMap::new();
        let mut pending: HashMap<CellNum, f32> = HashMap::new();

        // Propagation along learned per-delay weights. Each history
        // cell pushes its targets toward the sign and magnitude of the
        // propagated strength, saturating near +-1.
        for (delay, source) in self.history.iter_with_delay() {
            let intensity = self.intensities[source];
            if intensity == 0.0 {
                continue;
            }
            let row = self.synapses.weights().row(delay, source);
            for (target, &w) in row.iter().enumerate() {
                let strength = intensity * w;
                if strength == 0.0 {
                    continue;
                }
                *eligibility.entry(target).or_default() += strength.abs();
                *pending.entry(target).or_default() +=
                    strength - strength.abs() * self.intensities[target];
            }
        }

        // Recency: the most recently activated cell stays a little
        // eligible on its own.
        if let Some(last) = self.history.last() {
            *eligibility.entry(last).or_default() += self.cfg.recency_bonus;
            *pending.entry(last).or_default() +=
                self.cfg.recency_bonus * (1.0 - self.intensities[last]);
        }

        // Perception.
        for &cell in &percepts {
            *eligibility.entry(cell).or_default() += self.cfg.percept_bonus;
            *pending.entry(cell).or_default() +=
                self.cfg.percept_bonus * (1.0 - self.intensities[cell]);
        }

        // Reflexes: much larger eligibility, same intensity pull.
        for &cell in &reflexes {
            *eligibility.entry(cell).or_default() += self.cfg.reflex_bonus;
            *pending.entry(cell).or_default() +=
                self.cfg.percept_bonus * (1.0 - self.intensities[cell]);
        }

        // Stochastic election. Candidates are sorted by index so the
        // draw is reproducible under a fixed seed regardless of map
        // iteration order.
        let mut candidates: Vec<(CellNum, f32)> =
            eligibility.iter().map(|(&c, &v)| (c, v)).collect();
        candidates.sort_unstable_by_key(|&(cell, _)| cell);

        let Some(winner) = select::draw_weighted(&mut self.rng, &candidates, self.cfg.stiffness)
        else {
            return Ok(None);
        };

        // Hebbian reinforcement happens only when the activation was
        // exogenously grounded. Internal thought flow never rewrites
        // synapses.
        let exogenous = percepts.contains(&winner) || reflexes.contains(&winner);
        if exogenous {
            self.modified.clear();
            let trace: Vec<(usize, CellNum)> = self.history.iter_with_delay().collect();
            for (delay, source) in trace {
                let correlation = self.intensities[winner] * self.intensities[source];
                self.reinforce_by_num(source, winner, delay, correlation);
            }
        }

        self.history.push(winner);

        // Commit pending intensities, once per cell per reinforcement
        // event.
        for (cell, value) in pending {
            if self.modified.insert(cell) {
                self.intensities[cell] = value.clamp(-1.0, 1.0);
            }
        }

        let name = self
            .cells
            .name(winner)
            .expect("winner came from the eligibility map");
        Ok(Some(name.to_string()))
    }

    /// Reinforces the connection from `cell1` to `cell2` observed at
    /// `delay` ticks apart, with `correlation` as the learning target.
    ///
    /// Counts decay row-wide, grow by one observation while below the
    /// learning threshold, and saturate at it; the average delay is
    /// folded in by incremental mean; the weight moves only once the
    /// pair's count has reached the threshold.
    ///
    /// # Panics
    /// Panics when `delay` is outside the fire window (caller bug, the
    /// same class as a negative delay).
    pub fn reinforce(
        &mut self,
        cell1: &str,
        cell2: &str,
        delay: usize,
        correlation: f32,
    ) -> Result<(), NetworkError> {
        let c1 = self.require(cell1)?;
        let c2 = self.require(cell2)?;
        assert!(
            delay < self.cfg.fire_window,
            "delay {delay} outside the fire window"
        );
        self.reinforce_by_num(c1, c2, delay, correlation.clamp(-1.0, 1.0));
        Ok(())
    }

    fn reinforce_by_num(&mut self, c1: CellNum, c2: CellNum, delay: usize, correlation: f32) {
        let n = self.synapses.counts().get(c1, c2);
        let t = self.synapses.times().get(c1, c2);

        // Decay the whole outgoing row in proportion to the cell's
        // total activity, never below zero.
        let z = self.cfg.forget_rate * self.synapses.counts().row_sum(c1);
        for v in self.synapses.counts_mut().row_mut(c1) {
            *v = (*v - z).max(0.0);
        }

        let pair = self.synapses.counts().get(c1, c2);
        let threshold = self.cfg.learn_threshold;
        let grown = if pair + z + 1.0 > threshold {
            // Saturated: give back the decay, no further net growth.
            // Pinning at the threshold keeps the consolidation gate
            // open despite float drift in the decay arithmetic.
            (pair + z).max(threshold)
        } else {
            pair + z + 1.0
        };
        self.synapses.counts_mut().set(c1, c2, grown);

        // Incremental mean of the observed delay.
        self.synapses
            .times_mut()
            .set(c1, c2, (n * t + delay as f32) / (n + 1.0));

        // Consolidation gate: unconfirmed pairs leave weights alone.
        if self.synapses.counts().get(c1, c2) >= threshold {
            let w = self.synapses.weights().get(delay, c1, c2);
            self.synapses
                .weights_mut()
                .set(delay, c1, c2, w + correlation - correlation.abs() * w);
        }
    }

    fn require(&self, id: &str) -> Result<CellNum, NetworkError> {
        self.cells
            .get(id)
            .ok_or_else(|| NetworkError::UnknownCell(id.to_string()))
    }

    fn resolve_distinct(&self, ids: &[&str]) -> Result<Vec<CellNum>, NetworkError> {
        let mut nums = Vec::with_capacity(ids.len());
        for id in ids {
            let num = self.require(id)?;
            if !nums.contains(&num) {
                nums.push(num);
            }
        }
        Ok(nums)
    }

    // ------------------------------------------------------------------
    // Read accessors. None of these are needed for the network to run;
    // they exist for reporting and analysis layers.
    // ------------------------------------------------------------------

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cells.contains(id)
    }

    pub fn cell_index(&self, id: &str) -> Option<CellNum> {
        self.cells.get(id)
    }

    pub fn cell_name(&self, num: CellNum) -> Option<&str> {
        self.cells.name(num)
    }

    /// All identifiers in dense index order.
    pub fn cell_names(&self) -> &[String] {
        self.cells.names()
    }

    /// Current intensity of `id`, 0.0 for unseen cells.
    pub fn intensity(&self, id: &str) -> f32 {
        self.cells
            .get(id)
            .map(|num| self.intensities[num])
            .unwrap_or(0.0)
    }

    pub(crate) fn intensities(&self) -> &[f32] {
        &self.intensities
    }

    pub fn counts(&self) -> &SquareMatrix {
        self.synapses.counts()
    }

    pub fn times(&self) -> &SquareMatrix {
        self.synapses.times()
    }

    pub fn weights(&self) -> &DelayTensor {
        self.synapses.weights()
    }

    /// Learned weight from `from` toward `to` at `delay`, if both cells
    /// exist and the delay is inside the fire window.
    pub fn association(&self, from: &str, to: &str, delay: usize) -> Option<f32> {
        if delay >= self.cfg.fire_window {
            return None;
        }
        let c1 = self.cells.get(from)?;
        let c2 = self.cells.get(to)?;
        Some(self.synapses.weights().get(delay, c1, c2))
    }

    /// Recently activated cells, oldest first.
    pub fn recent_activations(&self) -> Vec<&str> {
        self.history
            .as_slice()
            .iter()
            .filter_map(|&num| self.cells.name(num))
            .collect()
    }

    pub(crate) fn history_cells(&self) -> &[CellNum] {
        self.history.as_slice()
    }

    /// Cells written during the current reinforcement event, in index
    /// order so snapshots are deterministic.
    pub(crate) fn modified_cells(&self) -> Vec<CellNum> {
        let mut out: Vec<CellNum> = self.modified.iter().copied().collect();
        out.sort_unstable();
        out
    }

    pub(crate) fn rng(&self) -> &Prng {
        &self.rng
    }

    pub fn age_ticks(&self) -> u64 {
        self.age_ticks
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let n = self.cells.len();
        let confirmed_pairs = self
            .synapses
            .counts()
            .as_slice()
            .iter()
            .filter(|&&c| c >= self.cfg.learn_threshold)
            .count();
        let avg_intensity = if n == 0 {
            0.0
        } else {
            self.intensities.iter().sum::<f32>() / n as f32
        };
        Diagnostics {
            cell_count: n,
            confirmed_pairs,
            avg_intensity,
            history_len: self.history.as_slice().len(),
        }
    }
}
