use std::io::{self, Read, Write};

use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cells::{CellIndex, CellNum};
use crate::network::{Network, NetworkConfig};
use crate::prng::Prng;
use crate::storage;
use crate::tensors::{DelayTensor, SquareMatrix, SynapseStore};

/// A complete, self-describing copy of a network's persistent state.
///
/// `cells` defines the dense index order; `intensities` is aligned
/// with it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkImage {
    pub config: NetworkConfig,
    pub cells: Vec<String>,
    pub intensities: Vec<f32>,
    pub counts: SquareMatrix,
    pub times: SquareMatrix,
    pub weights: DelayTensor,
    /// Activation history as dense indices, oldest first.
    pub history: Vec<CellNum>,
    /// Cells already written during the in-flight reinforcement event.
    /// Carried so a reloaded network resumes mid-event exactly where
    /// the saved one left off.
    pub modified: Vec<CellNum>,
    pub rng_state: u64,
    pub age_ticks: u64,
}

impl Network {
    /// Extracts a snapshot of everything needed to reconstruct this
    /// network.
    pub fn to_image(&self) -> NetworkImage {
        NetworkImage {
            config: *self.config(),
            cells: self.cell_names().to_vec(),
            intensities: self.intensities().to_vec(),
            counts: self.counts().clone(),
            times: self.times().clone(),
            weights: self.weights().clone(),
            history: self.history_cells().to_vec(),
            modified: self.modified_cells(),
            rng_state: self.rng().state(),
            age_ticks: self.age_ticks(),
        }
    }

    /// Reconstructs a network from a snapshot.
    ///
    /// This never fails. Inconsistent data degrades with a logged
    /// warning instead:
    /// - an invalid config falls back to defaults (keeping the seed),
    /// - tensors whose shapes disagree with each other, with the cell
    ///   count, or with the fire window are discarded and zero-filled,
    /// - intensities are padded/truncated to the cell count,
    /// - history entries that point past the cell count are dropped.
    pub fn from_image(image: NetworkImage) -> Network {
        let NetworkImage {
            config,
            cells,
            intensities: mut intensities_vec,
            counts,
            times,
            weights,
            history,
            modified,
            rng_state,
            age_ticks,
        } = image;

        let cfg = match config.validate() {
            Ok(()) => config,
            Err(msg) => {
                warn!(error = msg, "snapshot config invalid; using defaults");
                NetworkConfig {
                    seed: config.seed,
                    ..NetworkConfig::default()
                }
            }
        };

        let mut index = CellIndex::new();
        for name in &cells {
            index.register(name);
        }
        if index.len() != cells.len() {
            warn!(
                listed = cells.len(),
                distinct = index.len(),
                "snapshot repeats cell identifiers; keeping first occurrences"
            );
        }
        let n = index.len();

        if intensities_vec.len() != n {
            warn!(
                cells = n,
                intensities = intensities_vec.len(),
                "snapshot intensity list does not match the cell count; padding with zeros"
            );
            intensities_vec.resize(n, 0.0);
        }

        let depth = cfg.fire_window;
        let shapes_ok = counts.well_formed()
            && times.well_formed()
            && weights.well_formed()
            && counts.n() == n
            && times.n() == n
            && weights.n() == n
            && weights.depth() == depth;
        let synapses = if shapes_ok {
            SynapseStore::from_parts(counts, times, weights)
        } else {
            None
        };
        let synapses = synapses.unwrap_or_else(|| {
            warn!(
                cells = n,
                fire_window = depth,
                "snapshot tensor shapes are inconsistent; starting from zeroed tensors"
            );
            SynapseStore::with_cells(depth, n)
        });

        let valid_history: Vec<CellNum> = history.iter().copied().filter(|&c| c < n).collect();
        if valid_history.len() != history.len() {
            warn!("snapshot history references unknown cells; dropping those entries");
        }
        let start = valid_history.len().saturating_sub(depth);

        let valid_modified: Vec<CellNum> = modified.iter().copied().filter(|&c| c < n).collect();

        Network::from_loaded_parts(
            cfg,
            index,
            intensities_vec,
            synapses,
            &valid_history[start..],
            &valid_modified,
            Prng::from_state(rng_state),
            age_ticks,
        )
    }

    /// Serialize a versioned, chunked network image.
    pub fn save_image_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.to_image().write_to(w)
    }

    /// Load a versioned, chunked network image.
    ///
    /// Unknown chunks are skipped for forward-compatibility. Malformed
    /// bytes are I/O errors; tensor-shape inconsistencies are not (see
    /// [`Network::from_image`]).
    pub fn load_image_from<R: Read>(r: &mut R) -> io::Result<Self> {
        NetworkImage::read_from(r).map(Network::from_image)
    }

    pub fn save_image_bytes(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save_image_to(&mut out)?;
        Ok(out)
    }

    pub fn load_image_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = io::Cursor::new(bytes);
        Self::load_image_from(&mut cursor)
    }

    /// Exact serialized size in bytes for the current network image.
    pub fn image_size_bytes(&self) -> io::Result<usize> {
        let mut cw = storage::CountingWriter::new();
        self.save_image_to(&mut cw)?;
        Ok(cw.written())
    }
}

impl NetworkImage {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;

        storage::write_chunk(w, *b"CFG0", &self.cfg_payload())?;

        let mut prng = Vec::new();
        storage::write_u64_le(&mut prng, self.rng_state)?;
        storage::write_chunk(w, *b"PRNG", &prng)?;

        let mut tick = Vec::new();
        storage::write_u64_le(&mut tick, self.age_ticks)?;
        storage::write_chunk(w, *b"TICK", &tick)?;

        let mut cell = Vec::new();
        storage::write_u32_le(&mut cell, self.cells.len() as u32)?;
        for name in &self.cells {
            storage::write_string(&mut cell, name)?;
        }
        storage::write_chunk(w, *b"CELL", &cell)?;

        let mut ints = Vec::new();
        storage::write_u32_le(&mut ints, self.intensities.len() as u32)?;
        ints.extend_from_slice(&storage::f32_slice_bytes(&self.intensities));
        storage::write_chunk(w, *b"INTS", &ints)?;

        let mut hist = Vec::new();
        storage::write_u32_le(&mut hist, self.history.len() as u32)?;
        for &cell_num in &self.history {
            storage::write_u32_le(&mut hist, cell_num as u32)?;
        }
        storage::write_chunk(w, *b"HIST", &hist)?;

        let mut mods = Vec::new();
        storage::write_u32_le(&mut mods, self.modified.len() as u32)?;
        for &cell_num in &self.modified {
            storage::write_u32_le(&mut mods, cell_num as u32)?;
        }
        storage::write_chunk(w, *b"MODS", &mods)?;

        // The three tensors dominate the image; compress them.
        storage::write_chunk_lz4(w, *b"CNTS", &matrix_payload(&self.counts))?;
        storage::write_chunk_lz4(w, *b"TIME", &matrix_payload(&self.times))?;
        storage::write_chunk_lz4(w, *b"WGHT", &tensor_payload(&self.weights))?;

        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad network image magic",
            ));
        }

        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_V1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported network image version",
            ));
        }

        let mut config: Option<NetworkConfig> = None;
        let mut rng_state: Option<u64> = None;
        let mut age_ticks: Option<u64> = None;
        let mut cells: Option<Vec<String>> = None;
        let mut intensities: Option<Vec<f32>> = None;
        let mut history: Option<Vec<CellNum>> = None;
        let mut modified: Option<Vec<CellNum>> = None;
        let mut counts: Option<SquareMatrix> = None;
        let mut times: Option<SquareMatrix> = None;
        let mut weights: Option<DelayTensor> = None;

        loop {
            let (tag, len) = match storage::read_chunk_header(r) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            let mut body = vec![0u8; len as usize];
            r.read_exact(&mut body)?;
            let mut cursor = io::Cursor::new(body.as_slice());

            match &tag {
                b"CFG0" => {
                    config = Some(read_cfg_payload(&mut cursor)?);
                }
                b"PRNG" => {
                    rng_state = Some(storage::read_u64_le(&mut cursor)?);
                }
                b"TICK" => {
                    age_ticks = Some(storage::read_u64_le(&mut cursor)?);
                }
                b"CELL" => {
                    let count = storage::read_u32_le(&mut cursor)? as usize;
                    let mut names = Vec::with_capacity(count);
                    for _ in 0..count {
                        names.push(storage::read_string(&mut cursor)?);
                    }
                    let mut distinct = CellIndex::new();
                    for name in &names {
                        distinct.register(name);
                    }
                    if distinct.len() != names.len() {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "duplicate cell identifier",
                        ));
                    }
                    cells = Some(names);
                }
                b"INTS" => {
                    let count = storage::read_u32_le(&mut cursor)? as usize;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(storage::read_f32_le(&mut cursor)?);
                    }
                    intensities = Some(values);
                }
                b"HIST" => {
                    let count = storage::read_u32_le(&mut cursor)? as usize;
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        entries.push(storage::read_u32_le(&mut cursor)? as CellNum);
                    }
                    history = Some(entries);
                }
                b"MODS" => {
                    let count = storage::read_u32_le(&mut cursor)? as usize;
                    let mut entries = Vec::with_capacity(count);
                    for _ in 0..count {
                        entries.push(storage::read_u32_le(&mut cursor)? as CellNum);
                    }
                    modified = Some(entries);
                }
                b"CNTS" => {
                    counts = Some(matrix_from_payload(&storage::read_chunk_lz4(&body)?)?);
                }
                b"TIME" => {
                    times = Some(matrix_from_payload(&storage::read_chunk_lz4(&body)?)?);
                }
                b"WGHT" => {
                    weights = Some(tensor_from_payload(&storage::read_chunk_lz4(&body)?)?);
                }
                _ => {
                    // Unknown chunk: skip.
                }
            }
        }

        let config =
            config.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing CFG0"))?;
        let cells =
            cells.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing CELL"))?;
        let intensities = intensities
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing INTS"))?;

        let n = cells.len();
        let depth = config.fire_window;
        Ok(Self {
            config,
            cells,
            intensities,
            counts: counts.unwrap_or_else(|| SquareMatrix::zeros(n)),
            times: times.unwrap_or_else(|| SquareMatrix::zeros(n)),
            weights: weights.unwrap_or_else(|| DelayTensor::zeros(depth, n)),
            history: history.unwrap_or_default(),
            modified: modified.unwrap_or_default(),
            rng_state: rng_state.unwrap_or(0),
            age_ticks: age_ticks.unwrap_or(0),
        })
    }

    fn cfg_payload(&self) -> Vec<u8> {
        let c = &self.config;
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(&(c.fire_window as u32).to_le_bytes());
        out.extend_from_slice(&c.learn_threshold.to_le_bytes());
        out.extend_from_slice(&c.forget_rate.to_le_bytes());
        out.extend_from_slice(&c.stiffness.to_le_bytes());
        out.extend_from_slice(&c.recency_bonus.to_le_bytes());
        out.extend_from_slice(&c.percept_bonus.to_le_bytes());
        out.extend_from_slice(&c.reflex_bonus.to_le_bytes());
        out.extend_from_slice(&(u32::from(c.seed.is_some())).to_le_bytes());
        out.extend_from_slice(&c.seed.unwrap_or(0).to_le_bytes());
        out
    }

    /// Serialize to a JSON string.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse from a JSON string.
    #[cfg(feature = "serde")]
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

fn read_cfg_payload<R: Read>(r: &mut R) -> io::Result<NetworkConfig> {
    let fire_window = storage::read_u32_le(r)? as usize;
    let learn_threshold = storage::read_f32_le(r)?;
    let forget_rate = storage::read_f32_le(r)?;
    let stiffness = storage::read_f32_le(r)?;
    let recency_bonus = storage::read_f32_le(r)?;
    let percept_bonus = storage::read_f32_le(r)?;
    let reflex_bonus = storage::read_f32_le(r)?;
    let seed_present = storage::read_u32_le(r)?;
    let seed = storage::read_u64_le(r)?;

    Ok(NetworkConfig {
        fire_window,
        learn_threshold,
        forget_rate,
        stiffness,
        recency_bonus,
        percept_bonus,
        reflex_bonus,
        seed: if seed_present != 0 { Some(seed) } else { None },
    })
}

fn matrix_payload(m: &SquareMatrix) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + m.as_slice().len() * 4);
    out.extend_from_slice(&(m.n() as u32).to_le_bytes());
    out.extend_from_slice(&storage::f32_slice_bytes(m.as_slice()));
    out
}

fn matrix_from_payload(payload: &[u8]) -> io::Result<SquareMatrix> {
    if payload.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "matrix payload truncated",
        ));
    }
    let n = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let data = storage::f32_vec_from_bytes(&payload[4..])?;
    SquareMatrix::from_raw(n, data)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "matrix payload size mismatch"))
}

fn tensor_payload(t: &DelayTensor) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + t.as_slice().len() * 4);
    out.extend_from_slice(&(t.depth() as u32).to_le_bytes());
    out.extend_from_slice(&(t.n() as u32).to_le_bytes());
    out.extend_from_slice(&storage::f32_slice_bytes(t.as_slice()));
    out
}

fn tensor_from_payload(payload: &[u8]) -> io::Result<DelayTensor> {
    if payload.len() < 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "tensor payload truncated",
        ));
    }
    let depth = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let n = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;
    let data = storage::f32_vec_from_bytes(&payload[8..])?;
    DelayTensor::from_raw(depth, n, data)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "tensor payload size mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained_net() -> Network {
        let cfg = NetworkConfig::default()
            .with_seed(99)
            .with_learning(2.0, 0.05);
        let mut net = Network::new(cfg);
        net.grow(&["light", "tone", "reward"]);

        for _ in 0..3 {
            net.reinforce("light", "reward", 0, 0.8).unwrap();
        }
        net.update(&["light"], &[]).unwrap();
        net.update(&["tone"], &["reward"]).unwrap();
        net
    }

    #[test]
    fn binary_roundtrip_is_lossless() {
        let net = trained_net();
        let bytes = net.save_image_bytes().unwrap();
        let loaded = Network::load_image_bytes(&bytes).unwrap();

        assert_eq!(loaded.cell_names(), net.cell_names());
        assert_eq!(loaded.counts(), net.counts());
        assert_eq!(loaded.times(), net.times());
        assert_eq!(loaded.weights(), net.weights());
        assert_eq!(loaded.recent_activations(), net.recent_activations());
        assert_eq!(loaded.age_ticks(), net.age_ticks());
        for id in ["light", "tone", "reward"] {
            assert_eq!(loaded.intensity(id), net.intensity(id));
        }
    }

    #[test]
    fn roundtrip_resumes_the_rng_sequence() {
        let mut net = trained_net();
        let bytes = net.save_image_bytes().unwrap();
        let mut loaded = Network::load_image_bytes(&bytes).unwrap();

        for _ in 0..20 {
            let a = net.update(&["light"], &[]).unwrap();
            let b = loaded.update(&["light"], &[]).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn image_size_matches_serialized_length() {
        let net = trained_net();
        let bytes = net.save_image_bytes().unwrap();
        assert_eq!(net.image_size_bytes().unwrap(), bytes.len());
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let net = trained_net();
        let mut bytes = net.save_image_bytes().unwrap();
        storage::write_chunk(&mut bytes, *b"WHAT", &[1, 2, 3, 4, 5]).unwrap();

        let loaded = Network::load_image_bytes(&bytes).unwrap();
        assert_eq!(loaded.cell_names(), net.cell_names());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = Network::load_image_bytes(b"NOTANIMG....").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn mismatched_tensor_shapes_degrade_to_zeroed_tensors() {
        let net = trained_net();
        let n = net.cell_count();
        let mut image = net.to_image();
        assert!(image.counts.as_slice().iter().any(|&v| v != 0.0));

        // A counts matrix of the wrong size poisons all three tensors.
        image.counts = SquareMatrix::zeros(n + 2);
        let loaded = Network::from_image(image);

        assert_eq!(loaded.cell_count(), n);
        assert!(loaded.counts().as_slice().iter().all(|&v| v == 0.0));
        assert!(loaded.times().as_slice().iter().all(|&v| v == 0.0));
        assert!(loaded.weights().as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(loaded.counts().n(), n);
        assert_eq!(loaded.weights().depth(), loaded.config().fire_window);

        // Intensities survive the fallback.
        for id in ["light", "tone", "reward"] {
            assert_eq!(loaded.intensity(id), net.intensity(id));
        }
    }

    #[test]
    fn wrong_weight_depth_also_degrades() {
        let net = trained_net();
        let n = net.cell_count();
        let mut image = net.to_image();
        image.weights = DelayTensor::zeros(net.config().fire_window + 1, n);

        let loaded = Network::from_image(image);
        assert!(loaded.counts().as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(loaded.weights().depth(), loaded.config().fire_window);
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let net = trained_net();
        let mut image = net.to_image();
        image.config.fire_window = 0;

        let loaded = Network::from_image(image);
        let defaults = NetworkConfig::default();
        assert_eq!(loaded.config().fire_window, defaults.fire_window);
        assert_eq!(loaded.config().seed, Some(99));
    }

    #[test]
    fn intensity_length_mismatch_is_padded() {
        let net = trained_net();
        let mut image = net.to_image();
        image.intensities.pop();

        let loaded = Network::from_image(image);
        assert_eq!(loaded.cell_count(), net.cell_count());
        assert_eq!(loaded.intensity("reward"), 0.0);
    }

    #[test]
    fn out_of_range_history_entries_are_dropped() {
        let net = trained_net();
        let mut image = net.to_image();
        image.history.push(999);

        let loaded = Network::from_image(image);
        assert!(loaded
            .recent_activations()
            .iter()
            .all(|name| ["light", "tone", "reward"].contains(name)));
    }

    #[test]
    fn duplicate_cells_in_binary_image_are_rejected() {
        let net = trained_net();
        let mut image = net.to_image();
        image.cells[1] = image.cells[0].clone();

        let mut bytes = Vec::new();
        image.write_to(&mut bytes).unwrap();
        let err = Network::load_image_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_roundtrip_matches_binary() {
        let net = trained_net();
        let image = net.to_image();

        let json = image.to_json().unwrap();
        let parsed = NetworkImage::from_json(&json).unwrap();
        let loaded = Network::from_image(parsed);

        assert_eq!(loaded.cell_names(), net.cell_names());
        assert_eq!(loaded.counts(), net.counts());
        assert_eq!(loaded.weights(), net.weights());
        assert_eq!(loaded.intensity("light"), net.intensity("light"));
    }
}
