#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Square N x N matrix over a flat row-major buffer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f32>,
}

impl SquareMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    /// Builds a matrix from a flat row-major buffer.
    /// Returns `None` when the buffer length is not `n * n`.
    pub fn from_raw(n: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != n * n {
            return None;
        }
        Some(Self { n, data })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.n + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.n + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.n..(row + 1) * self.n]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.n..(row + 1) * self.n]
    }

    pub fn row_sum(&self, row: usize) -> f32 {
        self.row(row).iter().sum()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    // Deserialized values may carry a buffer that disagrees with the
    // declared side; loaders check this before trusting indexing.
    pub(crate) fn well_formed(&self) -> bool {
        self.data.len() == self.n * self.n
    }

    /// New matrix of side `new_n` with `self` copied into the top-left
    /// block and the rest zero-filled.
    pub fn grown(&self, new_n: usize) -> Self {
        assert!(new_n >= self.n, "matrices only ever grow");
        let mut out = Self::zeros(new_n);
        for row in 0..self.n {
            out.data[row * new_n..row * new_n + self.n].copy_from_slice(self.row(row));
        }
        out
    }
}

/// F x N x N tensor: one N x N weight matrix per activation delay.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DelayTensor {
    depth: usize,
    n: usize,
    data: Vec<f32>,
}

impl DelayTensor {
    pub fn zeros(depth: usize, n: usize) -> Self {
        Self {
            depth,
            n,
            data: vec![0.0; depth * n * n],
        }
    }

    /// Builds a tensor from a flat buffer laid out delay-major.
    /// Returns `None` when the buffer length is not `depth * n * n`.
    pub fn from_raw(depth: usize, n: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != depth * n * n {
            return None;
        }
        Some(Self { depth, n, data })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, delay: usize, row: usize, col: usize) -> f32 {
        self.data[(delay * self.n + row) * self.n + col]
    }

    pub fn set(&mut self, delay: usize, row: usize, col: usize, value: f32) {
        self.data[(delay * self.n + row) * self.n + col] = value;
    }

    /// Outgoing weights of `row` at `delay`, one entry per target cell.
    pub fn row(&self, delay: usize, row: usize) -> &[f32] {
        let start = (delay * self.n + row) * self.n;
        &self.data[start..start + self.n]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn well_formed(&self) -> bool {
        self.data.len() == self.depth * self.n * self.n
    }

    /// New tensor with every delay slice grown to side `new_n`, old
    /// values in each slice's top-left block.
    pub fn grown(&self, new_n: usize) -> Self {
        assert!(new_n >= self.n, "tensors only ever grow");
        let mut out = Self::zeros(self.depth, new_n);
        for delay in 0..self.depth {
            for row in 0..self.n {
                let src = self.row(delay, row);
                let start = (delay * new_n + row) * new_n;
                out.data[start..start + self.n].copy_from_slice(src);
            }
        }
        out
    }
}

/// The three co-indexed synaptic tensors: co-activation counts, average
/// inter-activation delays, and per-delay connection weights.
///
/// Their leading cell dimension is kept identical at all times; growth
/// stages three fresh buffers and swaps them in together.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseStore {
    counts: SquareMatrix,
    times: SquareMatrix,
    weights: DelayTensor,
}

impl SynapseStore {
    pub fn new(depth: usize) -> Self {
        Self::with_cells(depth, 0)
    }

    pub fn with_cells(depth: usize, n: usize) -> Self {
        Self {
            counts: SquareMatrix::zeros(n),
            times: SquareMatrix::zeros(n),
            weights: DelayTensor::zeros(depth, n),
        }
    }

    /// Assembles a store from pre-built tensors.
    /// Returns `None` unless all three agree on the cell count.
    pub fn from_parts(counts: SquareMatrix, times: SquareMatrix, weights: DelayTensor) -> Option<Self> {
        if counts.n() != times.n() || times.n() != weights.n() {
            return None;
        }
        Some(Self {
            counts,
            times,
            weights,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.counts.n()
    }

    pub fn counts(&self) -> &SquareMatrix {
        &self.counts
    }

    pub fn times(&self) -> &SquareMatrix {
        &self.times
    }

    pub fn weights(&self) -> &DelayTensor {
        &self.weights
    }

    pub(crate) fn counts_mut(&mut self) -> &mut SquareMatrix {
        &mut self.counts
    }

    pub(crate) fn times_mut(&mut self) -> &mut SquareMatrix {
        &mut self.times
    }

    pub(crate) fn weights_mut(&mut self) -> &mut DelayTensor {
        &mut self.weights
    }

    /// Grows all three tensors to `new_n` cells, preserving existing
    /// values. All-or-nothing: the new buffers are fully built before
    /// any of the old ones is replaced.
    pub fn grow(&mut self, new_n: usize) {
        if new_n == self.cell_count() {
            return;
        }
        let counts = self.counts.grown(new_n);
        let times = self.times.grown(new_n);
        let weights = self.weights.grown(new_n);

        self.counts = counts;
        self.times = times;
        self.weights = weights;
    }
}
