//! # hebnet
//!
//! A hebbian-inspired associative memory over named concept cells.
//!
//! The network spreads activation among cells through delay-indexed
//! synaptic weights, elects one activated cell per tick with a
//! weighted lottery, and reinforces connections only when the winner
//! was externally triggered (a percept or reflex). Internally
//! generated "thought flow" never rewrites synapses; that distinction
//! is what the learning rule is built around.
//!
//! ## Quick Start
//!
//! ```
//! use hebnet::prelude::*;
//!
//! let cfg = NetworkConfig::default().with_seed(42);
//! let mut net = Network::new(cfg);
//!
//! // Cells are created by the caller before they are referenced.
//! net.grow(&["light", "reward"]);
//!
//! // One tick: "light" is perceived.
//! let winner = net.update(&["light"], &[]).unwrap();
//! assert_eq!(winner.as_deref(), Some("light"));
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): serde derives on configs, tensors, and
//!   [`image::NetworkImage`], plus its JSON helpers
//!
//! ## Modules
//!
//! - [`network`]: the network itself (tick update, reinforcement, growth)
//! - [`cells`]: identifier-to-index interning
//! - [`tensors`]: the co-indexed synaptic tensors
//! - [`select`]: the weighted selection lottery
//! - [`image`]: snapshots and the chunked binary image format
//! - [`observer`]: read-only observation adapters

#[path = "core/cells.rs"]
pub mod cells;

#[path = "core/image.rs"]
pub mod image;

#[path = "core/network.rs"]
pub mod network;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/select.rs"]
pub mod select;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/tensors.rs"]
pub mod tensors;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use hebnet::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cells::{CellIndex, CellNum};
    pub use crate::image::NetworkImage;
    pub use crate::network::{Diagnostics, Network, NetworkConfig, NetworkError};
    pub use crate::tensors::{DelayTensor, SquareMatrix, SynapseStore};
}
