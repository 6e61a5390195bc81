//! gamboost: the compute core of a histogram-based boosting engine for
//! additive models.
//!
//! Three operations over pre-binned data:
//!
//! - histogram aggregation of row gradients per bin or bin pair
//!   ([`training::gbdt::histograms`]),
//! - leaf-wise growth of single-feature trees from those histograms
//!   ([`TreeGrower`]),
//! - pairwise interaction scoring ([`InteractionDetector`]).
//!
//! # Key Types
//!
//! - [`PackedDataset`] - bit-packed bin columns and feature metadata
//! - [`TrainingInputs`] / [`Objective`] - targets and the loss contract
//! - [`GrowerParams`] / [`InteractionParams`] - configuration builders
//! - [`MemoryBudget`] - byte accounting shared by every allocation
//! - [`CoreError`] - the four error kinds crossing the boundary
//!
//! Dataset loading, binning and the outer boosting loop live outside this
//! crate.

// Re-export approx traits for users who want to compare scores
pub use approx;

pub mod data;
pub mod error;
pub mod interaction;
pub mod memory;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use data::{FeatureMeta, PackedDataset, PackedDatasetBuilder};
pub use error::{CoreError, ErrorKind, Result};
pub use interaction::{InteractionDetector, InteractionParams, PairScore};
pub use memory::{MemoryBudget, Reservation};
pub use training::gbdt::{GainParams, GrowerParams, HarvestedTree, TreeGrower};
pub use training::{LearningType, Objective, Targets, TrainingInputs};
pub use utils::{run_with_threads, Parallelism};
