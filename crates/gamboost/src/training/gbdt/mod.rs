//! Histogram-based tree growth.
//!
//! - [`histograms`] - bucket tables and their builders
//! - [`split`] - gain computation and the boundary sweep
//! - [`categorical`] - category ordering and bin sets
//! - [`tree`] - node arena and harvested trees
//! - [`grower`] - leaf-wise growth driver

pub mod categorical;
pub mod grower;
pub mod histograms;
pub mod split;
pub mod tree;

pub use categorical::{categorical_order, CatBitset};
pub use grower::{GrowerParams, GrowerParamsBuilder, TreeGrower};
pub use histograms::{
    build_histogram, build_histogram_chunked, build_pair_histogram, BucketRef, BucketSum, HistogramTable,
    DEFAULT_CHUNK_ROWS,
};
pub use split::{clean_gain, GainParams, SplitCandidate, SplitSweeper, NEGATIVE_GAIN_EPSILON};
pub use tree::{HarvestedLeaf, HarvestedTree, LeafBins, NodeId, NodeState, SplitDecision, SplitRecord, TreeArena};
