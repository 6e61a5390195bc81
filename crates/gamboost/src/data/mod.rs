//! Packed Feature Store: bit-packed bin columns and their metadata.

pub mod dataset;
pub mod packed;

pub use dataset::{FeatureMeta, PackedDataset, PackedDatasetBuilder};
pub use packed::{BitWidth, PackedBins, PackedIter};
