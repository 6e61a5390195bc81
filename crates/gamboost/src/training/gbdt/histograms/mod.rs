//! Histogram bucket tables for tree growth and interaction scoring.
//!
//! - [`table`] - the bucket table itself and bucket sums
//! - [`ops`] - 1-D, 2-D and row-chunked builders
//!
//! Buckets use `f64` sums regardless of how gradients were produced: gains
//! are differences of large sums and need the precision.

pub mod ops;
pub mod table;

pub use ops::{build_histogram, build_histogram_chunked, build_pair_histogram, DEFAULT_CHUNK_ROWS};
pub use table::{BucketRef, BucketSum, HistogramTable};
