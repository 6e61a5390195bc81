//! Split finding: gain parameters and the boundary sweep.

pub mod gain;
pub mod sweep;

pub use gain::{clean_gain, GainParams, NEGATIVE_GAIN_EPSILON};
pub use sweep::{SplitCandidate, SplitSweeper};
