//! Interaction Detector: pairwise interaction strength from 2-D histograms.
//!
//! A session binds a dataset and one round of gradients, then scores any
//! number of feature pairs. Each pair builds its own pair histogram and
//! cumulative grid against the session's memory budget and releases them
//! before returning, so a failing pair leaves nothing behind.

mod detector;
mod score;

pub use detector::{InteractionDetector, InteractionParams, InteractionParamsBuilder, PairScore};
