//! Testing utilities for gamboost.
//!
//! Float assertions and seeded synthetic data shared by unit tests,
//! integration tests and benches.
//!
//! ```ignore
//! use gamboost::assert_approx_eq;
//! use gamboost::testing::{random_bins, DEFAULT_TOLERANCE};
//! ```

use approx::AbsDiffEq;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{FeatureMeta, PackedDataset};
use crate::error::Result;
use crate::training::gradients::{GradHess, GradOnly, Gradients};

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for floating point comparisons of O(1) values.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two f64 values are approximately equal.
///
/// Uses absolute difference comparison with the given tolerance.
///
/// ```
/// # use gamboost::assert_approx_eq;
/// assert_approx_eq!(1.0f64, 1.0001f64, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert that two slices are approximately equal element-wise.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than tolerance.
pub fn assert_slice_approx_eq(actual: &[f64], expected: &[f64], tolerance: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a.abs_diff_eq(e, tolerance),
            "{context}[{i}]: {a} ≠ {e} (tolerance={tolerance})"
        );
    }
}

// =============================================================================
// Synthetic Data
// =============================================================================

/// Uniform random bins in `0..n_bins`.
pub fn random_bins(n_rows: usize, n_bins: u32, seed: u64) -> Vec<u32> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..n_rows).map(|_| rng.gen_range(0..n_bins.max(1))).collect()
}

/// Ordinal dataset of independent uniform features, one per entry of `bin_counts`.
pub fn random_dataset(n_rows: usize, bin_counts: &[u32], seed: u64) -> Result<PackedDataset> {
    bin_counts
        .iter()
        .enumerate()
        .fold(PackedDataset::builder().n_rows(n_rows), |builder, (f, &n_bins)| {
            let bins = random_bins(n_rows, n_bins, seed.wrapping_add(f as u64));
            builder.add_feature(FeatureMeta::ordinal(n_bins), &bins)
        })
        .build()
}

/// Gradient-only statistics, uniform in `[-1, 1]`.
pub fn noise_gradients(n_rows: usize, n_scores: usize, seed: u64) -> Result<Gradients<GradOnly>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let stats = (0..n_rows * n_scores)
        .map(|_| GradOnly::new(rng.gen_range(-1.0..=1.0)))
        .collect();
    Gradients::from_vec(stats, n_scores)
}

/// Newton statistics: gradients in `[-1, 1]`, hessians in `[0.1, 1]`.
pub fn noise_newton_gradients(n_rows: usize, n_scores: usize, seed: u64) -> Result<Gradients<GradHess>> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let stats = (0..n_rows * n_scores)
        .map(|_| GradHess::new(rng.gen_range(-1.0..=1.0), rng.gen_range(0.1..=1.0)))
        .collect();
    Gradients::from_vec(stats, n_scores)
}

/// Uniform random weights in `[0.5, 2]`.
pub fn random_weights(n_rows: usize, seed: u64) -> Vec<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    (0..n_rows).map(|_| rng.gen_range(0.5..=2.0)).collect()
}
