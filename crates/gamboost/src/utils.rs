//! Parallelism configuration shared by the histogram, grower and interaction
//! paths.
//!
//! Work is only ever parallel *across* independent units (features, feature
//! pairs, fixed row chunks). Growth of a single tree is always sequential.

use rayon::prelude::*;

use crate::error::{CoreError, Result};

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// When `Parallel`, components may use `rayon` parallel iterators on the
/// current pool. When `Sequential`, they must iterate in order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    #[default]
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over `iter`, in parallel when allowed. Output order always matches
    /// input order.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Weights
// =============================================================================

/// Per-row weights, or 1.0 for every row when unweighted.
///
/// `weights`, when present, must already be validated to hold `n_rows` values.
#[inline]
pub fn weight_iter(weights: Option<&[f64]>, n_rows: usize) -> impl Iterator<Item = f64> + '_ {
    weights
        .unwrap_or(&[])
        .iter()
        .copied()
        .chain(std::iter::repeat(1.0))
        .take(n_rows)
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use the global pool)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T> {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => Ok(f(Parallelism::Sequential)),
        Parallelism::Parallel if n_threads == 0 => Ok(f(Parallelism::Parallel)),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .map_err(|e| CoreError::invalid("n_threads", e.to_string()))?;
            Ok(pool.install(|| f(Parallelism::Parallel)))
        }
    }
}
