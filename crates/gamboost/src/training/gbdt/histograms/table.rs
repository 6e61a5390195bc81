//! The histogram bucket table.
//!
//! One bucket per bin (or linearized bin pair). Each bucket holds the row
//! count, the summed row weight, and one gradient statistic per score.
//! Buckets with no rows stay zero so the split sweep can index by bin.

use std::mem::size_of;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::memory::{array_bytes, checked_len, checked_sum, try_filled, MemoryBudget, Reservation};
use crate::training::gradients::GradStats;

/// Read-only view of one bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketRef<'a, S> {
    pub count: u64,
    pub weight: f64,
    /// One entry per score.
    pub stats: &'a [S],
}

/// Summed statistics of a run of buckets.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketSum<S> {
    pub count: u64,
    pub weight: f64,
    pub stats: Vec<S>,
}

impl<S: GradStats> BucketSum<S> {
    pub fn zeros(n_scores: usize) -> Self {
        Self {
            count: 0,
            weight: 0.0,
            stats: vec![S::default(); n_scores],
        }
    }

    #[inline]
    pub fn add_bucket(&mut self, bucket: BucketRef<'_, S>) {
        self.count += bucket.count;
        self.weight += bucket.weight;
        for (acc, &s) in self.stats.iter_mut().zip(bucket.stats) {
            *acc += s;
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.count = 0;
        self.weight = 0.0;
        self.stats.fill(S::default());
    }

    /// Newton denominator of score `k`.
    #[inline]
    pub fn denominator(&self, k: usize) -> f64 {
        self.stats[k].denominator(self.weight)
    }

    /// Smallest per-score denominator.
    pub fn min_denominator(&self) -> f64 {
        (0..self.stats.len())
            .map(|k| self.denominator(k))
            .fold(f64::INFINITY, f64::min)
    }

    /// Summed denominator over all scores.
    pub fn total_denominator(&self) -> f64 {
        (0..self.stats.len()).map(|k| self.denominator(k)).sum()
    }
}

/// Histogram bucket table for one feature or feature pair.
///
/// Holds a [`Reservation`] against the budget it was created from for as
/// long as it lives.
#[derive(Debug)]
pub struct HistogramTable<S> {
    counts: Vec<u64>,
    weights: Vec<f64>,
    /// `[bucket * n_scores + k]`
    stats: Vec<S>,
    n_scores: usize,
    _reservation: Reservation,
}

impl<S: GradStats> HistogramTable<S> {
    /// Bytes needed for `n_buckets` buckets of `n_scores` scores.
    ///
    /// Fails with `CapacityOverflow` if the size is not representable.
    pub fn bytes_for(n_buckets: usize, n_scores: usize) -> Result<usize> {
        let n_stats = checked_len("histogram", &[n_buckets, n_scores])?;
        checked_sum(
            "histogram",
            &[
                array_bytes::<u64>("histogram", n_buckets)?,
                array_bytes::<f64>("histogram", n_buckets)?,
                array_bytes::<S>("histogram", n_stats)?,
            ],
        )
    }

    /// All-zero table, reserved against `budget` before allocating.
    pub fn zeroed(n_buckets: usize, n_scores: usize, budget: &Arc<MemoryBudget>) -> Result<Self> {
        if n_buckets == 0 {
            return Err(CoreError::invalid("n_buckets", "must be >= 1"));
        }
        if n_scores == 0 {
            return Err(CoreError::invalid("n_scores", "must be >= 1"));
        }
        let bytes = Self::bytes_for(n_buckets, n_scores)?;
        let reservation = budget.reserve("histogram", bytes)?;
        Ok(Self {
            counts: try_filled("histogram", n_buckets, 0)?,
            weights: try_filled("histogram", n_buckets, 0.0)?,
            stats: try_filled("histogram", n_buckets * n_scores, S::default())?,
            n_scores,
            _reservation: reservation,
        })
    }

    #[inline]
    pub fn n_buckets(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    /// Bucket `i`.
    ///
    /// # Panics
    /// Panics if `i >= n_buckets()`.
    #[inline]
    pub fn bucket(&self, i: usize) -> BucketRef<'_, S> {
        BucketRef {
            count: self.counts[i],
            weight: self.weights[i],
            stats: &self.stats[i * self.n_scores..(i + 1) * self.n_scores],
        }
    }

    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn stats(&self) -> &[S] {
        &self.stats
    }

    /// Sum over every bucket, in bucket order.
    pub fn totals(&self) -> BucketSum<S> {
        let mut sum = BucketSum::zeros(self.n_scores);
        for i in 0..self.n_buckets() {
            sum.add_bucket(self.bucket(i));
        }
        sum
    }

    /// Accumulated heap size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.counts.len() * size_of::<u64>()
            + self.weights.len() * size_of::<f64>()
            + self.stats.len() * size_of::<S>()
    }

    // =========================================================================
    // Accumulation
    // =========================================================================

    /// Add one weighted row into `bucket`.
    ///
    /// `K` is the score count when known at compile time, 0 for dynamic.
    #[inline(always)]
    pub(crate) fn add_row<const K: usize>(&mut self, bucket: usize, row: &[S], weight: f64) {
        let n_scores = if K == 0 { self.n_scores } else { K };
        self.counts[bucket] += 1;
        self.weights[bucket] += weight;
        let dst = &mut self.stats[bucket * n_scores..(bucket + 1) * n_scores];
        for (d, &s) in dst.iter_mut().zip(&row[..n_scores]) {
            *d += s.scaled(weight);
        }
    }

    /// `self += other`, bucket by bucket.
    pub(crate) fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.stats.len(), other.stats.len());
        for (d, s) in self.counts.iter_mut().zip(&other.counts) {
            *d += s;
        }
        for (d, s) in self.weights.iter_mut().zip(&other.weights) {
            *d += s;
        }
        for (d, &s) in self.stats.iter_mut().zip(&other.stats) {
            *d += s;
        }
    }
}
