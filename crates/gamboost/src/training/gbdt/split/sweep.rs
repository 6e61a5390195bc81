//! Best-boundary search over a contiguous run of ordered buckets.
//!
//! The left child is summed from the front of the run as the sweep advances;
//! the right child is read from suffix sums built from the back, so neither
//! side is derived by subtracting from the parent.
//!
//! On exactly equal gains the boundary whose heavier child carries the larger
//! denominator wins; if that also ties, the lower boundary is kept.

use std::sync::Arc;

use super::gain::{clean_gain, GainParams};
use crate::error::{CoreError, Result};
use crate::memory::{try_filled, MemoryBudget, Reservation};
use crate::training::gbdt::histograms::{BucketSum, HistogramTable};
use crate::training::gradients::GradStats;

/// The best boundary found in a run.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitCandidate<S> {
    /// Position (in bucket order) of the last bucket going left.
    pub split_after: usize,
    pub gain: f64,
    pub left: BucketSum<S>,
    pub right: BucketSum<S>,
}

impl<S: GradStats> SplitCandidate<S> {
    #[inline]
    fn heavier_child(&self) -> f64 {
        self.left.total_denominator().max(self.right.total_denominator())
    }
}

/// Reusable scratch for split sweeps over one table.
#[derive(Debug)]
pub struct SplitSweeper<S> {
    suffix_counts: Vec<u64>,
    suffix_weights: Vec<f64>,
    suffix_stats: Vec<S>,
    left: BucketSum<S>,
    right: BucketSum<S>,
    n_scores: usize,
    _reservation: Reservation,
}

impl<S: GradStats> SplitSweeper<S> {
    /// Scratch for runs of up to `n_buckets` buckets.
    pub fn new(n_buckets: usize, n_scores: usize, budget: &Arc<MemoryBudget>) -> Result<Self> {
        let bytes = HistogramTable::<S>::bytes_for(n_buckets, n_scores)?;
        let reservation = budget.reserve("split sweep", bytes)?;
        Ok(Self {
            suffix_counts: try_filled("split sweep", n_buckets, 0)?,
            suffix_weights: try_filled("split sweep", n_buckets, 0.0)?,
            suffix_stats: try_filled("split sweep", n_buckets * n_scores, S::default())?,
            left: BucketSum::zeros(n_scores),
            right: BucketSum::zeros(n_scores),
            n_scores,
            _reservation: reservation,
        })
    }

    /// Find the best boundary in positions `first..=last` of `order`.
    ///
    /// Returns `None` when no boundary is valid with gain above
    /// `params.min_gain`. A non-finite gain makes that boundary ineligible,
    /// or fails with `NumericDegenerate` when `strict`.
    #[allow(clippy::too_many_arguments)]
    pub fn find_best(
        &mut self,
        table: &HistogramTable<S>,
        order: &[usize],
        first: usize,
        last: usize,
        parent: &BucketSum<S>,
        params: &GainParams,
        strict: bool,
    ) -> Result<Option<SplitCandidate<S>>> {
        if first >= last {
            return Ok(None);
        }
        let n = self.n_scores;
        self.fill_suffix(table, order, first, last);

        let parent_score = params.node_score(parent);
        let mut best: Option<SplitCandidate<S>> = None;
        self.left.clear();

        for p in first..last {
            self.left.add_bucket(table.bucket(order[p]));
            let i = p + 1 - first;
            self.right.count = self.suffix_counts[i];
            self.right.weight = self.suffix_weights[i];
            self.right
                .stats
                .copy_from_slice(&self.suffix_stats[i * n..(i + 1) * n]);

            if !params.is_valid_child(&self.left) || !params.is_valid_child(&self.right) {
                continue;
            }
            let raw = params.compute_gain(&self.left, &self.right, parent_score);
            let Some(gain) = clean_gain(raw) else {
                if strict {
                    return Err(CoreError::NumericDegenerate {
                        what: "split gain",
                        index: p,
                    });
                }
                log::trace!("boundary {p}: degenerate gain {raw}, skipped");
                continue;
            };
            log::trace!("boundary {p}: gain {gain}");
            if gain <= params.min_gain {
                continue;
            }

            let candidate = SplitCandidate {
                split_after: p,
                gain,
                left: self.left.clone(),
                right: self.right.clone(),
            };
            let better = match &best {
                None => true,
                Some(b) if gain > b.gain => true,
                Some(b) if gain == b.gain => candidate.heavier_child() > b.heavier_child(),
                Some(_) => false,
            };
            if better {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    /// `suffix[i]` = sum of positions `first + i..=last`, for `i >= 1`.
    fn fill_suffix(&mut self, table: &HistogramTable<S>, order: &[usize], first: usize, last: usize) {
        let n = self.n_scores;
        let len = last - first + 1;
        let mut count = 0u64;
        let mut weight = 0.0f64;
        self.right.stats.fill(S::default());
        for i in (1..len).rev() {
            let bucket = table.bucket(order[first + i]);
            count += bucket.count;
            weight += bucket.weight;
            for (acc, &s) in self.right.stats.iter_mut().zip(bucket.stats) {
                *acc += s;
            }
            self.suffix_counts[i] = count;
            self.suffix_weights[i] = weight;
            self.suffix_stats[i * n..(i + 1) * n].copy_from_slice(&self.right.stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::gradients::{GradOnly, Gradients};

    /// Table with one row per entry of `grads`, row `i` in bin `bins[i]`.
    fn table(n_bins: usize, bins: &[usize], grads: &[f64]) -> HistogramTable<GradOnly> {
        let budget = MemoryBudget::unlimited();
        let mut t = HistogramTable::zeroed(n_bins, 1, &budget).unwrap();
        let g = Gradients::from_vec(grads.iter().map(|&g| GradOnly::new(g)).collect(), 1).unwrap();
        for (row, &bin) in bins.iter().enumerate() {
            t.add_row::<1>(bin, g.row(row), 1.0);
        }
        t
    }

    fn sweep(t: &HistogramTable<GradOnly>, params: &GainParams) -> Option<SplitCandidate<GradOnly>> {
        let order: Vec<usize> = (0..t.n_buckets()).collect();
        let mut sweeper = SplitSweeper::new(t.n_buckets(), 1, &MemoryBudget::unlimited()).unwrap();
        sweeper
            .find_best(t, &order, 0, t.n_buckets() - 1, &t.totals(), params, true)
            .unwrap()
    }

    #[test]
    fn finds_sign_change() {
        let t = table(4, &[0, 1, 2, 3], &[1.0, 1.0, -1.0, -1.0]);
        let best = sweep(&t, &GainParams::default()).unwrap();
        assert_eq!(best.split_after, 1);
        assert_eq!(best.left.count, 2);
        assert_eq!(best.right.stats[0], GradOnly::new(-2.0));
        assert!(best.gain > 0.0);
    }

    #[test]
    fn single_bucket_never_splits() {
        let t = table(1, &[0, 0], &[1.0, -1.0]);
        assert!(sweep(&t, &GainParams::default()).is_none());
    }

    #[test]
    fn flat_gradients_do_not_split() {
        let t = table(3, &[0, 1, 2], &[0.0, 0.0, 0.0]);
        assert!(sweep(&t, &GainParams::default()).is_none());
    }

    #[test]
    fn empty_child_is_invalid() {
        // bin 1 is empty: boundaries 0|12 and 01|2 both leave rows on each side,
        // but min_samples_leaf = 2 rules both out.
        let t = table(3, &[0, 2, 2], &[5.0, -1.0, -1.0]);
        let params = GainParams {
            min_samples_leaf: 2,
            ..Default::default()
        };
        assert!(sweep(&t, &params).is_none());
    }

    #[test]
    fn exact_tie_keeps_lower_boundary() {
        // Mirror-image boundaries 0 and 2 score 1/1 + 1/3 and 1/3 + 1/1,
        // and both heavier children weigh 3.
        let t = table(4, &[0, 1, 2, 3], &[1.0, 0.0, 0.0, -1.0]);
        let params = GainParams {
            reg_lambda: 0.0,
            ..Default::default()
        };
        let best = sweep(&t, &params).unwrap();
        assert_eq!(best.split_after, 0);
        assert_eq!(best.gain, 0.5 * (1.0 + 1.0 / 3.0));
    }

    #[test]
    fn sub_range_sweep() {
        let t = table(4, &[0, 1, 2, 3], &[1.0, 1.0, -1.0, -1.0]);
        let mut sweeper = SplitSweeper::new(4, 1, &MemoryBudget::unlimited()).unwrap();
        let order = [0, 1, 2, 3];
        let mut parent = BucketSum::zeros(1);
        (1..=3).for_each(|i| parent.add_bucket(t.bucket(i)));

        let best = sweeper
            .find_best(&t, &order, 1, 3, &parent, &GainParams::default(), true)
            .unwrap()
            .unwrap();
        assert_eq!(best.split_after, 1);
        assert_eq!(best.left.count + best.right.count, 3);
        assert!(sweeper
            .find_best(&t, &order, 2, 2, &parent, &GainParams::default(), true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn degenerate_gain_is_error_only_when_strict() {
        // lambda = 0 and zero weight makes every score 0/0
        let budget = MemoryBudget::unlimited();
        let mut t = HistogramTable::<GradOnly>::zeroed(2, 1, &budget).unwrap();
        t.add_row::<1>(0, &[GradOnly::new(1.0)], 0.0);
        t.add_row::<1>(1, &[GradOnly::new(-1.0)], 0.0);
        let params = GainParams {
            reg_lambda: 0.0,
            ..Default::default()
        };
        let order = [0, 1];
        let mut sweeper = SplitSweeper::new(2, 1, &budget).unwrap();

        let lenient = sweeper.find_best(&t, &order, 0, 1, &t.totals(), &params, false).unwrap();
        assert!(lenient.is_none());
        let err = sweeper.find_best(&t, &order, 0, 1, &t.totals(), &params, true).unwrap_err();
        assert_eq!(err.code(), 4);
    }
}
