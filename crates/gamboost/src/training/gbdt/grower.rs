//! Leaf-wise tree grower.
//!
//! Grows one tree over one feature's histogram: the root spans every bucket,
//! and the examined leaf with the highest split gain is split next until the
//! leaf cap is reached or no leaf can be split.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use bon::Builder;

use super::categorical::categorical_order;
use super::histograms::{build_histogram, HistogramTable};
use super::split::{GainParams, SplitCandidate, SplitSweeper};
use super::tree::{HarvestedTree, NodeId, SplitDecision, TreeArena};
use crate::data::{FeatureMeta, PackedDataset};
use crate::error::{CoreError, Result};
use crate::memory::MemoryBudget;
use crate::training::gradients::{GradStats, Gradients};
use crate::training::task::LearningType;
use crate::utils::Parallelism;

// =============================================================================
// GrowerParams
// =============================================================================

/// Parameters for tree growth.
///
/// ```
/// use gamboost::training::gbdt::GrowerParams;
///
/// let params = GrowerParams::builder().max_leaves(8).build().unwrap();
/// assert_eq!(params.max_leaves, 8);
/// assert!(GrowerParams::builder().max_leaves(0).build().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct GrowerParams {
    /// Gain and leaf regularization.
    #[builder(default)]
    pub gain: GainParams,
    /// Maximum leaves per tree. Default: 3.
    #[builder(default = 3)]
    pub max_leaves: usize,
    /// Classification growth treats a non-finite gain as an error.
    #[builder(default)]
    pub learning_type: LearningType,
    /// Parallelism across features in [`TreeGrower::grow_features`].
    #[builder(default)]
    pub parallelism: Parallelism,
}

impl<S: grower_params_builder::IsComplete> GrowerParamsBuilder<S> {
    /// Build and validate the parameters.
    pub fn build(self) -> Result<GrowerParams> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl GrowerParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_leaves == 0 {
            return Err(CoreError::invalid("max_leaves", "must be >= 1"));
        }
        self.gain.validate()
    }
}

impl Default for GrowerParams {
    fn default() -> Self {
        Self {
            gain: GainParams::default(),
            max_leaves: 3,
            learning_type: LearningType::default(),
            parallelism: Parallelism::default(),
        }
    }
}

// =============================================================================
// Leaf candidates
// =============================================================================

/// An examined, splittable leaf waiting in the heap.
#[derive(Debug)]
struct LeafCandidate<S> {
    node: NodeId,
    first: u32,
    last: u32,
    split: SplitCandidate<S>,
}

impl<S> PartialEq for LeafCandidate<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S> Eq for LeafCandidate<S> {}

impl<S> PartialOrd for LeafCandidate<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S> Ord for LeafCandidate<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher gain first; equal gains pop the lower node id first.
        self.split
            .gain
            .total_cmp(&other.split.gain)
            .then_with(|| other.node.cmp(&self.node))
    }
}

// =============================================================================
// TreeGrower
// =============================================================================

/// Grows single-feature trees against a shared memory budget.
///
/// Each call owns its own arena and scratch, so one grower may be used from
/// several threads at once on different features.
#[derive(Debug)]
pub struct TreeGrower {
    params: GrowerParams,
    budget: Arc<MemoryBudget>,
}

impl TreeGrower {
    pub fn new(params: GrowerParams, budget: Arc<MemoryBudget>) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, budget })
    }

    #[inline]
    pub fn params(&self) -> &GrowerParams {
        &self.params
    }

    #[inline]
    pub fn budget(&self) -> &Arc<MemoryBudget> {
        &self.budget
    }

    /// Grow a tree over `table`, the histogram of a feature described by `meta`.
    ///
    /// All working memory is released before returning, on success or error.
    pub fn grow<S: GradStats>(&self, table: &HistogramTable<S>, meta: &FeatureMeta) -> Result<HarvestedTree> {
        let n_bins = meta.n_bins as usize;
        if n_bins == 0 || table.n_buckets() != n_bins {
            return Err(CoreError::invalid(
                "histogram",
                format!("{} buckets for a feature of {n_bins} bins", table.n_buckets()),
            ));
        }
        let gain = &self.params.gain;
        let strict = self.params.learning_type.is_classification();
        let order: Vec<usize> = if meta.categorical {
            categorical_order(table, gain)
        } else {
            (0..n_bins).collect()
        };

        // every leaf covers at least one bin
        let leaf_cap = self.params.max_leaves.min(n_bins);
        let mut arena = TreeArena::with_leaf_budget(leaf_cap, table.n_scores(), &self.budget)?;
        let mut sweeper = SplitSweeper::new(n_bins, table.n_scores(), &self.budget)?;
        let mut heap = BinaryHeap::new();

        let last = meta.n_bins - 1;
        let root = arena.push(0, last, &table.totals())?;
        let mut n_leaves = 1;
        if n_leaves < leaf_cap {
            let candidate = examine(&mut arena, &mut sweeper, table, &order, root, 0, last, gain, strict)?;
            if let Some(c) = &candidate {
                log::debug!("root gain {} at boundary {}", c.split.gain, c.split.split_after);
            }
            heap.extend(candidate);
        }

        while n_leaves < leaf_cap {
            let Some(LeafCandidate { node, first, last, split }) = heap.pop() else {
                break;
            };
            let split_after = split.split_after as u32;
            let left = arena.split(
                node,
                (first, split_after, &split.left),
                (split_after + 1, last, &split.right),
            )?;
            n_leaves += 1;
            log::debug!(
                "split node {node} after position {split_after} (gain {}): children {left}, {}",
                split.gain,
                left + 1
            );
            if n_leaves == leaf_cap {
                log::debug!("leaf cap {leaf_cap} reached");
                break;
            }
            for (child, lo, hi) in [(left, first, split_after), (left + 1, split_after + 1, last)] {
                heap.extend(examine(&mut arena, &mut sweeper, table, &order, child, lo, hi, gain, strict)?);
            }
        }

        arena.harvest(&order, meta.categorical, gain)
    }

    /// Build the histogram of `feature` and grow a tree over it.
    pub fn grow_feature<S: GradStats>(
        &self,
        dataset: &PackedDataset,
        feature: usize,
        grads: &Gradients<S>,
        weights: Option<&[f64]>,
    ) -> Result<HarvestedTree> {
        let meta = dataset.feature(feature)?;
        let table = build_histogram(dataset, feature, grads, weights, &self.budget)?;
        self.grow(&table, meta)
    }

    /// Grow one tree per entry of `features`, in parallel when allowed.
    ///
    /// Results keep the order of `features`; a failing feature does not affect
    /// the others.
    pub fn grow_features<S: GradStats>(
        &self,
        dataset: &PackedDataset,
        features: &[usize],
        grads: &Gradients<S>,
        weights: Option<&[f64]>,
    ) -> Vec<Result<HarvestedTree>> {
        self.params
            .parallelism
            .maybe_par_map(features, |&feature| self.grow_feature(dataset, feature, grads, weights))
    }
}

/// Examine `node`, covering positions `first..=last`, and record the outcome.
#[allow(clippy::too_many_arguments)]
fn examine<S: GradStats>(
    arena: &mut TreeArena<S>,
    sweeper: &mut SplitSweeper<S>,
    table: &HistogramTable<S>,
    order: &[usize],
    node: NodeId,
    first: u32,
    last: u32,
    gain: &GainParams,
    strict: bool,
) -> Result<Option<LeafCandidate<S>>> {
    let parent = arena.stats(node).to_sum();
    let best = sweeper.find_best(table, order, first as usize, last as usize, &parent, gain, strict)?;
    match best {
        Some(split) => {
            arena.examine(
                node,
                SplitDecision::Split {
                    gain: split.gain,
                    split_after: split.split_after as u32,
                },
            )?;
            Ok(Some(LeafCandidate { node, first, last, split }))
        }
        None => {
            arena.examine(node, SplitDecision::Terminal)?;
            log::trace!("node {node} terminal over positions {first}..={last}");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::training::gbdt::tree::LeafBins;
    use crate::training::gradients::{GradHess, GradOnly};

    fn table(n_bins: usize, rows: &[(usize, f64)]) -> HistogramTable<GradOnly> {
        let mut t = HistogramTable::zeroed(n_bins, 1, &MemoryBudget::unlimited()).unwrap();
        for &(bin, g) in rows {
            t.add_row::<1>(bin, &[GradOnly::new(g)], 1.0);
        }
        t
    }

    fn grower(max_leaves: usize) -> TreeGrower {
        let params = GrowerParams::builder().max_leaves(max_leaves).build().unwrap();
        TreeGrower::new(params, MemoryBudget::unlimited()).unwrap()
    }

    #[test]
    fn default_params_match_builder() {
        assert_eq!(GrowerParams::default(), GrowerParams::builder().build().unwrap());
    }

    #[test]
    fn two_bins_split_at_boundary() {
        let t = table(2, &[(0, 1.0), (0, 1.0), (1, -1.0), (1, -1.0)]);
        let tree = grower(8).grow(&t, &FeatureMeta::ordinal(2)).unwrap();

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.splits().len(), 1);
        assert!(tree.splits()[0].gain > 0.0);
        assert_eq!(tree.splits()[0].left, LeafBins::Range(0..=0));
        assert!(tree.leaves()[0].values[0] < 0.0);
        assert!(tree.leaves()[1].values[0] > 0.0);
    }

    #[test]
    fn single_bin_is_one_leaf() {
        let t = table(1, &[(0, 1.0), (0, -3.0), (0, 0.5)]);
        let tree = grower(4).grow(&t, &FeatureMeta::ordinal(1)).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert!(tree.splits().is_empty());
        assert_eq!(tree.leaves()[0].count, 3);
    }

    #[test]
    fn best_leaf_is_split_first() {
        // Large jump between bins 1|2, small one between 2|3.
        let t = table(4, &[(0, 5.0), (1, 5.0), (2, -5.0), (3, -4.0)]);
        let tree = grower(2).grow(&t, &FeatureMeta::ordinal(4)).unwrap();
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.splits()[0].left, LeafBins::Range(0..=1));
    }

    #[test]
    fn leaf_cap_bounds_leaves() {
        let rows: Vec<_> = (0..8).map(|b| (b, if b % 2 == 0 { 1.0 } else { -1.0 })).collect();
        let t = table(8, &rows);
        for cap in 1..=10 {
            let tree = grower(cap).grow(&t, &FeatureMeta::ordinal(8)).unwrap();
            assert!(tree.n_leaves() <= cap);
            assert_eq!(tree.n_leaves(), cap.min(8));
        }
    }

    #[test]
    fn arena_is_sized_by_bins_not_cap() {
        let rows: Vec<_> = (0..4).map(|b| (b, if b < 2 { 1.0 } else { -1.0 })).collect();
        let t = table(4, &rows);
        for cap in [4, 1 << 20, usize::MAX] {
            let budget = MemoryBudget::with_limit(1 << 20);
            let params = GrowerParams::builder().max_leaves(cap).build().unwrap();
            let tree = TreeGrower::new(params, budget.clone())
                .unwrap()
                .grow(&t, &FeatureMeta::ordinal(4))
                .unwrap();
            assert!(tree.n_leaves() <= 4, "cap {cap}");
            assert_eq!(budget.in_use(), 0);
        }
    }

    #[test]
    fn empty_edge_bin_is_skipped_without_regularization() {
        // bins [0, 0, 1, 1] of 3, logistic stats at a zero score
        let mut t = HistogramTable::<GradHess>::zeroed(3, 1, &MemoryBudget::unlimited()).unwrap();
        for (bin, grad) in [(0, 0.5), (0, 0.5), (1, -0.5), (1, -0.5)] {
            t.add_row::<1>(bin, &[GradHess::new(grad, 0.25)], 1.0);
        }
        let gain = GainParams {
            reg_lambda: 0.0,
            min_samples_leaf: 0,
            ..Default::default()
        };
        let params = GrowerParams::builder()
            .gain(gain)
            .max_leaves(8)
            .learning_type(LearningType::from_raw(2).unwrap())
            .build()
            .unwrap();

        let tree = TreeGrower::new(params, MemoryBudget::unlimited())
            .unwrap()
            .grow(&t, &FeatureMeta::ordinal(3))
            .unwrap();

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.splits()[0].left, LeafBins::Range(0..=0));
        assert!(tree.splits()[0].gain > 0.0);
    }

    #[test]
    fn categorical_groups_by_ratio() {
        // bins 0 and 2 rank first, 1 and 3 last
        let t = table(4, &[(0, -2.0), (1, 2.0), (2, -2.0), (3, 2.0)]);
        let tree = grower(2).grow(&t, &FeatureMeta::categorical(4)).unwrap();
        assert_eq!(tree.n_leaves(), 2);
        let LeafBins::Categories(left) = &tree.leaves()[0].bins else {
            panic!("expected categorical leaf");
        };
        assert_eq!(left.iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn mismatched_table_is_invalid() {
        let t = table(3, &[(0, 1.0)]);
        let err = grower(3).grow(&t, &FeatureMeta::ordinal(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn budget_released_after_growth() {
        let budget = MemoryBudget::unlimited();
        let grower = TreeGrower::new(GrowerParams::default(), budget.clone()).unwrap();
        let mut t = HistogramTable::<GradHess>::zeroed(3, 2, &MemoryBudget::unlimited()).unwrap();
        t.add_row::<2>(0, &[GradHess::new(1.0, 1.0), GradHess::new(-1.0, 1.0)], 1.0);
        t.add_row::<2>(2, &[GradHess::new(-1.0, 1.0), GradHess::new(1.0, 1.0)], 1.0);

        let tree = grower.grow(&t, &FeatureMeta::ordinal(3)).unwrap();
        assert_eq!(tree.n_scores(), 2);
        assert_eq!(budget.in_use(), 0);
        assert!(budget.peak() > 0);
    }

    #[test]
    fn classification_rejects_degenerate_gain() {
        let mut t = HistogramTable::<GradOnly>::zeroed(2, 1, &MemoryBudget::unlimited()).unwrap();
        t.add_row::<1>(0, &[GradOnly::new(1.0)], 0.0);
        t.add_row::<1>(1, &[GradOnly::new(-1.0)], 0.0);
        let gain = GainParams {
            reg_lambda: 0.0,
            ..Default::default()
        };
        let params = |learning_type: LearningType| GrowerParams::builder().gain(gain).learning_type(learning_type).build().unwrap();
        let budget = MemoryBudget::unlimited();

        let regression = TreeGrower::new(params(LearningType::Regression), budget.clone()).unwrap();
        assert_eq!(regression.grow(&t, &FeatureMeta::ordinal(2)).unwrap().n_leaves(), 1);

        let classification = TreeGrower::new(
            params(LearningType::Classification(crate::training::task::ClassCount::Fixed(2))),
            budget.clone(),
        )
        .unwrap();
        let err = classification.grow(&t, &FeatureMeta::ordinal(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumericDegenerate);
        assert_eq!(budget.in_use(), 0);
    }
}
