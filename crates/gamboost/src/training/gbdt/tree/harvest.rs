//! Harvesting a grown arena into the tree handed to the boosting loop.

use std::ops::RangeInclusive;

use super::node::{NodeId, NodeState, SplitDecision, TreeArena};
use crate::error::{CoreError, Result};
use crate::memory::{checked_len, try_filled};
use crate::training::gbdt::categorical::CatBitset;
use crate::training::gbdt::split::GainParams;
use crate::training::gradients::GradStats;

/// Bins covered by a leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum LeafBins {
    /// Ordinal feature: a contiguous bin range.
    Range(RangeInclusive<u32>),
    /// Categorical feature: a set of bins.
    Categories(CatBitset),
}

impl LeafBins {
    pub fn contains(&self, bin: u32) -> bool {
        match self {
            Self::Range(r) => r.contains(&bin),
            Self::Categories(c) => c.contains(bin),
        }
    }
}

/// One leaf of a harvested tree.
#[derive(Clone, Debug, PartialEq)]
pub struct HarvestedLeaf {
    pub bins: LeafBins,
    /// One update per score.
    pub values: Vec<f64>,
    pub count: u64,
    pub weight: f64,
}

/// One split of a harvested tree, in post-order.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitRecord {
    pub node: NodeId,
    pub gain: f64,
    /// Bins sent to the left child.
    pub left: LeafBins,
}

/// A finished tree over one feature.
///
/// Leaves are listed in post-order, which for an ordinal feature is
/// increasing bin order.
#[derive(Clone, Debug, PartialEq)]
pub struct HarvestedTree {
    leaves: Vec<HarvestedLeaf>,
    splits: Vec<SplitRecord>,
    n_bins: u32,
    n_scores: usize,
}

impl HarvestedTree {
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.leaves.len()
    }

    #[inline]
    pub fn leaves(&self) -> &[HarvestedLeaf] {
        &self.leaves
    }

    #[inline]
    pub fn splits(&self) -> &[SplitRecord] {
        &self.splits
    }

    #[inline]
    pub fn n_bins(&self) -> u32 {
        self.n_bins
    }

    #[inline]
    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    /// Leaf covering `bin`, if any.
    pub fn leaf_for_bin(&self, bin: u32) -> Option<&HarvestedLeaf> {
        self.leaves.iter().find(|leaf| leaf.bins.contains(bin))
    }

    /// Per-bin updates, row-major `[bin * n_scores + k]`.
    pub fn bin_scores(&self) -> Result<Vec<f64>> {
        let len = checked_len("bin scores", &[self.n_bins as usize, self.n_scores])?;
        let mut out = try_filled("bin scores", len, 0.0)?;
        for leaf in &self.leaves {
            let mut write = |bin: u32| {
                let start = bin as usize * self.n_scores;
                out[start..start + self.n_scores].copy_from_slice(&leaf.values);
            };
            match &leaf.bins {
                LeafBins::Range(r) => r.clone().for_each(&mut write),
                LeafBins::Categories(c) => c.iter().for_each(&mut write),
            }
        }
        Ok(out)
    }
}

impl<S: GradStats> TreeArena<S> {
    /// Convert the grown arena into a [`HarvestedTree`], releasing the arena.
    ///
    /// `order[p]` is the bin at bucket position `p`; `categorical` selects the
    /// leaf bin representation.
    pub fn harvest(self, order: &[usize], categorical: bool, params: &GainParams) -> Result<HarvestedTree> {
        if self.is_empty() {
            return Err(CoreError::invalid("arena", "cannot harvest an empty tree"));
        }
        let n_bins = order.len() as u32;
        let bins_of = |first: u32, last: u32| {
            if categorical {
                LeafBins::Categories(order[first as usize..=last as usize].iter().map(|&b| b as u32).collect())
            } else {
                LeafBins::Range(first..=last)
            }
        };

        let mut leaves = Vec::new();
        let mut splits = Vec::new();
        // (node, first, last, children visited)
        let mut stack: Vec<(NodeId, u32, u32, bool)> = vec![(0, 0, n_bins.saturating_sub(1), false)];

        while let Some((id, first, last, visited)) = stack.pop() {
            match *self.state(id) {
                NodeState::Examined {
                    decision: SplitDecision::Split { gain, split_after },
                    children: Some(left),
                } => {
                    if visited {
                        splits.push(SplitRecord {
                            node: id,
                            gain,
                            left: bins_of(first, split_after),
                        });
                    } else {
                        stack.push((id, first, last, true));
                        stack.push((left + 1, split_after + 1, last, false));
                        stack.push((left, first, split_after, false));
                    }
                }
                // Terminal, never split, or never examined: a leaf.
                _ => {
                    let sum = self.stats(id).to_sum();
                    leaves.push(HarvestedLeaf {
                        bins: bins_of(first, last),
                        values: params.leaf_values(&sum),
                        count: sum.count,
                        weight: sum.weight,
                    });
                }
            }
        }

        log::debug!(
            "harvested tree: {} leaves, {} splits from {} nodes",
            leaves.len(),
            splits.len(),
            self.len()
        );
        Ok(HarvestedTree {
            leaves,
            splits,
            n_bins,
            n_scores: self.n_scores(),
        })
    }
}
