//! Tree node store.
//!
//! Nodes live in one arena sized for the leaf budget up front and refer to
//! each other by index. Each node has a state record and a statistics tail:
//! the row count, the summed weight and one gradient statistic per score.
//! The tail length is the score count, fixed when the arena is created, so
//! tails are stored back to back in flat arrays with stride `n_scores`.
//!
//! A node is created [`NodeState::Unexamined`] and moves to
//! [`NodeState::Examined`] exactly once. Children are allocated as a pair:
//! `children` names the left child, the right child is the next index.

use std::mem::size_of;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::memory::{array_bytes, checked_len, checked_sum, MemoryBudget, Reservation};
use crate::training::gbdt::histograms::BucketSum;
use crate::training::gradients::GradStats;

/// Index of a node in its arena.
pub type NodeId = u32;

/// Outcome of examining a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitDecision {
    /// Never split this node.
    Terminal,
    /// Best boundary: positions up to and including `split_after` go left.
    Split { gain: f64, split_after: u32 },
}

/// State of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeState {
    /// Not yet examined: covers bucket positions `first..=last`.
    Unexamined { first: u32, last: u32 },
    /// Examined. `children` is set once a `Split` node has been split.
    Examined {
        decision: SplitDecision,
        children: Option<NodeId>,
    },
}

/// Borrowed statistics tail of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeStats<'a, S> {
    pub count: u64,
    pub weight: f64,
    pub stats: &'a [S],
}

impl<S: GradStats> NodeStats<'_, S> {
    pub fn to_sum(&self) -> BucketSum<S> {
        BucketSum {
            count: self.count,
            weight: self.weight,
            stats: self.stats.to_vec(),
        }
    }
}

/// Arena of tree nodes for one growth invocation.
#[derive(Debug)]
pub struct TreeArena<S> {
    states: Vec<NodeState>,
    counts: Vec<u64>,
    weights: Vec<f64>,
    /// `[node * n_scores + k]`
    stats: Vec<S>,
    n_scores: usize,
    capacity: usize,
    _reservation: Reservation,
}

impl<S: GradStats> TreeArena<S> {
    /// Node capacity for a tree of at most `max_leaves` leaves.
    pub fn capacity_for(max_leaves: usize) -> Result<usize> {
        max_leaves
            .checked_mul(2)
            .and_then(|n| n.checked_sub(1))
            .ok_or(CoreError::CapacityOverflow {
                what: "tree arena",
                requested: None,
                limit: isize::MAX as usize,
            })
    }

    /// Bytes reserved for `n_nodes` nodes of `n_scores` scores.
    pub fn bytes_for(n_nodes: usize, n_scores: usize) -> Result<usize> {
        let n_stats = checked_len("tree arena", &[n_nodes, n_scores])?;
        checked_sum(
            "tree arena",
            &[
                array_bytes::<NodeState>("tree arena", n_nodes)?,
                array_bytes::<u64>("tree arena", n_nodes)?,
                array_bytes::<f64>("tree arena", n_nodes)?,
                array_bytes::<S>("tree arena", n_stats)?,
            ],
        )
    }

    /// Empty arena with room for `2 * max_leaves - 1` nodes.
    pub fn with_leaf_budget(max_leaves: usize, n_scores: usize, budget: &Arc<MemoryBudget>) -> Result<Self> {
        if max_leaves == 0 {
            return Err(CoreError::invalid("max_leaves", "must be >= 1"));
        }
        if n_scores == 0 {
            return Err(CoreError::invalid("n_scores", "must be >= 1"));
        }
        let capacity = Self::capacity_for(max_leaves)?;
        let reservation = budget.reserve("tree arena", Self::bytes_for(capacity, n_scores)?)?;
        Ok(Self {
            states: with_capacity("tree arena", capacity)?,
            counts: with_capacity("tree arena", capacity)?,
            weights: with_capacity("tree arena", capacity)?,
            stats: with_capacity("tree arena", capacity * n_scores)?,
            n_scores,
            capacity,
            _reservation: reservation,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    #[inline]
    pub fn state(&self, id: NodeId) -> &NodeState {
        &self.states[id as usize]
    }

    #[inline]
    pub fn stats(&self, id: NodeId) -> NodeStats<'_, S> {
        let i = id as usize;
        NodeStats {
            count: self.counts[i],
            weight: self.weights[i],
            stats: &self.stats[i * self.n_scores..(i + 1) * self.n_scores],
        }
    }

    /// Add an unexamined node covering positions `first..=last`.
    pub fn push(&mut self, first: u32, last: u32, sum: &BucketSum<S>) -> Result<NodeId> {
        if self.states.len() >= self.capacity {
            return Err(CoreError::CapacityOverflow {
                what: "tree arena",
                requested: Some(self.states.len() + 1),
                limit: self.capacity,
            });
        }
        if sum.stats.len() != self.n_scores {
            return Err(CoreError::invalid(
                "stats",
                format!("{} scores for an arena of {}", sum.stats.len(), self.n_scores),
            ));
        }
        let id = self.states.len() as NodeId;
        self.states.push(NodeState::Unexamined { first, last });
        self.counts.push(sum.count);
        self.weights.push(sum.weight);
        self.stats.extend_from_slice(&sum.stats);
        Ok(id)
    }

    /// Record the examination outcome of `id`.
    ///
    /// Examining a node twice is a logic error reported as `InvalidParameter`.
    pub fn examine(&mut self, id: NodeId, decision: SplitDecision) -> Result<()> {
        let state = self.state_mut(id)?;
        match state {
            NodeState::Unexamined { .. } => {
                *state = NodeState::Examined {
                    decision,
                    children: None,
                };
                Ok(())
            }
            NodeState::Examined { .. } => Err(CoreError::invalid(
                "node",
                format!("node {id} was already examined"),
            )),
        }
    }

    /// Allocate both children of the examined, splittable node `parent`.
    ///
    /// Returns the left child; the right child is the next id.
    pub fn split(
        &mut self,
        parent: NodeId,
        left: (u32, u32, &BucketSum<S>),
        right: (u32, u32, &BucketSum<S>),
    ) -> Result<NodeId> {
        match self.state(parent) {
            NodeState::Examined {
                decision: SplitDecision::Split { .. },
                children: None,
            } => {}
            other => {
                return Err(CoreError::invalid(
                    "node",
                    format!("node {parent} cannot be split in state {other:?}"),
                ))
            }
        }
        if self.states.len() + 2 > self.capacity {
            return Err(CoreError::CapacityOverflow {
                what: "tree arena",
                requested: Some(self.states.len() + 2),
                limit: self.capacity,
            });
        }
        let left_id = self.push(left.0, left.1, left.2)?;
        self.push(right.0, right.1, right.2)?;
        if let NodeState::Examined { children, .. } = self.state_mut(parent)? {
            *children = Some(left_id);
        }
        Ok(left_id)
    }

    fn state_mut(&mut self, id: NodeId) -> Result<&mut NodeState> {
        let len = self.states.len();
        self.states
            .get_mut(id as usize)
            .ok_or_else(|| CoreError::invalid("node", format!("id {id} out of range for {len} nodes")))
    }

    /// Heap bytes held by node storage.
    pub fn size_bytes(&self) -> usize {
        self.states.capacity() * size_of::<NodeState>()
            + self.counts.capacity() * size_of::<u64>()
            + self.weights.capacity() * size_of::<f64>()
            + self.stats.capacity() * size_of::<S>()
    }
}

fn with_capacity<T>(what: &'static str, capacity: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(capacity)
        .map_err(|_| CoreError::AllocationFailure {
            what,
            bytes: capacity.saturating_mul(size_of::<T>()),
        })?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::training::gradients::GradHess;

    fn sum(count: u64, grads: &[f64]) -> BucketSum<GradHess> {
        BucketSum {
            count,
            weight: count as f64,
            stats: grads.iter().map(|&g| GradHess::new(g, 1.0)).collect(),
        }
    }

    #[test]
    fn state_transitions_once() {
        let budget = MemoryBudget::unlimited();
        let mut arena = TreeArena::with_leaf_budget(3, 2, &budget).unwrap();
        assert_eq!(arena.capacity(), 5);

        let root = arena.push(0, 7, &sum(10, &[1.0, -1.0])).unwrap();
        assert_eq!(*arena.state(root), NodeState::Unexamined { first: 0, last: 7 });
        assert_eq!(arena.stats(root).stats[1], GradHess::new(-1.0, 1.0));

        arena
            .examine(root, SplitDecision::Split { gain: 2.0, split_after: 3 })
            .unwrap();
        let err = arena.examine(root, SplitDecision::Terminal).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn split_links_children_pair() {
        let budget = MemoryBudget::unlimited();
        let mut arena = TreeArena::with_leaf_budget(2, 1, &budget).unwrap();
        let root = arena.push(0, 3, &sum(4, &[0.0])).unwrap();

        // not yet examined
        assert!(arena.split(root, (0, 1, &sum(2, &[1.0])), (2, 3, &sum(2, &[-1.0]))).is_err());

        arena
            .examine(root, SplitDecision::Split { gain: 1.0, split_after: 1 })
            .unwrap();
        let left = arena
            .split(root, (0, 1, &sum(2, &[1.0])), (2, 3, &sum(2, &[-1.0])))
            .unwrap();
        assert_eq!(left, 1);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.stats(left + 1).count, 2);
        assert!(matches!(
            arena.state(root),
            NodeState::Examined { children: Some(1), .. }
        ));

        // children already set
        assert!(arena.split(root, (0, 1, &sum(2, &[1.0])), (2, 3, &sum(2, &[-1.0]))).is_err());
    }

    #[test]
    fn capacity_is_enforced() {
        let budget = MemoryBudget::unlimited();
        let mut arena = TreeArena::with_leaf_budget(1, 1, &budget).unwrap();
        arena.push(0, 0, &sum(1, &[0.0])).unwrap();
        let err = arena.push(0, 0, &sum(1, &[0.0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityOverflow);
    }

    #[test]
    fn reservation_covers_arena() {
        let budget = MemoryBudget::with_limit(1 << 20);
        {
            let arena = TreeArena::<GradHess>::with_leaf_budget(16, 3, &budget).unwrap();
            assert!(budget.in_use() >= arena.size_bytes());
        }
        assert_eq!(budget.in_use(), 0);

        let tiny = MemoryBudget::with_limit(64);
        let err = TreeArena::<GradHess>::with_leaf_budget(16, 3, &tiny).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityOverflow);
        assert!(TreeArena::<GradHess>::with_leaf_budget(0, 1, &budget).is_err());
    }
}
