//! Tree node storage and harvesting.

mod harvest;
mod node;

pub use harvest::{HarvestedLeaf, HarvestedTree, LeafBins, SplitRecord};
pub use node::{NodeId, NodeState, NodeStats, SplitDecision, TreeArena};
