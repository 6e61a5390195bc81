//! Training-side building blocks: task encoding, gradients, objectives and
//! tree growth.

pub mod gbdt;
pub mod gradients;
pub mod objectives;
pub mod task;

pub use gbdt::{GainParams, GrowerParams, HarvestedTree, TreeGrower};
pub use gradients::{GradHess, GradOnly, GradStats, Gradients};
pub use objectives::{
    AbsoluteLoss, LogisticLoss, MultitaskSquaredLoss, Objective, PseudoHuberLoss, SoftmaxLoss, SquaredLoss,
};
pub use task::{n_scores_for_classes, ClassCount, LearningType, Targets, TrainingInputs};
