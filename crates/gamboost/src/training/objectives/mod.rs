//! Objective (loss) functions.
//!
//! An objective turns targets and current scores into per-row gradient
//! statistics. Weights are not applied here: histogram accumulation scales
//! every row by its weight, so objectives see unweighted rows.
//!
//! # Layout
//!
//! Predictions and gradients are **row-major**: `predictions[row * n_scores + k]`.
//!
//! # Available Objectives
//!
//! ## Regression
//! - [`SquaredLoss`]: L2 loss, gradient-only
//! - [`AbsoluteLoss`]: L1 loss, gradient-only
//! - [`PseudoHuberLoss`]: smooth robust loss with a Newton step
//! - [`MultitaskSquaredLoss`]: one L2 score per task, gradient-only
//!
//! ## Classification
//! - [`LogisticLoss`]: binary log loss
//! - [`SoftmaxLoss`]: multiclass cross-entropy, one score per class

mod classification;
mod regression;

pub use classification::{LogisticLoss, SoftmaxLoss};
pub use regression::{AbsoluteLoss, MultitaskSquaredLoss, PseudoHuberLoss, SquaredLoss};

use super::gradients::{GradStats, Gradients};
use super::task::Targets;
use crate::error::{CoreError, Result};

/// A loss function consumed by histogram building and tree growth.
///
/// `Stats` selects the Newton (`GradHess`) or gradient-only (`GradOnly`)
/// specialization of everything downstream.
pub trait Objective: Send + Sync {
    type Stats: GradStats;

    /// Scores per row. 1 unless the objective is multi-output.
    fn n_scores(&self) -> usize {
        1
    }

    /// Name of the objective, for logs.
    fn name(&self) -> &'static str;

    /// Evaluate gradients at `predictions` into `out`.
    ///
    /// `out` must already be shaped `[targets.n_rows(), self.n_scores()]`.
    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<Self::Stats>,
    ) -> Result<()>;
}

// =============================================================================
// Helpers
// =============================================================================

/// Check that predictions and output agree with the row and score count.
fn validate_objective_inputs<S: GradStats>(
    n_rows: usize,
    n_scores: usize,
    predictions: &[f64],
    out: &Gradients<S>,
) -> Result<()> {
    if out.n_rows() != n_rows || out.n_scores() != n_scores {
        return Err(CoreError::invalid(
            "gradients",
            format!(
                "buffer is {} x {}, expected {n_rows} x {n_scores}",
                out.n_rows(),
                out.n_scores()
            ),
        ));
    }
    if Some(predictions.len()) != n_rows.checked_mul(n_scores) {
        return Err(CoreError::invalid(
            "predictions",
            format!("expected {n_rows} x {n_scores} values, got {}", predictions.len()),
        ));
    }
    Ok(())
}

fn regression_targets<'a>(targets: &Targets<'a>, objective: &'static str) -> Result<&'a [f64]> {
    match *targets {
        Targets::Regression(values) => Ok(values),
        _ => Err(CoreError::invalid(
            "targets",
            format!("{objective} expects real-valued targets"),
        )),
    }
}

fn class_targets<'a>(targets: &Targets<'a>, objective: &'static str) -> Result<&'a [u32]> {
    match *targets {
        Targets::Classification(labels) => Ok(labels),
        _ => Err(CoreError::invalid(
            "targets",
            format!("{objective} expects class labels"),
        )),
    }
}
