//! Regression objective functions.

use super::{regression_targets, validate_objective_inputs, Objective};
use crate::error::{CoreError, Result};
use crate::training::gradients::{GradHess, GradOnly, Gradients};
use crate::training::task::Targets;

// =============================================================================
// Squared Loss
// =============================================================================

/// Squared error loss (L2 loss).
///
/// - Loss: `0.5 * (pred - target)²`
/// - Gradient: `pred - target`
///
/// The hessian is constant, so the leaf denominator is the row weight and
/// the loss runs on the gradient-only path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl Objective for SquaredLoss {
    type Stats = GradOnly;

    fn name(&self) -> &'static str {
        "squared"
    }

    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<GradOnly>,
    ) -> Result<()> {
        let targets = regression_targets(targets, self.name())?;
        validate_objective_inputs(targets.len(), 1, predictions, out)?;

        for ((slot, &pred), &target) in out.as_mut_slice().iter_mut().zip(predictions).zip(targets) {
            *slot = GradOnly::new(pred - target);
        }
        Ok(())
    }
}

// =============================================================================
// Absolute Loss
// =============================================================================

/// Absolute error loss (L1 loss).
///
/// - Loss: `|pred - target|`
/// - Gradient: `sign(pred - target)`, 0 on an exact match
///
/// No usable second derivative.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbsoluteLoss;

impl Objective for AbsoluteLoss {
    type Stats = GradOnly;

    fn name(&self) -> &'static str {
        "absolute"
    }

    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<GradOnly>,
    ) -> Result<()> {
        let targets = regression_targets(targets, self.name())?;
        validate_objective_inputs(targets.len(), 1, predictions, out)?;

        for ((slot, &pred), &target) in out.as_mut_slice().iter_mut().zip(predictions).zip(targets) {
            let diff = pred - target;
            let grad = if diff == 0.0 { 0.0 } else { diff.signum() };
            *slot = GradOnly::new(grad);
        }
        Ok(())
    }
}

// =============================================================================
// Pseudo-Huber Loss
// =============================================================================

/// Pseudo-Huber loss: quadratic near zero, linear for large residuals.
///
/// - Loss: `δ² * (sqrt(1 + (r/δ)²) - 1)` where `r = pred - target`
/// - Gradient: `r / sqrt(1 + (r/δ)²)`
/// - Hessian: `1 / ((1 + (r/δ)²) * sqrt(1 + (r/δ)²))`
#[derive(Debug, Clone, Copy)]
pub struct PseudoHuberLoss {
    delta: f64,
    inv_delta: f64,
}

impl PseudoHuberLoss {
    /// `delta` must be finite and non-zero with a finite inverse.
    pub fn new(delta: f64) -> Result<Self> {
        let inv_delta = 1.0 / delta;
        if !delta.is_finite() || delta == 0.0 || !inv_delta.is_finite() {
            return Err(CoreError::invalid(
                "delta",
                format!("{delta} must be finite, non-zero and invertible"),
            ));
        }
        Ok(Self { delta, inv_delta })
    }

    #[inline]
    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl Objective for PseudoHuberLoss {
    type Stats = GradHess;

    fn name(&self) -> &'static str {
        "pseudo_huber"
    }

    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<GradHess>,
    ) -> Result<()> {
        let targets = regression_targets(targets, self.name())?;
        validate_objective_inputs(targets.len(), 1, predictions, out)?;

        for ((slot, &pred), &target) in out.as_mut_slice().iter_mut().zip(predictions).zip(targets) {
            let residual = pred - target;
            let scaled = residual * self.inv_delta;
            let factor = 1.0 + scaled * scaled;
            let sqrt_factor = factor.sqrt();
            *slot = GradHess::new(residual / sqrt_factor, 1.0 / (factor * sqrt_factor));
        }
        Ok(())
    }
}

// =============================================================================
// Multitask Squared Loss
// =============================================================================

/// Squared loss over several regression tasks, one score per task.
#[derive(Debug, Clone, Copy)]
pub struct MultitaskSquaredLoss {
    n_tasks: usize,
}

impl MultitaskSquaredLoss {
    pub fn new(n_tasks: usize) -> Result<Self> {
        if n_tasks == 0 {
            return Err(CoreError::invalid("n_tasks", "must be >= 1"));
        }
        Ok(Self { n_tasks })
    }
}

impl Objective for MultitaskSquaredLoss {
    type Stats = GradOnly;

    fn n_scores(&self) -> usize {
        self.n_tasks
    }

    fn name(&self) -> &'static str {
        "multitask_squared"
    }

    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<GradOnly>,
    ) -> Result<()> {
        let values = match *targets {
            Targets::Multitask { values, n_tasks } if n_tasks == self.n_tasks => values,
            _ => {
                return Err(CoreError::invalid(
                    "targets",
                    format!("{} expects {} task columns", self.name(), self.n_tasks),
                ))
            }
        };
        validate_objective_inputs(values.len() / self.n_tasks, self.n_tasks, predictions, out)?;

        for ((slot, &pred), &target) in out.as_mut_slice().iter_mut().zip(predictions).zip(values) {
            *slot = GradOnly::new(pred - target);
        }
        Ok(())
    }
}
