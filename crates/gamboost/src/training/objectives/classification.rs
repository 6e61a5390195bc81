//! Classification objective functions.

use super::{class_targets, validate_objective_inputs, Objective};
use crate::error::{CoreError, Result};
use crate::training::gradients::{GradHess, Gradients};
use crate::training::task::Targets;

/// Floor on hessians so confident rows keep a non-zero denominator.
const HESS_MIN: f64 = 1e-16;

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Logistic Loss
// =============================================================================

/// Binary log loss on a single logit.
///
/// - Gradient: `sigmoid(pred) - label`
/// - Hessian: `p * (1 - p)`
///
/// Labels must be 0 or 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticLoss;

impl Objective for LogisticLoss {
    type Stats = GradHess;

    fn name(&self) -> &'static str {
        "logistic"
    }

    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<GradHess>,
    ) -> Result<()> {
        let labels = class_targets(targets, self.name())?;
        validate_objective_inputs(labels.len(), 1, predictions, out)?;

        for (row, ((slot, &pred), &label)) in out
            .as_mut_slice()
            .iter_mut()
            .zip(predictions)
            .zip(labels)
            .enumerate()
        {
            if label > 1 {
                return Err(CoreError::invalid(
                    "targets",
                    format!("row {row} has label {label}, binary labels are 0 or 1"),
                ));
            }
            let p = sigmoid(pred);
            *slot = GradHess::new(p - f64::from(label), (p * (1.0 - p)).max(HESS_MIN));
        }
        Ok(())
    }
}

// =============================================================================
// Softmax Loss
// =============================================================================

/// Multiclass cross-entropy with one score per class.
///
/// Each class gets a one-vs-rest gradient `p_k - [label == k]` and the
/// diagonal hessian `p_k * (1 - p_k)`.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxLoss {
    n_classes: usize,
}

impl SoftmaxLoss {
    /// Two classes share one logit, so at least 3 are required.
    pub fn new(n_classes: usize) -> Result<Self> {
        if n_classes < 3 {
            return Err(CoreError::invalid(
                "n_classes",
                format!("softmax needs >= 3 classes, got {n_classes}; use LogisticLoss"),
            ));
        }
        Ok(Self { n_classes })
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl Objective for SoftmaxLoss {
    type Stats = GradHess;

    fn n_scores(&self) -> usize {
        self.n_classes
    }

    fn name(&self) -> &'static str {
        "softmax"
    }

    fn compute_gradients(
        &self,
        targets: &Targets<'_>,
        predictions: &[f64],
        out: &mut Gradients<GradHess>,
    ) -> Result<()> {
        let labels = class_targets(targets, self.name())?;
        let k = self.n_classes;
        validate_objective_inputs(labels.len(), k, predictions, out)?;

        for (row, &label) in labels.iter().enumerate() {
            let label = label as usize;
            if label >= k {
                return Err(CoreError::invalid(
                    "targets",
                    format!("row {row} has label {label} for {k} classes"),
                ));
            }
            let logits = &predictions[row * k..(row + 1) * k];

            // Shift by the max logit for numerical stability
            let max_logit = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let exp_sum: f64 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

            for (class, (slot, &logit)) in out.row_mut(row).iter_mut().zip(logits).enumerate() {
                let p = (logit - max_logit).exp() / exp_sum;
                let indicator = if class == label { 1.0 } else { 0.0 };
                *slot = GradHess::new(p - indicator, (p * (1.0 - p)).max(HESS_MIN));
            }
        }
        Ok(())
    }
}
