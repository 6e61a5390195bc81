//! Gain computation and regularization parameters.

use crate::error::{CoreError, Result};
use crate::training::gbdt::histograms::BucketSum;
use crate::training::gradients::GradStats;

/// Negative gains this close to zero are rounding noise and read as 0.
pub const NEGATIVE_GAIN_EPSILON: f64 = 1e-7;

// =============================================================================
// Gain Parameters
// =============================================================================

/// Parameters for split gain computation and leaf value calculation.
///
/// Static for the lifetime of one growth or scoring invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GainParams {
    /// L2 regularization (lambda).
    pub reg_lambda: f64,
    /// L1 regularization (alpha).
    pub reg_alpha: f64,
    /// A split is accepted only if its gain exceeds this.
    pub min_gain: f64,
    /// Minimum denominator (hessian sum, or weight) per child and score.
    pub min_child_weight: f64,
    /// Minimum rows per child.
    pub min_samples_leaf: u64,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            min_gain: 0.0,
            min_child_weight: 0.0,
            min_samples_leaf: 1,
        }
    }
}

impl GainParams {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("reg_lambda", self.reg_lambda),
            ("reg_alpha", self.reg_alpha),
            ("min_gain", self.min_gain),
            ("min_child_weight", self.min_child_weight),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CoreError::invalid(
                    name,
                    format!("must be finite and non-negative, got {value}"),
                ));
            }
        }
        Ok(())
    }

    /// L1 soft thresholding of a gradient sum.
    #[inline]
    fn threshold_l1(&self, grad: f64) -> f64 {
        if self.reg_alpha == 0.0 {
            grad
        } else if grad > self.reg_alpha {
            grad - self.reg_alpha
        } else if grad < -self.reg_alpha {
            grad + self.reg_alpha
        } else {
            0.0
        }
    }

    /// Regularized score `G² / (D + λ)` of one score's sums.
    #[inline]
    pub fn score(&self, grad: f64, denominator: f64) -> f64 {
        let g = self.threshold_l1(grad);
        g * g / (denominator + self.reg_lambda)
    }

    /// Summed score over all scores of `sum`.
    #[inline]
    pub fn node_score<S: GradStats>(&self, sum: &BucketSum<S>) -> f64 {
        sum.stats
            .iter()
            .enumerate()
            .map(|(k, s)| self.score(s.grad(), sum.denominator(k)))
            .sum()
    }

    /// Split gain, summed over scores.
    ///
    /// ```text
    /// gain = 0.5 * Σ_k [G_L²/(D_L + λ) + G_R²/(D_R + λ) - G_P²/(D_P + λ)]
    /// ```
    ///
    /// `D` is the hessian sum for Newton losses and the row weight otherwise.
    #[inline]
    pub fn compute_gain<S: GradStats>(
        &self,
        left: &BucketSum<S>,
        right: &BucketSum<S>,
        parent_score: f64,
    ) -> f64 {
        0.5 * (self.node_score(left) + self.node_score(right) - parent_score)
    }

    /// Check minimum count and weight constraints for one child.
    ///
    /// An empty child is never valid, whatever `min_samples_leaf` says.
    #[inline]
    pub fn is_valid_child<S: GradStats>(&self, child: &BucketSum<S>) -> bool {
        child.count > 0 && child.count >= self.min_samples_leaf && child.min_denominator() >= self.min_child_weight
    }

    /// Compute a leaf value with L1 and L2 regularization.
    ///
    /// ```text
    /// value = -sign(G) × max(0, |G| - α) / (D + λ)
    /// ```
    #[inline]
    pub fn compute_leaf_value(&self, grad_sum: f64, denominator: f64) -> f64 {
        let g = self.threshold_l1(grad_sum);
        if g == 0.0 {
            return 0.0;
        }
        -g / (denominator + self.reg_lambda)
    }

    /// Leaf values for every score of `sum`.
    pub fn leaf_values<S: GradStats>(&self, sum: &BucketSum<S>) -> Vec<f64> {
        sum.stats
            .iter()
            .enumerate()
            .map(|(k, s)| self.compute_leaf_value(s.grad(), sum.denominator(k)))
            .collect()
    }
}

/// Fold rounding noise in `gain` and flag degenerate values.
///
/// Returns `None` for a non-finite gain. Small negative gains within
/// [`NEGATIVE_GAIN_EPSILON`] become 0.
#[inline]
pub fn clean_gain(gain: f64) -> Option<f64> {
    if !gain.is_finite() {
        None
    } else if gain < 0.0 && gain >= -NEGATIVE_GAIN_EPSILON {
        Some(0.0)
    } else {
        Some(gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;
    use crate::training::gradients::{GradHess, GradOnly};

    fn newton(count: u64, grad: f64, hess: f64) -> BucketSum<GradHess> {
        BucketSum {
            count,
            weight: count as f64,
            stats: vec![GradHess::new(grad, hess)],
        }
    }

    #[test]
    fn gain_computation() {
        let params = GainParams::default();
        let parent = newton(20, 0.0, 10.0);
        let gain = params.compute_gain(
            &newton(10, 10.0, 5.0),
            &newton(10, -10.0, 5.0),
            params.node_score(&parent),
        );
        // 0.5 * (100/6 + 100/6 - 0)
        assert_approx_eq!(gain, 100.0 / 6.0, 1e-12);
    }

    #[test]
    fn gradient_only_uses_weight() {
        let params = GainParams {
            reg_lambda: 0.0,
            ..Default::default()
        };
        let sum = BucketSum {
            count: 4,
            weight: 2.0,
            stats: vec![GradOnly::new(-3.0)],
        };
        assert_approx_eq!(params.node_score(&sum), 4.5, 1e-12);
        assert_approx_eq!(params.leaf_values(&sum)[0], 1.5, 1e-12);
    }

    #[test]
    fn valid_child_check() {
        let params = GainParams {
            min_child_weight: 5.0,
            min_samples_leaf: 10,
            ..Default::default()
        };
        assert!(params.is_valid_child(&newton(10, 0.0, 5.0)));
        assert!(!params.is_valid_child(&newton(10, 0.0, 4.0)));
        assert!(!params.is_valid_child(&newton(9, 0.0, 5.0)));
    }

    #[test]
    fn empty_child_is_never_valid() {
        let params = GainParams {
            reg_lambda: 0.0,
            min_samples_leaf: 0,
            ..Default::default()
        };
        assert!(!params.is_valid_child(&newton(0, 0.0, 0.0)));
        assert!(params.is_valid_child(&newton(1, 0.5, 0.25)));
    }

    #[test]
    fn leaf_value_no_l1() {
        let params = GainParams::default();
        assert_approx_eq!(params.compute_leaf_value(-10.0, 5.0), 10.0 / 6.0, 1e-12);
    }

    #[test]
    fn leaf_value_with_l1() {
        let params = GainParams {
            reg_alpha: 2.0,
            ..Default::default()
        };
        assert_eq!(params.compute_leaf_value(-1.0, 5.0), 0.0);
        assert_approx_eq!(params.compute_leaf_value(-10.0, 5.0), 8.0 / 6.0, 1e-12);
        assert_approx_eq!(params.compute_leaf_value(10.0, 5.0), -8.0 / 6.0, 1e-12);
    }

    #[test]
    fn validate_rejects_negative_and_nan() {
        assert!(GainParams::default().validate().is_ok());
        let bad = GainParams {
            reg_lambda: -1.0,
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err().code(), 1);
        let nan = GainParams {
            min_gain: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn clean_gain_folds_noise() {
        assert_eq!(clean_gain(-1e-9), Some(0.0));
        assert_eq!(clean_gain(-0.5), Some(-0.5));
        assert_eq!(clean_gain(f64::NAN), None);
        assert_eq!(clean_gain(f64::NEG_INFINITY), None);
    }
}
