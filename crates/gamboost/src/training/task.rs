//! Task kind and target encoding.
//!
//! The boundary layer passes the task as a raw class count:
//! `-1` for regression, `0` for classification whose class count is
//! resolved from the labels, and `n >= 1` for a fixed class count.

use bon::Builder;

use super::gradients::{GradStats, Gradients};
use super::objectives::Objective;
use crate::error::{ensure_finite, CoreError, Result};

/// Raw encoding of [`LearningType::Regression`].
pub const RAW_REGRESSION: i64 = -1;
/// Raw encoding of [`ClassCount::Dynamic`].
pub const RAW_DYNAMIC_CLASSIFICATION: i64 = 0;

/// Number of classes of a classification task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassCount {
    /// Resolved from the labels as `max(label) + 1`.
    Dynamic,
    Fixed(usize),
}

/// High-level task kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LearningType {
    #[default]
    Regression,
    Classification(ClassCount),
}

impl LearningType {
    /// Decode the raw class count.
    ///
    /// ```
    /// use gamboost::training::{ClassCount, LearningType};
    ///
    /// assert_eq!(LearningType::from_raw(-1).unwrap(), LearningType::Regression);
    /// assert_eq!(
    ///     LearningType::from_raw(0).unwrap(),
    ///     LearningType::Classification(ClassCount::Dynamic)
    /// );
    /// assert!(LearningType::from_raw(-2).is_err());
    /// ```
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            RAW_REGRESSION => Ok(Self::Regression),
            RAW_DYNAMIC_CLASSIFICATION => Ok(Self::Classification(ClassCount::Dynamic)),
            n if n > 0 => usize::try_from(n)
                .map(|n| Self::Classification(ClassCount::Fixed(n)))
                .map_err(|_| CoreError::invalid("n_classes", format!("{n} does not fit usize"))),
            n => Err(CoreError::invalid(
                "n_classes",
                format!("{n} is not a valid class count (expected -1, 0 or >= 1)"),
            )),
        }
    }

    #[inline]
    pub fn is_classification(&self) -> bool {
        matches!(self, Self::Classification(_))
    }

    /// Resolve the class count against `labels`, validating every label.
    pub fn resolve_classes(&self, labels: &[u32]) -> Result<usize> {
        let Self::Classification(count) = self else {
            return Err(CoreError::invalid("targets", "regression task has no classes"));
        };
        let max_label = labels.iter().copied().max();
        match (*count, max_label) {
            (ClassCount::Dynamic, None) => Ok(1),
            (ClassCount::Dynamic, Some(max)) => Ok(max as usize + 1),
            (ClassCount::Fixed(n), Some(max)) if max as usize >= n => Err(CoreError::invalid(
                "targets",
                format!("label {max} out of range for {n} classes"),
            )),
            (ClassCount::Fixed(n), _) => Ok(n),
        }
    }
}

/// Number of model scores needed for `n_classes` classes.
///
/// Binary (and degenerate one-class) problems share a single logit.
#[inline]
pub const fn n_scores_for_classes(n_classes: usize) -> usize {
    if n_classes <= 2 {
        1
    } else {
        n_classes
    }
}

/// Target values, typed by task.
#[derive(Clone, Copy, Debug)]
pub enum Targets<'a> {
    Regression(&'a [f64]),
    Classification(&'a [u32]),
    /// Row-major `[n_rows, n_tasks]` regression targets.
    Multitask { values: &'a [f64], n_tasks: usize },
}

impl Targets<'_> {
    /// Number of rows described.
    pub fn n_rows(&self) -> usize {
        match self {
            Self::Regression(v) => v.len(),
            Self::Classification(v) => v.len(),
            Self::Multitask { values, n_tasks } => values.len() / (*n_tasks).max(1),
        }
    }
}

/// Everything needed to turn targets into gradients for one round.
#[derive(Clone, Debug, Builder)]
pub struct TrainingInputs<'a> {
    pub learning_type: LearningType,
    pub targets: Targets<'a>,
    /// Per-row weights. `None` weighs every row 1.
    pub weights: Option<&'a [f64]>,
    /// Row-major initial scores. `None` starts from 0.
    pub init_scores: Option<&'a [f64]>,
}

impl TrainingInputs<'_> {
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.targets.n_rows()
    }

    /// Check shapes, labels and finiteness against `n_scores`.
    pub fn validate(&self, n_scores: usize) -> Result<()> {
        let n_rows = self.n_rows();
        match (self.learning_type, self.targets) {
            (LearningType::Regression, Targets::Regression(values)) => {
                ensure_finite("targets", values)?;
            }
            (LearningType::Regression, Targets::Multitask { values, n_tasks }) => {
                if n_tasks == 0 || values.len() % n_tasks != 0 {
                    return Err(CoreError::invalid(
                        "targets",
                        format!("{} values do not split into {n_tasks} tasks", values.len()),
                    ));
                }
                ensure_finite("targets", values)?;
            }
            (ty @ LearningType::Classification(_), Targets::Classification(labels)) => {
                let n_classes = ty.resolve_classes(labels)?;
                let needed = n_scores_for_classes(n_classes);
                if needed != n_scores {
                    return Err(CoreError::invalid(
                        "n_scores",
                        format!("{n_classes} classes need {needed} scores, objective has {n_scores}"),
                    ));
                }
            }
            (ty, _) => {
                return Err(CoreError::invalid(
                    "targets",
                    format!("target encoding does not match {ty:?}"),
                ))
            }
        }

        if let Some(weights) = self.weights {
            check_weights(weights, n_rows)?;
        }
        if let Some(scores) = self.init_scores {
            if Some(scores.len()) != n_rows.checked_mul(n_scores) {
                return Err(CoreError::invalid(
                    "init_scores",
                    format!("expected {n_rows} x {n_scores} values, got {}", scores.len()),
                ));
            }
            ensure_finite("init_scores", scores)?;
        }
        Ok(())
    }

    /// Validate and evaluate `objective` at the initial scores.
    pub fn gradients<O: Objective>(&self, objective: &O) -> Result<Gradients<O::Stats>> {
        let n_scores = objective.n_scores();
        self.validate(n_scores)?;

        let n_rows = self.n_rows();
        let zeros;
        let predictions = match self.init_scores {
            Some(scores) => scores,
            None => {
                zeros = crate::memory::try_filled(
                    "init scores",
                    crate::memory::checked_len("init scores", &[n_rows, n_scores])?,
                    0.0,
                )?;
                &zeros[..]
            }
        };

        let mut out = Gradients::new(n_rows, n_scores)?;
        objective.compute_gradients(&self.targets, predictions, &mut out)?;
        out.check_finite()?;
        log::debug!(
            "computed {} gradients for {n_rows} rows x {n_scores} scores (hessian: {})",
            objective.name(),
            <O::Stats as GradStats>::HAS_HESSIAN
        );
        Ok(out)
    }
}

/// Weights must cover every row and be finite and non-negative.
pub(crate) fn check_weights(weights: &[f64], n_rows: usize) -> Result<()> {
    if weights.len() != n_rows {
        return Err(CoreError::invalid(
            "weights",
            format!("expected {n_rows} values, got {}", weights.len()),
        ));
    }
    ensure_finite("weights", weights)?;
    if let Some(row) = weights.iter().position(|&w| w < 0.0) {
        return Err(CoreError::invalid("weights", format!("row {row} is negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::objectives::{LogisticLoss, SoftmaxLoss, SquaredLoss};
    use rstest::rstest;

    #[rstest]
    #[case(-1, LearningType::Regression)]
    #[case(0, LearningType::Classification(ClassCount::Dynamic))]
    #[case(1, LearningType::Classification(ClassCount::Fixed(1)))]
    #[case(5, LearningType::Classification(ClassCount::Fixed(5)))]
    fn decodes_raw_class_count(#[case] raw: i64, #[case] expected: LearningType) {
        assert_eq!(LearningType::from_raw(raw).unwrap(), expected);
    }

    #[test]
    fn rejects_below_regression() {
        assert_eq!(LearningType::from_raw(-7).unwrap_err().code(), 1);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 1)]
    #[case(3, 3)]
    #[case(10, 10)]
    fn score_count_rule(#[case] n_classes: usize, #[case] n_scores: usize) {
        assert_eq!(n_scores_for_classes(n_classes), n_scores);
    }

    #[test]
    fn dynamic_classes_from_labels() {
        let ty = LearningType::Classification(ClassCount::Dynamic);
        assert_eq!(ty.resolve_classes(&[0, 3, 1]).unwrap(), 4);

        let fixed = LearningType::Classification(ClassCount::Fixed(3));
        assert!(fixed.resolve_classes(&[0, 3]).is_err());
        assert_eq!(fixed.resolve_classes(&[0, 2]).unwrap(), 3);
    }

    #[test]
    fn mismatched_target_encoding_rejected() {
        let inputs = TrainingInputs::builder()
            .learning_type(LearningType::Regression)
            .targets(Targets::Classification(&[0, 1]))
            .build();
        assert!(inputs.gradients(&SquaredLoss).is_err());
    }

    #[test]
    fn score_count_must_match_objective() {
        let labels = [0u32, 1, 2, 1];
        let inputs = TrainingInputs::builder()
            .learning_type(LearningType::Classification(ClassCount::Dynamic))
            .targets(Targets::Classification(&labels))
            .build();

        assert!(inputs.gradients(&LogisticLoss).is_err());
        let grads = inputs.gradients(&SoftmaxLoss::new(3).unwrap()).unwrap();
        assert_eq!(grads.n_scores(), 3);
        assert_eq!(grads.n_rows(), 4);
    }

    fn weighted<'a>(targets: &'a [f64], weights: &'a [f64]) -> TrainingInputs<'a> {
        TrainingInputs::builder()
            .learning_type(LearningType::Regression)
            .targets(Targets::Regression(targets))
            .weights(weights)
            .build()
    }

    #[test]
    fn bad_weights_rejected() {
        let targets = [1.0, 2.0];
        assert_eq!(weighted(&targets, &[1.0]).validate(1).unwrap_err().code(), 1);
        assert_eq!(weighted(&targets, &[1.0, -1.0]).validate(1).unwrap_err().code(), 1);
        assert_eq!(weighted(&targets, &[1.0, f64::NAN]).validate(1).unwrap_err().code(), 4);
        assert!(weighted(&targets, &[0.5, 2.0]).validate(1).is_ok());
    }

    #[test]
    fn init_scores_feed_predictions() {
        let targets = [1.0, 2.0];
        let inputs = TrainingInputs::builder()
            .learning_type(LearningType::Regression)
            .targets(Targets::Regression(&targets))
            .init_scores(&[1.0, 1.0])
            .build();
        let grads = inputs.gradients(&SquaredLoss).unwrap();
        assert_eq!(grads.get(0, 0).grad, 0.0);
        assert_eq!(grads.get(1, 0).grad, -1.0);
    }
}
