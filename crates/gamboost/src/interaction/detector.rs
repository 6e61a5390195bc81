//! Interaction detector session.

use std::cmp::Ordering;
use std::sync::Arc;

use bon::Builder;
use ndarray::Axis;

use super::score::{axis_order, interaction_score, CumulativeGrid};
use crate::data::PackedDataset;
use crate::error::{CoreError, Result};
use crate::memory::{array_bytes, MemoryBudget, Reservation};
use crate::training::gbdt::histograms::build_pair_histogram;
use crate::training::gbdt::split::GainParams;
use crate::training::gradients::{GradStats, Gradients};
use crate::training::objectives::Objective;
use crate::training::task::{check_weights, LearningType, TrainingInputs};
use crate::utils::Parallelism;

/// Parameters for pair scoring.
///
/// ```
/// use gamboost::interaction::InteractionParams;
///
/// let params = InteractionParams::builder().build().unwrap();
/// assert_eq!(params, InteractionParams::default());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct InteractionParams {
    /// Gain regularization and the minimum size of every quadrant.
    #[builder(default)]
    pub gain: GainParams,
    /// Parallelism across pairs.
    #[builder(default)]
    pub parallelism: Parallelism,
}

impl<S: interaction_params_builder::IsComplete> InteractionParamsBuilder<S> {
    /// Build and validate the parameters.
    pub fn build(self) -> Result<InteractionParams> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl InteractionParams {
    pub fn validate(&self) -> Result<()> {
        self.gain.validate()
    }
}

/// Score of one canonical `(low, high)` feature pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairScore {
    pub pair: (usize, usize),
    pub score: f64,
}

/// A pair-scoring session over one dataset and one set of gradients.
///
/// Gradients are computed once at construction and held against the budget
/// until the session is dropped.
#[derive(Debug)]
pub struct InteractionDetector<'a, S> {
    dataset: &'a PackedDataset,
    gradients: Gradients<S>,
    weights: Option<&'a [f64]>,
    strict: bool,
    params: InteractionParams,
    budget: Arc<MemoryBudget>,
    _reservation: Reservation,
}

impl<'a, S: GradStats> InteractionDetector<'a, S> {
    /// Evaluate `objective` on `inputs` and open a session.
    pub fn new<O: Objective<Stats = S>>(
        dataset: &'a PackedDataset,
        objective: &O,
        inputs: &TrainingInputs<'a>,
        params: InteractionParams,
        budget: Arc<MemoryBudget>,
    ) -> Result<Self> {
        params.validate()?;
        if inputs.n_rows() != dataset.n_rows() {
            return Err(CoreError::invalid(
                "targets",
                format!("{} rows for a dataset of {}", inputs.n_rows(), dataset.n_rows()),
            ));
        }
        let bytes = array_bytes::<S>("gradients", dataset.n_rows().saturating_mul(objective.n_scores()))?;
        let reservation = budget.reserve("gradients", bytes)?;
        let gradients = inputs.gradients(objective)?;
        log::debug!(
            "interaction session: {} rows, {} features, objective {}",
            dataset.n_rows(),
            dataset.n_features(),
            objective.name()
        );
        Ok(Self {
            dataset,
            gradients,
            weights: inputs.weights,
            strict: inputs.learning_type.is_classification(),
            params,
            budget,
            _reservation: reservation,
        })
    }

    /// Open a session over precomputed gradients.
    pub fn from_gradients(
        dataset: &'a PackedDataset,
        gradients: Gradients<S>,
        weights: Option<&'a [f64]>,
        learning_type: LearningType,
        params: InteractionParams,
        budget: Arc<MemoryBudget>,
    ) -> Result<Self> {
        params.validate()?;
        if gradients.n_rows() != dataset.n_rows() {
            return Err(CoreError::invalid(
                "gradients",
                format!("{} rows for a dataset of {}", gradients.n_rows(), dataset.n_rows()),
            ));
        }
        if let Some(weights) = weights {
            check_weights(weights, dataset.n_rows())?;
        }
        gradients.check_finite()?;
        let bytes = array_bytes::<S>("gradients", gradients.as_slice().len())?;
        let reservation = budget.reserve("gradients", bytes)?;
        Ok(Self {
            dataset,
            gradients,
            weights,
            strict: learning_type.is_classification(),
            params,
            budget,
            _reservation: reservation,
        })
    }

    #[inline]
    pub fn gradients(&self) -> &Gradients<S> {
        &self.gradients
    }

    /// Interaction strength of features `a` and `b`.
    ///
    /// The pair is scored as `(min, max)`, so the order of `a` and `b` does not
    /// matter. A feature with a single bin scores 0.
    pub fn score_pair(&self, a: usize, b: usize) -> Result<f64> {
        if a == b {
            return Err(CoreError::invalid("pair", format!("feature {a} paired with itself")));
        }
        let (a, b) = (a.min(b), a.max(b));
        let meta_a = *self.dataset.feature(a)?;
        let meta_b = *self.dataset.feature(b)?;
        let (n_a, n_b) = (meta_a.n_bins as usize, meta_b.n_bins as usize);
        if n_a < 2 || n_b < 2 {
            return Ok(0.0);
        }

        let table = build_pair_histogram(self.dataset, a, b, &self.gradients, self.weights, &self.budget)?;
        let gain = &self.params.gain;
        let order_a = axis_order(&table, n_a, n_b, Axis(0), meta_a.categorical, gain);
        let order_b = axis_order(&table, n_a, n_b, Axis(1), meta_b.categorical, gain);
        let grid = CumulativeGrid::from_table(&table, &order_a, &order_b, &self.budget)?;
        drop(table);
        let score = interaction_score(&grid, &self.params.gain, self.strict)?;
        log::trace!("pair ({a}, {b}): {score}");
        Ok(score)
    }

    /// Score every pair, in parallel when allowed. Results keep input order.
    pub fn score_pairs(&self, pairs: &[(usize, usize)]) -> Vec<Result<PairScore>> {
        self.params.parallelism.maybe_par_map(pairs, |&(a, b)| {
            self.score_pair(a, b).map(|score| PairScore {
                pair: (a.min(b), a.max(b)),
                score,
            })
        })
    }

    /// Score `pairs` and sort by descending score, ties by pair.
    ///
    /// Pairs that fail to score are logged and left out.
    pub fn rank_pairs(&self, pairs: &[(usize, usize)]) -> Vec<PairScore> {
        let mut ranked: Vec<PairScore> = pairs
            .iter()
            .zip(self.score_pairs(pairs))
            .filter_map(|(pair, result)| match result {
                Ok(score) => Some(score),
                Err(e) => {
                    log::warn!("skipping pair {pair:?}: {e}");
                    None
                }
            })
            .collect();
        ranked.sort_by(|x, y| match y.score.total_cmp(&x.score) {
            Ordering::Equal => x.pair.cmp(&y.pair),
            other => other,
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureMeta;
    use crate::error::ErrorKind;
    use crate::training::gradients::GradOnly;
    use crate::training::objectives::SquaredLoss;
    use crate::training::task::Targets;

    /// Features 0 and 1 XOR together; feature 2 is noise-free constant.
    fn xor_dataset() -> PackedDataset {
        let a: Vec<u32> = (0..16).map(|r| r % 2).collect();
        let b: Vec<u32> = (0..16).map(|r| (r / 2) % 2).collect();
        PackedDataset::builder()
            .add_feature(FeatureMeta::ordinal(2), &a)
            .add_feature(FeatureMeta::ordinal(2), &b)
            .add_feature(FeatureMeta::ordinal(1), &[0; 16])
            .build()
            .unwrap()
    }

    fn xor_targets() -> Vec<f64> {
        (0..16u32).map(|r| if (r % 2) ^ ((r / 2) % 2) == 1 { 1.0 } else { -1.0 }).collect()
    }

    #[test]
    fn scores_are_symmetric() {
        let ds = xor_dataset();
        let targets = xor_targets();
        let inputs = TrainingInputs::builder()
            .learning_type(LearningType::Regression)
            .targets(Targets::Regression(&targets))
            .build();
        let budget = MemoryBudget::unlimited();
        let det = InteractionDetector::new(&ds, &SquaredLoss, &inputs, InteractionParams::default(), budget.clone())
            .unwrap();

        let ab = det.score_pair(0, 1).unwrap();
        assert!(ab > 0.0);
        assert_eq!(ab.to_bits(), det.score_pair(1, 0).unwrap().to_bits());
        assert_eq!(det.score_pair(0, 2).unwrap(), 0.0);
        assert_eq!(det.score_pair(1, 1).unwrap_err().kind(), ErrorKind::InvalidParameter);
        assert_eq!(det.score_pair(0, 7).unwrap_err().kind(), ErrorKind::InvalidParameter);

        drop(det);
        assert_eq!(budget.in_use(), 0);
    }

    #[test]
    fn ranking_skips_failures() {
        let ds = xor_dataset();
        let grads = Gradients::from_vec(xor_targets().into_iter().map(GradOnly::new).collect(), 1).unwrap();
        let det = InteractionDetector::from_gradients(
            &ds,
            grads,
            None,
            LearningType::Regression,
            InteractionParams::default(),
            MemoryBudget::unlimited(),
        )
        .unwrap();

        let ranked = det.rank_pairs(&[(2, 0), (1, 0), (0, 9), (2, 1)]);
        let pairs: Vec<_> = ranked.iter().map(|p| p.pair).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);

        let all = det.score_pairs(&[(1, 0), (0, 9)]);
        assert_eq!(all[0].as_ref().unwrap().pair, (0, 1));
        assert!(all[1].is_err());
    }

    #[test]
    fn categorical_axis_is_cut_in_ratio_order() {
        // 3 rows at b = 0 and 1 at b = 1 per category; even categories pull
        // the target up at b = 0 and down at b = 1, odd ones the reverse.
        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut grads = Vec::new();
        for category in 0..4u32 {
            let sign = if category % 2 == 0 { 1.0 } else { -1.0 };
            for side in [0, 0, 0, 1] {
                a.push(category);
                b.push(side);
                let y = if side == 0 { sign } else { -sign };
                grads.push(GradOnly::new(-y));
            }
        }
        let params = InteractionParams::builder()
            .gain(GainParams {
                reg_lambda: 0.0,
                ..Default::default()
            })
            .build()
            .unwrap();
        let score = |meta_a: FeatureMeta| {
            let ds = PackedDataset::builder()
                .add_feature(meta_a, &a)
                .add_feature(FeatureMeta::ordinal(2), &b)
                .build()
                .unwrap();
            let grads = Gradients::from_vec(grads.clone(), 1).unwrap();
            InteractionDetector::from_gradients(
                &ds,
                grads,
                None,
                LearningType::Regression,
                params.clone(),
                MemoryBudget::unlimited(),
            )
            .unwrap()
            .score_pair(0, 1)
            .unwrap()
        };

        // {0, 2} | {1, 3} is reachable only through the ratio order
        crate::assert_approx_eq!(score(FeatureMeta::categorical(4)), 6.0 / 16.0, 1e-12);
        crate::assert_approx_eq!(score(FeatureMeta::ordinal(4)), 2.0 / 16.0, 1e-12);
    }

    #[test]
    fn pair_grid_respects_budget() {
        let ds = xor_dataset();
        let grads = Gradients::from_vec(vec![GradOnly::new(1.0); 16], 1).unwrap();
        let gradient_bytes = 16 * std::mem::size_of::<GradOnly>();
        let budget = MemoryBudget::with_limit(gradient_bytes + 8);
        let det = InteractionDetector::from_gradients(
            &ds,
            grads,
            None,
            LearningType::Regression,
            InteractionParams::default(),
            budget.clone(),
        )
        .unwrap();

        let err = det.score_pair(0, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityOverflow);
        assert_eq!(budget.in_use(), gradient_bytes);
    }
}
