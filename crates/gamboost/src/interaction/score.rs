//! Interaction strength of one feature pair from its 2-D histogram.
//!
//! The pair table is turned into a cumulative grid `C[i, j]` holding the sums
//! of every cell with `a <= i` and `b <= j`. Any quadrant of a cut `(i, j)`
//! is then a few additions and subtractions away:
//!
//! ```text
//! LL = C[i, j]             LH = C[i, n_b - 1] - LL
//! HL = C[n_a - 1, j] - LL  HH = (P - C[i, n_b - 1]) - HL
//! ```
//!
//! The interaction at a cut is the four-quadrant gain minus the single-axis
//! gains of the same cuts. The score is the best interaction over all cuts,
//! floored at zero and divided by the total row weight.
//!
//! Categorical axes are laid out in the ratio order tree growth uses, so a
//! cut on such an axis is a split of its categories into two groups.

use std::sync::Arc;

use ndarray::{s, Array2, Array3, Axis};

use crate::error::{CoreError, Result};
use crate::memory::{array_bytes, checked_len, checked_sum, MemoryBudget, Reservation};
use crate::training::gbdt::categorical::{leaf_ratio, order_by_ratio};
use crate::training::gbdt::histograms::{BucketSum, HistogramTable};
use crate::training::gbdt::split::{clean_gain, GainParams};
use crate::training::gradients::GradStats;

/// Cumulative sums over a pair histogram.
#[derive(Debug)]
pub(crate) struct CumulativeGrid<S> {
    counts: Array2<u64>,
    weights: Array2<f64>,
    /// `[i, j, k]`
    stats: Array3<S>,
    _reservation: Reservation,
}

impl<S: GradStats> CumulativeGrid<S> {
    /// Bytes reserved for an `n_a x n_b` grid of `n_scores` scores.
    pub(crate) fn bytes_for(n_a: usize, n_b: usize, n_scores: usize) -> Result<usize> {
        let cells = checked_len("interaction grid", &[n_a, n_b])?;
        let n_stats = checked_len("interaction grid", &[cells, n_scores])?;
        checked_sum(
            "interaction grid",
            &[
                array_bytes::<u64>("interaction grid", cells)?,
                array_bytes::<f64>("interaction grid", cells)?,
                array_bytes::<S>("interaction grid", n_stats)?,
            ],
        )
    }

    /// Cumulate `table`, laid out row-major over `a`, visiting the axes in
    /// `order_a` and `order_b`.
    pub(crate) fn from_table(
        table: &HistogramTable<S>,
        order_a: &[usize],
        order_b: &[usize],
        budget: &Arc<MemoryBudget>,
    ) -> Result<Self> {
        let (n_a, n_b, k) = (order_a.len(), order_b.len(), table.n_scores());
        if checked_len("interaction grid", &[n_a, n_b])? != table.n_buckets() {
            return Err(CoreError::invalid(
                "pair histogram",
                format!("{} buckets for a {n_a} x {n_b} grid", table.n_buckets()),
            ));
        }
        let reservation = budget.reserve("interaction grid", Self::bytes_for(n_a, n_b, k)?)?;

        let what = "interaction grid";
        let mut counts = Array2::from_shape_vec((n_a, n_b), permuted(what, table.counts(), order_a, order_b, 1)?)
            .map_err(|e| CoreError::invalid("pair histogram", e.to_string()))?;
        let mut weights = Array2::from_shape_vec((n_a, n_b), permuted(what, table.weights(), order_a, order_b, 1)?)
            .map_err(|e| CoreError::invalid("pair histogram", e.to_string()))?;
        let mut stats = Array3::from_shape_vec((n_a, n_b, k), permuted(what, table.stats(), order_a, order_b, k)?)
            .map_err(|e| CoreError::invalid("pair histogram", e.to_string()))?;

        // along b, then along a
        for axis in [Axis(1), Axis(0)] {
            counts.accumulate_axis_inplace(axis, |&prev, cur| *cur += prev);
            weights.accumulate_axis_inplace(axis, |&prev, cur| *cur += prev);
            stats.accumulate_axis_inplace(axis, |&prev, cur| *cur += prev);
        }

        Ok(Self {
            counts,
            weights,
            stats,
            _reservation: reservation,
        })
    }

    #[inline]
    fn n_a(&self) -> usize {
        self.counts.nrows()
    }

    #[inline]
    fn n_b(&self) -> usize {
        self.counts.ncols()
    }

    #[inline]
    fn n_scores(&self) -> usize {
        self.stats.len_of(Axis(2))
    }

    /// `out = C[i, j]`
    fn load(&self, i: usize, j: usize, out: &mut BucketSum<S>) {
        out.count = self.counts[[i, j]];
        out.weight = self.weights[[i, j]];
        for (o, &s) in out.stats.iter_mut().zip(self.stats.slice(s![i, j, ..])) {
            *o = s;
        }
    }
}

/// `out = a - b`
fn difference<S: GradStats>(out: &mut BucketSum<S>, a: &BucketSum<S>, b: &BucketSum<S>) {
    out.count = a.count - b.count;
    out.weight = a.weight - b.weight;
    for ((o, &x), &y) in out.stats.iter_mut().zip(&a.stats).zip(&b.stats) {
        *o = x - y;
    }
}

/// Gains of every cut along one axis, `None` where a side is invalid.
///
/// `low[c]` holds the sums of positions `0..=c` along the axis.
fn axis_gains<S: GradStats>(
    low: &[BucketSum<S>],
    total: &BucketSum<S>,
    params: &GainParams,
    parent_score: f64,
) -> Vec<Option<f64>> {
    let mut high = BucketSum::zeros(total.stats.len());
    low.iter()
        .map(|l| {
            difference(&mut high, total, l);
            let valid = params.is_valid_child(l) && params.is_valid_child(&high);
            valid.then(|| params.compute_gain(l, &high, parent_score))
        })
        .collect()
}

/// Interaction score of the grid, see the module docs.
///
/// A non-finite gain at some cut skips that cut, or fails with
/// `NumericDegenerate` when `strict`.
pub(crate) fn interaction_score<S: GradStats>(
    grid: &CumulativeGrid<S>,
    params: &GainParams,
    strict: bool,
) -> Result<f64> {
    let (n_a, n_b, k) = (grid.n_a(), grid.n_b(), grid.n_scores());
    if n_a < 2 || n_b < 2 {
        return Ok(0.0);
    }

    let mut total = BucketSum::zeros(k);
    grid.load(n_a - 1, n_b - 1, &mut total);
    if total.weight <= 0.0 {
        return Ok(0.0);
    }
    let parent_score = params.node_score(&total);

    // Marginals at every cut: rows with a <= i, rows with b <= j.
    let low_a: Vec<BucketSum<S>> = (0..n_a - 1)
        .map(|i| {
            let mut sum = BucketSum::zeros(k);
            grid.load(i, n_b - 1, &mut sum);
            sum
        })
        .collect();
    let low_b: Vec<BucketSum<S>> = (0..n_b - 1)
        .map(|j| {
            let mut sum = BucketSum::zeros(k);
            grid.load(n_a - 1, j, &mut sum);
            sum
        })
        .collect();
    let gains_a = axis_gains(&low_a, &total, params, parent_score);
    let gains_b = axis_gains(&low_b, &total, params, parent_score);

    let mut ll = BucketSum::zeros(k);
    let mut lh = BucketSum::zeros(k);
    let mut hl = BucketSum::zeros(k);
    let mut hh = BucketSum::zeros(k);
    let mut high_a = BucketSum::zeros(k);
    let mut best = 0.0f64;

    for (i, la) in low_a.iter().enumerate() {
        let Some(gain_a) = gains_a[i] else { continue };
        difference(&mut high_a, &total, la);
        for (j, lb) in low_b.iter().enumerate() {
            let Some(gain_b) = gains_b[j] else { continue };
            grid.load(i, j, &mut ll);
            difference(&mut lh, la, &ll);
            difference(&mut hl, lb, &ll);
            difference(&mut hh, &high_a, &hl);
            if ![&ll, &lh, &hl, &hh].into_iter().all(|q| params.is_valid_child(q)) {
                continue;
            }

            let joint = 0.5
                * (params.node_score(&ll) + params.node_score(&lh) + params.node_score(&hl) + params.node_score(&hh)
                    - parent_score);
            let raw = joint - gain_a - gain_b;
            let Some(gain) = clean_gain(raw) else {
                if strict {
                    return Err(CoreError::NumericDegenerate {
                        what: "interaction gain",
                        index: i * n_b + j,
                    });
                }
                log::trace!("cut ({i}, {j}): degenerate interaction {raw}, skipped");
                continue;
            };
            if gain > best {
                best = gain;
            }
        }
    }
    Ok(best / total.weight)
}

/// Cells of a row-major `[a, b, width]` array, in `order_a x order_b` order.
fn permuted<T: Copy>(
    what: &'static str,
    src: &[T],
    order_a: &[usize],
    order_b: &[usize],
    width: usize,
) -> Result<Vec<T>> {
    let n_b = order_b.len();
    let mut v = Vec::new();
    v.try_reserve_exact(src.len())
        .map_err(|_| CoreError::AllocationFailure {
            what,
            bytes: src.len().saturating_mul(std::mem::size_of::<T>()),
        })?;
    for &a in order_a {
        for &b in order_b {
            let cell = (a * n_b + b) * width;
            v.extend_from_slice(&src[cell..cell + width]);
        }
    }
    Ok(v)
}

/// Visiting order of one axis of a pair table.
///
/// Ordinal axes keep bin order. Categorical axes are ranked by the leaf
/// ratio of their marginals, the same ranking tree growth uses.
pub(crate) fn axis_order<S: GradStats>(
    table: &HistogramTable<S>,
    n_a: usize,
    n_b: usize,
    axis: Axis,
    categorical: bool,
    params: &GainParams,
) -> Vec<usize> {
    let len = if axis == Axis(0) { n_a } else { n_b };
    if !categorical {
        return (0..len).collect();
    }
    let mut marginals = vec![BucketSum::zeros(table.n_scores()); len];
    for a in 0..n_a {
        for b in 0..n_b {
            let p = if axis == Axis(0) { a } else { b };
            marginals[p].add_bucket(table.bucket(a * n_b + b));
        }
    }
    order_by_ratio(marginals.iter().map(|m| leaf_ratio(&m.stats, m.weight, params)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;
    use crate::training::gradients::GradOnly;

    fn identity(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    /// `cells[a][b] = (count, grad)`, weight = count.
    fn grid(cells: &[&[(u64, f64)]]) -> CumulativeGrid<GradOnly> {
        let (n_a, n_b) = (cells.len(), cells[0].len());
        let budget = MemoryBudget::unlimited();
        let mut t = HistogramTable::zeroed(n_a * n_b, 1, &budget).unwrap();
        for (a, row) in cells.iter().enumerate() {
            for (b, &(count, grad)) in row.iter().enumerate() {
                for _ in 0..count {
                    t.add_row::<1>(a * n_b + b, &[GradOnly::new(grad / count as f64)], 1.0);
                }
            }
        }
        CumulativeGrid::from_table(&t, &identity(n_a), &identity(n_b), &budget).unwrap()
    }

    #[test]
    fn cumulative_corners() {
        let g = grid(&[&[(1, 1.0), (2, 2.0)], &[(3, 3.0), (4, 4.0)]]);
        let mut sum = BucketSum::zeros(1);
        g.load(1, 1, &mut sum);
        assert_eq!(sum.count, 10);
        assert_approx_eq!(sum.stats[0].grad, 10.0, 1e-12);
        g.load(0, 1, &mut sum);
        assert_eq!(sum.count, 3);
        g.load(1, 0, &mut sum);
        assert_eq!(sum.count, 4);
    }

    #[test]
    fn additive_grid_has_no_interaction() {
        // per-row grad f(a) + g(b) with f = g = [1, -1], four rows per cell
        let g = grid(&[&[(4, 8.0), (4, 0.0)], &[(4, 0.0), (4, -8.0)]]);
        let params = GainParams {
            reg_lambda: 0.0,
            ..Default::default()
        };
        assert_approx_eq!(interaction_score(&g, &params, true).unwrap(), 0.0, 1e-9);
    }

    #[test]
    fn xor_grid_interacts() {
        let g = grid(&[&[(4, 4.0), (4, -4.0)], &[(4, -4.0), (4, 4.0)]]);
        let params = GainParams {
            reg_lambda: 0.0,
            ..Default::default()
        };
        // marginals are flat; the joint gain is 0.5 * 4 * 16 / 4 = 8 over 16 rows
        assert_approx_eq!(interaction_score(&g, &params, true).unwrap(), 0.5, 1e-12);
    }

    #[test]
    fn single_bin_axis_scores_zero() {
        let g = grid(&[&[(2, 1.0), (2, -1.0), (2, 3.0)]]);
        assert_eq!(interaction_score(&g, &GainParams::default(), true).unwrap(), 0.0);
    }

    #[test]
    fn grid_reservation_released() {
        let budget = MemoryBudget::with_limit(1 << 16);
        let t = HistogramTable::<GradOnly>::zeroed(9, 1, &budget).unwrap();
        let before = budget.in_use();
        let g = CumulativeGrid::from_table(&t, &identity(3), &identity(3), &budget).unwrap();
        assert!(budget.in_use() > before);
        drop(g);
        assert_eq!(budget.in_use(), before);
        assert!(CumulativeGrid::from_table(&t, &identity(2), &identity(3), &budget).is_err());
    }
}
