//! Histogram building.
//!
//! # Numeric semantics
//!
//! Rows are accumulated in row order, each scaled by its weight, so a table
//! built twice from the same inputs is bit-identical. The row-chunked path
//! ([`build_histogram_chunked`]) sums fixed row ranges independently and
//! merges them in chunk order: deterministic for a given chunk size, but not
//! bit-identical to [`build_histogram`] because the additions are grouped
//! differently.
//!
//! Accumulation is specialized per score count: 1..=4 are unrolled at
//! compile time, anything larger takes the dynamic loop.

use std::ops::Range;
use std::sync::Arc;

use super::table::HistogramTable;
use crate::data::{PackedBins, PackedDataset};
use crate::error::{CoreError, Result};
use crate::memory::{checked_len, MemoryBudget};
use crate::training::gradients::{GradStats, Gradients};
use crate::training::task::check_weights;
use crate::utils::{weight_iter, Parallelism};

/// Default row count per chunk for [`build_histogram_chunked`].
pub const DEFAULT_CHUNK_ROWS: usize = 16 * 1024;

// =============================================================================
// Entry points
// =============================================================================

/// Build the 1-D histogram of `feature`.
pub fn build_histogram<S: GradStats>(
    dataset: &PackedDataset,
    feature: usize,
    grads: &Gradients<S>,
    weights: Option<&[f64]>,
    budget: &Arc<MemoryBudget>,
) -> Result<HistogramTable<S>> {
    let n_bins = dataset.feature(feature)?.n_bins as usize;
    let column = dataset.column(feature)?;
    check_inputs(dataset.n_rows(), grads, weights)?;

    let mut table = HistogramTable::zeroed(n_bins, grads.n_scores(), budget)?;
    accumulate(&mut table, bins_of(column, 0..dataset.n_rows()), grads, weights, 0..dataset.n_rows());
    Ok(table)
}

/// Build the 2-D histogram of `(a, b)`.
///
/// Bucket `bin_a * n_bins(b) + bin_b`, i.e. row-major over `a`.
pub fn build_pair_histogram<S: GradStats>(
    dataset: &PackedDataset,
    a: usize,
    b: usize,
    grads: &Gradients<S>,
    weights: Option<&[f64]>,
    budget: &Arc<MemoryBudget>,
) -> Result<HistogramTable<S>> {
    let n_a = dataset.feature(a)?.n_bins as usize;
    let n_b = dataset.feature(b)?.n_bins as usize;
    let n_buckets = checked_len("pair histogram", &[n_a, n_b])?;
    check_inputs(dataset.n_rows(), grads, weights)?;

    let mut table = HistogramTable::zeroed(n_buckets, grads.n_scores(), budget)?;
    let buckets = dataset
        .column(a)?
        .iter()
        .zip(dataset.column(b)?.iter())
        .map(|(x, y)| x as usize * n_b + y as usize);
    accumulate(&mut table, buckets, grads, weights, 0..dataset.n_rows());
    Ok(table)
}

/// Build the 1-D histogram of `feature` from independent row chunks.
///
/// Every chunk holds its own table against `budget` until the merge.
pub fn build_histogram_chunked<S: GradStats>(
    dataset: &PackedDataset,
    feature: usize,
    grads: &Gradients<S>,
    weights: Option<&[f64]>,
    chunk_rows: usize,
    parallelism: Parallelism,
    budget: &Arc<MemoryBudget>,
) -> Result<HistogramTable<S>> {
    if chunk_rows == 0 {
        return Err(CoreError::invalid("chunk_rows", "must be >= 1"));
    }
    let n_bins = dataset.feature(feature)?.n_bins as usize;
    let column = dataset.column(feature)?;
    let n_rows = dataset.n_rows();
    check_inputs(n_rows, grads, weights)?;

    let n_chunks = n_rows.div_ceil(chunk_rows).max(1);
    let partials = parallelism.maybe_par_map(0..n_chunks, |chunk| {
        let start = chunk * chunk_rows;
        let end = n_rows.min(start + chunk_rows);
        let mut table = HistogramTable::zeroed(n_bins, grads.n_scores(), budget)?;
        accumulate(&mut table, bins_of(column, start..end), grads, weights, start..end);
        Ok(table)
    });

    let mut partials = partials.into_iter();
    let mut table = match partials.next() {
        Some(first) => first?,
        None => HistogramTable::zeroed(n_bins, grads.n_scores(), budget)?,
    };
    for partial in partials {
        table.merge(&partial?);
    }
    log::trace!("merged {n_chunks} row chunks for feature {feature}");
    Ok(table)
}

// =============================================================================
// Kernels
// =============================================================================

fn check_inputs<S: GradStats>(
    n_rows: usize,
    grads: &Gradients<S>,
    weights: Option<&[f64]>,
) -> Result<()> {
    if grads.n_rows() != n_rows {
        return Err(CoreError::invalid(
            "gradients",
            format!("{} rows for a dataset of {n_rows}", grads.n_rows()),
        ));
    }
    if let Some(weights) = weights {
        check_weights(weights, n_rows)?;
    }
    grads.check_finite()
}

#[inline]
fn bins_of(column: &PackedBins, rows: Range<usize>) -> impl Iterator<Item = usize> + '_ {
    column.iter_range(rows.start, rows.end).map(|b| b as usize)
}

/// Add `rows` into `table`; `buckets` yields each row's bucket in order.
fn accumulate<S: GradStats>(
    table: &mut HistogramTable<S>,
    buckets: impl Iterator<Item = usize>,
    grads: &Gradients<S>,
    weights: Option<&[f64]>,
    rows: Range<usize>,
) {
    match grads.n_scores() {
        1 => accumulate_rows::<S, 1>(table, buckets, grads, weights, rows),
        2 => accumulate_rows::<S, 2>(table, buckets, grads, weights, rows),
        3 => accumulate_rows::<S, 3>(table, buckets, grads, weights, rows),
        4 => accumulate_rows::<S, 4>(table, buckets, grads, weights, rows),
        _ => accumulate_rows::<S, 0>(table, buckets, grads, weights, rows),
    }
}

#[inline(always)]
fn accumulate_rows<S: GradStats, const K: usize>(
    table: &mut HistogramTable<S>,
    buckets: impl Iterator<Item = usize>,
    grads: &Gradients<S>,
    weights: Option<&[f64]>,
    rows: Range<usize>,
) {
    let row_weights = weight_iter(weights.map(|w| &w[rows.clone()]), rows.len());
    for ((row, bucket), w) in rows.zip(buckets).zip(row_weights) {
        table.add_row::<K>(bucket, grads.row(row), w);
    }
}
