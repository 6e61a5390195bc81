//! Categorical feature utilities.
//!
//! Categorical bins have no natural order. Before growth their buckets are
//! ranked by leaf-value ratio so that a contiguous run of the ranking
//! describes a set of categories, and harvested leaves carry that set as a
//! [`CatBitset`].

use super::histograms::HistogramTable;
use super::split::GainParams;
use crate::training::gradients::GradStats;

/// Compact bitset of category bins (up to 64 inline).
///
/// Bins beyond 64 use heap-allocated overflow storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatBitset {
    /// Inline bits for bins 0..63.
    bits: u64,
    /// Heap storage for bins 64+.
    overflow: Option<Box<[u64]>>,
}

impl CatBitset {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, bin: u32) -> bool {
        if bin < 64 {
            (self.bits >> bin) & 1 != 0
        } else {
            let idx = ((bin - 64) / 64) as usize;
            let bit = (bin - 64) % 64;
            self.overflow
                .as_ref()
                .and_then(|o| o.get(idx))
                .is_some_and(|&w| (w >> bit) & 1 != 0)
        }
    }

    pub fn insert(&mut self, bin: u32) {
        if bin < 64 {
            self.bits |= 1u64 << bin;
            return;
        }
        let idx = ((bin - 64) / 64) as usize;
        let bit = (bin - 64) % 64;
        let overflow = self.overflow.get_or_insert_with(|| vec![0u64; idx + 1].into_boxed_slice());
        if idx >= overflow.len() {
            let mut grown = vec![0u64; idx + 1];
            grown[..overflow.len()].copy_from_slice(overflow);
            *overflow = grown.into_boxed_slice();
        }
        overflow[idx] |= 1u64 << bit;
    }

    /// Number of bins in the set.
    pub fn count(&self) -> u32 {
        self.bits.count_ones()
            + self
                .overflow
                .as_ref()
                .map_or(0, |o| o.iter().map(|w| w.count_ones()).sum())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Bins in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let words = std::iter::once(self.bits).chain(self.overflow.iter().flat_map(|o| o.iter().copied()));
        words.enumerate().flat_map(|(w, word)| {
            (0..64u32)
                .filter(move |b| (word >> b) & 1 != 0)
                .map(move |b| w as u32 * 64 + b)
        })
    }
}

impl FromIterator<u32> for CatBitset {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut s = Self::empty();
        for bin in iter {
            s.insert(bin);
        }
        s
    }
}

/// Rank the buckets of a categorical feature for contiguous splitting.
///
/// Buckets are sorted by `Σ_k G_k / (D_k + λ)` ascending; equal ratios keep
/// bin order.
pub fn categorical_order<S: GradStats>(table: &HistogramTable<S>, params: &GainParams) -> Vec<usize> {
    order_by_ratio(
        (0..table.n_buckets()).map(|i| {
            let bucket = table.bucket(i);
            leaf_ratio(bucket.stats, bucket.weight, params)
        }),
    )
}

/// `Σ_k G_k / (D_k + λ)` of one bucket or bucket sum.
pub(crate) fn leaf_ratio<S: GradStats>(stats: &[S], weight: f64, params: &GainParams) -> f64 {
    stats
        .iter()
        .map(|s| s.grad() / (s.denominator(weight) + params.reg_lambda))
        .sum()
}

/// Positions sorted by ascending ratio, ties in position order.
pub(crate) fn order_by_ratio(ratios: impl Iterator<Item = f64>) -> Vec<usize> {
    let ratios: Vec<f64> = ratios.collect();
    let mut order: Vec<usize> = (0..ratios.len()).collect();
    // stable: ties stay in bin order
    order.sort_by(|&a, &b| ratios[a].total_cmp(&ratios[b]));
    order
}
