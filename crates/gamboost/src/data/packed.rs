//! Bit-packed bin storage.
//!
//! Each feature column stores its per-row bin indices as fixed-width integers
//! packed into `u64` words. The width is `ceil(log2(n_bins))`, so a feature
//! with a single bin needs zero bits and stores no words at all. Values never
//! straddle a word boundary: a word holds `64 / width` values and any
//! remaining high bits are left zero.
//!
//! # Layout
//!
//! ```text
//! width = 3, items_per_word = 21
//! word 0: [row0 | row1 | ... | row20 | 1 unused bit]
//! word 1: [row21 | ...]
//! ```

use crate::error::{CoreError, Result};
use crate::memory::{checked_sum, try_filled};

const WORD_BITS: u32 = u64::BITS;

/// Number of bits used per packed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitWidth(u8);

impl BitWidth {
    /// Width needed to represent bins `0..n_bins`.
    ///
    /// `n_bins` of 0 or 1 needs no bits.
    #[inline]
    pub const fn for_bins(n_bins: u32) -> Self {
        if n_bins <= 1 {
            Self(0)
        } else {
            Self((u32::BITS - (n_bins - 1).leading_zeros()) as u8)
        }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    /// Values stored per 64-bit word, or `None` for zero-width columns.
    #[inline]
    pub const fn items_per_word(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some((WORD_BITS / self.0 as u32) as usize)
        }
    }

    #[inline]
    const fn mask(self) -> u64 {
        if self.0 == 0 {
            0
        } else {
            u64::MAX >> (WORD_BITS - self.0 as u32)
        }
    }
}

/// One feature's per-row bins, bit-packed into words.
#[derive(Clone, Debug)]
pub struct PackedBins {
    words: Box<[u64]>,
    len: usize,
    width: BitWidth,
}

impl PackedBins {
    /// Pack `bins`, each of which must be `< n_bins`.
    pub fn pack(bins: &[u32], n_bins: u32) -> Result<Self> {
        if n_bins == 0 {
            return Err(CoreError::invalid("n_bins", "must be >= 1"));
        }
        if let Some(row) = bins.iter().position(|&b| b >= n_bins) {
            return Err(CoreError::invalid(
                "bins",
                format!("row {row} has bin {} but feature has {n_bins} bins", bins[row]),
            ));
        }

        let width = BitWidth::for_bins(n_bins);
        let Some(per_word) = width.items_per_word() else {
            return Ok(Self {
                words: Box::new([]),
                len: bins.len(),
                width,
            });
        };

        // ceil(len / per_word) without overflowing on len near usize::MAX
        let n_words = checked_sum(
            "packed bins",
            &[bins.len() / per_word, usize::from(bins.len() % per_word != 0)],
        )?;
        let mut words = try_filled("packed bins", n_words, 0u64)?;
        for (word, chunk) in words.iter_mut().zip(bins.chunks(per_word)) {
            *word = chunk
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (i as u32 * width.bits())));
        }

        Ok(Self {
            words: words.into_boxed_slice(),
            len: bins.len(),
            width,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn width(&self) -> BitWidth {
        self.width
    }

    /// Packed storage size in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    /// Bin of `row`.
    ///
    /// # Panics
    /// Panics if `row >= len()`.
    #[inline]
    pub fn get(&self, row: usize) -> u32 {
        assert!(row < self.len, "row {row} out of bounds for {} rows", self.len);
        match self.width.items_per_word() {
            None => 0,
            Some(per_word) => {
                let word = self.words[row / per_word];
                let shift = (row % per_word) as u32 * self.width.bits();
                ((word >> shift) & self.width.mask()) as u32
            }
        }
    }

    /// Iterate over all bins in row order.
    #[inline]
    pub fn iter(&self) -> PackedIter<'_> {
        self.iter_range(0, self.len)
    }

    /// Iterate over bins of rows `start..end` in row order.
    ///
    /// # Panics
    /// Panics if `start > end` or `end > len()`.
    pub fn iter_range(&self, start: usize, end: usize) -> PackedIter<'_> {
        assert!(start <= end && end <= self.len, "invalid row range {start}..{end}");
        let (word_idx, current, left_in_word) = match self.width.items_per_word() {
            None => (0, 0, usize::MAX),
            Some(per_word) if start < end => {
                let word_idx = start / per_word;
                let offset = start % per_word;
                let current = self.words[word_idx] >> (offset as u32 * self.width.bits());
                (word_idx + 1, current, per_word - offset)
            }
            Some(_) => (0, 0, 0),
        };
        PackedIter {
            words: &self.words,
            word_idx,
            current,
            left_in_word,
            remaining: end - start,
            width: self.width,
        }
    }
}

/// Row-order iterator over a [`PackedBins`] column.
///
/// Shifts through one word at a time instead of recomputing word/offset per row.
#[derive(Clone, Debug)]
pub struct PackedIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
    left_in_word: usize,
    remaining: usize,
    width: BitWidth,
}

impl Iterator for PackedIter<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let Some(per_word) = self.width.items_per_word() else {
            return Some(0);
        };
        if self.left_in_word == 0 {
            self.current = self.words[self.word_idx];
            self.word_idx += 1;
            self.left_in_word = per_word;
        }
        let value = (self.current & self.width.mask()) as u32;
        self.current >>= self.width.bits();
        self.left_in_word -= 1;
        Some(value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PackedIter<'_> {}
