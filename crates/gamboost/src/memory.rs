//! Byte budget and allocation accounting for per-invocation working memory.
//!
//! Histogram tables, interaction grids and tree arenas compute their footprint
//! with overflow-checked arithmetic, reserve it against a shared
//! [`MemoryBudget`], and hold the returned [`Reservation`] for as long as the
//! memory lives. Dropping the owner returns the bytes, so after any invocation
//! finishes (successfully or not) the budget is back where it started.
//!
//! # Example
//!
//! ```
//! use gamboost::memory::MemoryBudget;
//!
//! let budget = MemoryBudget::with_limit(1024);
//! {
//!     let r = budget.reserve("scratch", 512).unwrap();
//!     assert_eq!(r.bytes(), 512);
//!     assert_eq!(budget.in_use(), 512);
//!     assert!(budget.reserve("more", 600).is_err());
//! }
//! assert_eq!(budget.in_use(), 0);
//! assert_eq!(budget.peak(), 512);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// Shared byte budget with in-use and peak accounting.
#[derive(Debug)]
pub struct MemoryBudget {
    limit: usize,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryBudget {
    /// Budget bounded only by the largest allocation Rust permits.
    pub fn unlimited() -> Arc<Self> {
        Self::with_limit(isize::MAX as usize)
    }

    /// Budget that refuses reservations beyond `limit` bytes in total.
    pub fn with_limit(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes currently reserved.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Highest value `in_use` has reached.
    #[inline]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Reserve `bytes` for `what`.
    ///
    /// Fails with [`CoreError::CapacityOverflow`] when the reservation would
    /// push the total past the limit.
    pub fn reserve(self: &Arc<Self>, what: &'static str, bytes: usize) -> Result<Reservation> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            let next = match current.checked_add(bytes) {
                Some(next) if next <= self.limit => next,
                _ => {
                    return Err(CoreError::CapacityOverflow {
                        what,
                        requested: Some(bytes),
                        limit: self.limit,
                    })
                }
            };
            match self.in_use.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::AcqRel);
                    log::debug!("reserved {bytes} bytes for {what} ({next} in use)");
                    return Ok(Reservation {
                        budget: Arc::clone(self),
                        what,
                        bytes,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }
}

/// Bytes held against a [`MemoryBudget`]; released on drop.
#[derive(Debug)]
pub struct Reservation {
    budget: Arc<MemoryBudget>,
    what: &'static str,
    bytes: usize,
}

impl Reservation {
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.budget.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
        log::debug!("released {} bytes for {}", self.bytes, self.what);
    }
}

// =============================================================================
// Checked sizing
// =============================================================================

/// Byte size of `len` values of `T`, or `CapacityOverflow` if it overflows.
pub(crate) fn array_bytes<T>(what: &'static str, len: usize) -> Result<usize> {
    len.checked_mul(std::mem::size_of::<T>())
        .ok_or(CoreError::CapacityOverflow {
            what,
            requested: None,
            limit: isize::MAX as usize,
        })
}

/// Overflow-checked product of element counts.
pub(crate) fn checked_len(what: &'static str, factors: &[usize]) -> Result<usize> {
    factors
        .iter()
        .try_fold(1usize, |acc, &f| acc.checked_mul(f))
        .ok_or(CoreError::CapacityOverflow {
            what,
            requested: None,
            limit: isize::MAX as usize,
        })
}

/// Overflow-checked sum of byte counts.
pub(crate) fn checked_sum(what: &'static str, parts: &[usize]) -> Result<usize> {
    parts
        .iter()
        .try_fold(0usize, |acc, &p| acc.checked_add(p))
        .ok_or(CoreError::CapacityOverflow {
            what,
            requested: None,
            limit: isize::MAX as usize,
        })
}

/// Allocate `len` copies of `value`, reporting allocator refusal as an error.
pub(crate) fn try_filled<T: Clone>(what: &'static str, len: usize, value: T) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| CoreError::AllocationFailure {
            what,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    data.resize(len, value);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reservation_released_on_drop() {
        let budget = MemoryBudget::with_limit(100);
        let a = budget.reserve("a", 60).unwrap();
        let b = budget.reserve("b", 40).unwrap();
        assert_eq!(budget.in_use(), 100);

        let err = budget.reserve("c", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityOverflow);

        drop(a);
        assert_eq!(budget.in_use(), 40);
        drop(b);
        assert_eq!(budget.in_use(), 0);
        assert_eq!(budget.peak(), 100);
    }

    #[test]
    fn checked_helpers_detect_overflow() {
        assert_eq!(checked_len("grid", &[3, 4, 5]).unwrap(), 60);
        assert!(checked_len("grid", &[usize::MAX, 2]).is_err());
        assert_eq!(array_bytes::<f64>("grid", 4).unwrap(), 32);
        assert!(array_bytes::<f64>("grid", usize::MAX / 2).is_err());
        assert!(checked_sum("parts", &[usize::MAX, 1]).is_err());
    }

    #[test]
    fn try_filled_allocates_exact_length() {
        let v = try_filled("test", 7, 1.5f64).unwrap();
        assert_eq!(v.len(), 7);
        assert!(v.iter().all(|&x| x == 1.5));
    }
}
