//! Per-row gradient statistics and the row-major gradient buffer.
//!
//! Losses come in two flavours: Newton losses produce a gradient and a
//! hessian per row and score, gradient-only losses produce just the
//! gradient. [`GradStats`] abstracts over the two so histogram accumulation,
//! split search and leaf values are monomorphized per flavour instead of
//! branching on an "has hessian" flag in the hot loops.
//!
//! # Layout
//!
//! For `n_rows` rows and `n_scores` scores (1 for regression and binary
//! classification, K for K-class):
//!
//! ```text
//! stats: [r0_s0, r0_s1, ..., r0_sK, r1_s0, r1_s1, ...]
//!        |------ row 0 ------|      |--- row 1 ---
//! ```
//!
//! Index formula: `stats[row * n_scores + score]`. A histogram bucket adds a
//! whole row at once, so keeping a row's scores adjacent is what the
//! accumulation loop wants.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Sub};

use crate::error::{CoreError, Result};
use crate::memory::{checked_len, try_filled};

// =============================================================================
// Statistic flavours
// =============================================================================

/// Additive per-row (and per-bucket) statistic for one score.
pub trait GradStats:
    Copy
    + Default
    + Debug
    + PartialEq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + 'static
{
    /// Whether the loss supplies a second derivative.
    const HAS_HESSIAN: bool;

    fn grad(&self) -> f64;

    /// Hessian sum, or 0 for gradient-only statistics.
    fn hess(&self) -> f64;

    /// This statistic multiplied by a row weight.
    fn scaled(self, weight: f64) -> Self;

    /// Denominator of the Newton step: the hessian sum when present,
    /// otherwise the summed row weight it stands in for.
    #[inline]
    fn denominator(&self, weight: f64) -> f64 {
        if Self::HAS_HESSIAN {
            self.hess()
        } else {
            weight
        }
    }

    fn is_finite(&self) -> bool;
}

/// Gradient and hessian of a Newton loss.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GradHess {
    pub grad: f64,
    pub hess: f64,
}

impl GradHess {
    #[inline]
    pub const fn new(grad: f64, hess: f64) -> Self {
        Self { grad, hess }
    }
}

impl Add for GradHess {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.grad + rhs.grad, self.hess + rhs.hess)
    }
}

impl Sub for GradHess {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.grad - rhs.grad, self.hess - rhs.hess)
    }
}

impl AddAssign for GradHess {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.grad += rhs.grad;
        self.hess += rhs.hess;
    }
}

impl GradStats for GradHess {
    const HAS_HESSIAN: bool = true;

    #[inline]
    fn grad(&self) -> f64 {
        self.grad
    }

    #[inline]
    fn hess(&self) -> f64 {
        self.hess
    }

    #[inline]
    fn scaled(self, weight: f64) -> Self {
        Self::new(self.grad * weight, self.hess * weight)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.grad.is_finite() && self.hess.is_finite()
    }
}

/// Gradient of a loss without a usable second derivative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GradOnly {
    pub grad: f64,
}

impl GradOnly {
    #[inline]
    pub const fn new(grad: f64) -> Self {
        Self { grad }
    }
}

impl Add for GradOnly {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.grad + rhs.grad)
    }
}

impl Sub for GradOnly {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.grad - rhs.grad)
    }
}

impl AddAssign for GradOnly {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.grad += rhs.grad;
    }
}

impl GradStats for GradOnly {
    const HAS_HESSIAN: bool = false;

    #[inline]
    fn grad(&self) -> f64 {
        self.grad
    }

    #[inline]
    fn hess(&self) -> f64 {
        0.0
    }

    #[inline]
    fn scaled(self, weight: f64) -> Self {
        Self::new(self.grad * weight)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.grad.is_finite()
    }
}

// =============================================================================
// Gradient buffer
// =============================================================================

/// Row-major buffer of per-row, per-score gradient statistics.
///
/// # Example
///
/// ```
/// use gamboost::training::{GradHess, Gradients};
///
/// // 3 rows, 2 scores
/// let mut buffer = Gradients::<GradHess>::new(3, 2).unwrap();
/// buffer.set(1, 1, GradHess::new(-0.5, 0.25));
///
/// assert_eq!(buffer.get(1, 1), GradHess::new(-0.5, 0.25));
/// assert_eq!(buffer.row(1)[0], GradHess::default());
/// ```
#[derive(Clone, Debug)]
pub struct Gradients<S> {
    stats: Vec<S>,
    n_rows: usize,
    n_scores: usize,
}

impl<S: GradStats> Gradients<S> {
    /// Zero-initialized buffer. `n_scores` must be at least 1.
    pub fn new(n_rows: usize, n_scores: usize) -> Result<Self> {
        if n_scores == 0 {
            return Err(CoreError::invalid("n_scores", "must be >= 1"));
        }
        let len = checked_len("gradients", &[n_rows, n_scores])?;
        Ok(Self {
            stats: try_filled("gradients", len, S::default())?,
            n_rows,
            n_scores,
        })
    }

    /// Wrap an existing row-major vector.
    pub fn from_vec(stats: Vec<S>, n_scores: usize) -> Result<Self> {
        if n_scores == 0 || stats.len() % n_scores != 0 {
            return Err(CoreError::invalid(
                "stats",
                format!("length {} is not a multiple of {n_scores} scores", stats.len()),
            ));
        }
        Ok(Self {
            n_rows: stats.len() / n_scores,
            stats,
            n_scores,
        })
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_scores(&self) -> usize {
        self.n_scores
    }

    #[inline]
    pub fn get(&self, row: usize, score: usize) -> S {
        self.stats[row * self.n_scores + score]
    }

    #[inline]
    pub fn set(&mut self, row: usize, score: usize, value: S) {
        self.stats[row * self.n_scores + score] = value;
    }

    /// All scores of one row.
    #[inline]
    pub fn row(&self, row: usize) -> &[S] {
        let start = row * self.n_scores;
        &self.stats[start..start + self.n_scores]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [S] {
        let start = row * self.n_scores;
        &mut self.stats[start..start + self.n_scores]
    }

    #[inline]
    pub fn as_slice(&self) -> &[S] {
        &self.stats
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [S] {
        &mut self.stats
    }

    /// Fail with `NumericDegenerate` at the first non-finite row.
    pub fn check_finite(&self) -> Result<()> {
        match self.stats.iter().position(|s| !s.is_finite()) {
            Some(i) => Err(CoreError::NumericDegenerate {
                what: "gradients",
                index: i / self.n_scores,
            }),
            None => Ok(()),
        }
    }
}
