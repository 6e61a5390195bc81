//! Error kinds reported by the compute core.
//!
//! Every fallible entry point returns [`Result`]. Errors are detected where
//! they occur and propagate straight to the caller of the tree-growth or
//! interaction-scoring invocation; nothing is retried internally. Across the
//! boundary only [`CoreError::kind`] and [`CoreError::code`] are meaningful,
//! the `Display` text exists for logs.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse classification of a [`CoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    CapacityOverflow,
    AllocationFailure,
    NumericDegenerate,
}

/// Error raised by construction, aggregation, growth or scoring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// A parameter or input array violates its contract.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A requested size cannot be represented or exceeds the memory budget.
    ///
    /// `requested` is `None` when the byte count itself overflowed `usize`.
    #[error("capacity overflow in {what}: requested {requested:?} bytes, limit {limit}")]
    CapacityOverflow {
        what: &'static str,
        requested: Option<usize>,
        limit: usize,
    },

    /// The allocator could not satisfy a request.
    #[error("allocation of {bytes} bytes for {what} failed")]
    AllocationFailure { what: &'static str, bytes: usize },

    /// A NaN or infinity appeared where the loss contract forbids it.
    #[error("non-finite value in {what} at index {index}")]
    NumericDegenerate { what: &'static str, index: usize },
}

impl CoreError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::CapacityOverflow { .. } => ErrorKind::CapacityOverflow,
            Self::AllocationFailure { .. } => ErrorKind::AllocationFailure,
            Self::NumericDegenerate { .. } => ErrorKind::NumericDegenerate,
        }
    }

    /// Stable numeric diagnostic code for the boundary layer.
    pub fn code(&self) -> u32 {
        match self.kind() {
            ErrorKind::InvalidParameter => 1,
            ErrorKind::CapacityOverflow => 2,
            ErrorKind::AllocationFailure => 3,
            ErrorKind::NumericDegenerate => 4,
        }
    }
}

/// Reject non-finite values in `values`, reporting the first offending index.
pub(crate) fn ensure_finite(what: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(CoreError::NumericDegenerate { what, index }),
        None => Ok(()),
    }
}
