//! Error types for rotation and turbulence processing.

use thiserror::Error;

use crate::types::CoordSys;

/// Errors raised by the rotation and spectral routines.
///
/// Physical-consistency problems (a non positive-definite stress tensor,
/// unequal noise levels under bin rotation) are not errors; they are
/// reported through `tracing` and the computation carries on.
#[derive(Error, Debug)]
pub enum VelocityError {
    /// The dataset or instrument is not configured for the requested operation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No rotation is defined between the two frames for this dataset.
    #[error("Cannot rotate from '{from}' to '{to}': {reason}")]
    UnsupportedTransition {
        from: CoordSys,
        to: CoordSys,
        reason: String,
    },

    /// Array shapes do not agree.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// A numeric option is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A decomposition failed.
    #[error("Numerical error: {0}")]
    Numerical(String),
}

impl VelocityError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an unsupported-transition error.
    pub fn unsupported(from: CoordSys, to: CoordSys, reason: impl Into<String>) -> Self {
        Self::UnsupportedTransition {
            from,
            to,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VelocityError>;
