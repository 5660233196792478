//! Error types for trustdrift.
//!
//! The per-interaction update cycle is infallible: noisy inputs are clamped and
//! numeric degeneracies are floored. Errors only surface at the edges, when a
//! configuration is validated, when JSON crosses the boundary, or when a shared
//! registry lock has been poisoned.

use thiserror::Error;

/// Validation errors raised while checking a configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// An integer field is below its minimum.
    #[error("Field '{field}' must be at least {min}, got {value}")]
    TooSmall {
        /// Offending field.
        field: &'static str,
        /// Smallest accepted value.
        min: usize,
        /// Value supplied.
        value: usize,
    },

    /// A real field is outside its closed range.
    #[error("Field '{field}' must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Value supplied.
        value: f64,
    },

    /// A real field is zero, negative or non-finite.
    #[error("Field '{field}' must be finite and strictly positive, got {value}")]
    NotPositive {
        /// Offending field.
        field: &'static str,
        /// Value supplied.
        value: f64,
    },

    /// Forecast horizon is zero or too long.
    #[error("Forecast horizon {value} is outside the supported range [1, {max}]")]
    InvalidHorizon {
        /// Horizon supplied.
        value: usize,
        /// Longest supported horizon.
        max: usize,
    },

    /// Both forecast blend weights are zero.
    #[error("Forecast blend weights must not both be zero")]
    DegenerateBlendWeights,
}

/// Top-level error type for trustdrift.
#[derive(Debug, Error)]
pub enum TrustDriftError {
    /// Configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// JSON could not be parsed or written.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Parser or writer message.
        message: String,
    },

    /// Reading or writing a stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Broken internal invariant, such as a poisoned lock.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl TrustDriftError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a serialization error.
    #[must_use]
    pub const fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<serde_json::Error> for TrustDriftError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for trustdrift operations.
pub type TrustDriftResult<T> = Result<T, TrustDriftError>;
