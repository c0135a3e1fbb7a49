//! Error types for the quantitative analytics engine

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in quantitative analytics
///
/// Numerical degeneracy is normally reported through sentinels and
/// `degenerate` flags on results. These variants are reserved for request
/// errors the caller has to act on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Unknown model kind: {0}")]
    UnknownModelKind(String),

    #[error("Unknown copula family: {0}")]
    UnknownCopulaFamily(String),

    #[error("Unknown transform operation: {0}")]
    UnknownOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),
}

impl QuantError {
    /// Whether an orchestration layer may sensibly retry the call
    ///
    /// Only timeouts are transient; everything else is a property of the
    /// request and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuantError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, QuantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeouts_are_retryable() {
        assert!(QuantError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(!QuantError::InvalidInput("x".to_string()).is_retryable());
        assert!(!QuantError::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = QuantError::InvalidConfidenceLevel(1.5);
        assert_eq!(
            err.to_string(),
            "Invalid confidence level: 1.5 (must be between 0 and 1)"
        );
    }
}
