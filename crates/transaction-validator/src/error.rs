//! Validation Error Types

use thiserror::Error;

/// Errors raised when a transaction record fails the input schema.
///
/// Every variant names the offending field so callers can surface it as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Required field absent from the record
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Field present but not usable
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Timestamp later than now plus the clock-skew tolerance
    #[error("timestamp is {ahead_secs}s in the future (tolerance {tolerance_secs}s)")]
    FutureTimestamp { ahead_secs: i64, tolerance_secs: i64 },
}

impl ValidationError {
    /// Name of the field that failed validation
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField(field) => field,
            ValidationError::OutOfRange { field, .. } => field,
            ValidationError::InvalidField { field, .. } => field,
            ValidationError::FutureTimestamp { .. } => "timestamp",
        }
    }
}
