//! Rule Error Types

use crate::rules::RuleId;
use thiserror::Error;

/// Failure of a single rule predicate.
///
/// Never aborts an evaluation: the rule is skipped and recorded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleEvaluationError {
    /// A supplied signal the rule depends on is malformed
    #[error("invalid signal {signal}: {reason}")]
    InvalidSignal { signal: &'static str, reason: String },

    /// Predicate-specific failure
    #[error("predicate failed: {0}")]
    Predicate(String),
}

/// Rejected rule-set configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleConfigError {
    #[error("duplicate rule id {0}")]
    DuplicateId(RuleId),

    #[error("normalization constant must be greater than zero")]
    ZeroNormalization,

    #[error("enabled rule weights sum to {total} which exceeds the normalization constant {normalization}")]
    WeightsExceedNormalization { total: u64, normalization: u32 },

    #[error("rule {id}: {reason}")]
    InvalidParameter { id: RuleId, reason: String },
}
