//! Engine Error Types

use inference_engine::InferenceError;
use rule_engine::RuleConfigError;
use std::time::Duration;
use thiserror::Error;
use transaction_validator::ValidationError;

/// Errors returned to callers of the scoring engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Bad or missing input field; nothing was scored
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] ValidationError),

    /// Extractor and scorer disagree on the vector contract
    #[error("feature shape violation: {0}")]
    FeatureShape(String),

    /// Classifier produced something other than a probability
    #[error("invalid model output: {0}")]
    InvalidModelOutput(String),

    /// ML score unavailable under the fail-fast policy
    #[error("scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("evaluation exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    /// A score left [0, 1]; never clamped
    #[error("score invariant violated: {0}")]
    ScoreInvariant(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("evaluation task failed: {0}")]
    TaskFailed(String),
}

impl From<InferenceError> for EngineError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelUnavailable(_) | InferenceError::InferenceFailed(_) => {
                EngineError::ScoringUnavailable(err.to_string())
            }
            InferenceError::FeatureShape { .. } => EngineError::FeatureShape(err.to_string()),
            InferenceError::InvalidOutput(_) => EngineError::InvalidModelOutput(err.to_string()),
            InferenceError::ModelLoad(_) => EngineError::Config(err.to_string()),
        }
    }
}

impl From<RuleConfigError> for EngineError {
    fn from(err: RuleConfigError) -> Self {
        EngineError::Config(format!("rules: {}", err))
    }
}
