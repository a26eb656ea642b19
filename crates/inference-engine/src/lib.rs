//! Fraud Classifier Inference
//!
//! Wraps a pretrained binary classifier behind a fixed inference contract:
//! thirteen ordered inputs in, one fraud probability out.

mod classifier;
mod onnx;
mod scorer;

pub use classifier::{FraudClassifier, LinearClassifier};
pub use onnx::OnnxClassifier;
pub use scorer::{FeatureContribution, MlScore, MlScorer, ModelConfig, ModelFormat, TOP_CONTRIBUTIONS};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    /// No classifier is loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    /// Input vector does not match the length/order contract
    #[error("Feature shape mismatch: expected {expected}, got {actual}")]
    FeatureShape { expected: String, actual: String },
    /// Classifier returned something that is not a probability
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
    /// Backend failed while running the model
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    /// Artifact could not be read or parsed
    #[error("Model load failed: {0}")]
    ModelLoad(String),
}
