//! ML Scorer Implementation

use crate::classifier::{FraudClassifier, LinearClassifier};
use crate::onnx::OnnxClassifier;
use crate::InferenceError;
use feature_engine::{FeatureName, FeatureVector, FEATURE_DIMENSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Model artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Standardized logistic model in JSON
    #[default]
    Linear,
    /// ONNX graph run through tract
    Onnx,
}

/// Model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the model artifact
    pub path: String,
    #[serde(default)]
    pub format: ModelFormat,
    /// Version reported for ONNX artifacts (linear artifacts carry their own)
    #[serde(default = "default_model_version")]
    pub version: String,
}

fn default_model_version() -> String {
    "unversioned".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/fraud_classifier.json".to_string(),
            format: ModelFormat::Linear,
            version: default_model_version(),
        }
    }
}

/// Contributions reported per score
pub const TOP_CONTRIBUTIONS: usize = 3;

/// One feature's share of the classifier output (logit units)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub contribution: f64,
}

/// Fraud probability produced by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlScore {
    /// Probability in [0, 1]
    pub probability: f64,
    /// Classifier version that produced it
    pub model_version: String,
    /// Largest contributions by magnitude; empty when the backend has none
    #[serde(default)]
    pub top_features: Vec<FeatureContribution>,
}

/// Read-only wrapper around the loaded classifier.
///
/// Holds no per-call state; a scorer without a model answers every call with
/// [`InferenceError::ModelUnavailable`].
#[derive(Clone)]
pub struct MlScorer {
    classifier: Option<Arc<dyn FraudClassifier>>,
}

impl MlScorer {
    /// Wrap a classifier after checking its declared feature order
    pub fn new(classifier: Arc<dyn FraudClassifier>) -> Result<Self, InferenceError> {
        let declared: Vec<&str> = classifier.feature_names().iter().map(String::as_str).collect();
        let expected = FeatureName::names();
        if declared != expected {
            return Err(InferenceError::FeatureShape {
                expected: expected.join(","),
                actual: declared.join(","),
            });
        }

        info!(
            model_version = %classifier.version(),
            "ML scorer ready with {} features",
            FEATURE_DIMENSION
        );
        Ok(Self {
            classifier: Some(classifier),
        })
    }

    /// Scorer with no model loaded
    pub fn unavailable() -> Self {
        Self { classifier: None }
    }

    /// Load the configured artifact.
    ///
    /// A failed load is logged and yields a scorer without a model so the
    /// degraded-mode policy can take over at evaluation time. A shape mismatch
    /// is returned as an error since the artifact is unusable by contract.
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let loaded: Result<Arc<dyn FraudClassifier>, InferenceError> = match config.format {
            ModelFormat::Linear => {
                LinearClassifier::from_path(&config.path).map(|m| Arc::new(m) as Arc<dyn FraudClassifier>)
            }
            ModelFormat::Onnx => OnnxClassifier::from_path(&config.path, &config.version)
                .map(|m| Arc::new(m) as Arc<dyn FraudClassifier>),
        };

        match loaded {
            Ok(classifier) => Self::new(classifier),
            Err(e) => {
                error!(path = %config.path, error = %e, "Model load failed, scorer has no model");
                Ok(Self::unavailable())
            }
        }
    }

    /// Check if a model is loaded
    pub fn is_loaded(&self) -> bool {
        self.classifier.is_some()
    }

    /// Version of the loaded model
    pub fn model_version(&self) -> Option<&str> {
        self.classifier.as_deref().map(|c| c.version())
    }

    /// Score a feature vector
    pub fn score(&self, features: &FeatureVector) -> Result<MlScore, InferenceError> {
        let classifier = self
            .classifier
            .as_deref()
            .ok_or_else(|| InferenceError::ModelUnavailable("no classifier loaded".to_string()))?;

        if features.values.len() != FEATURE_DIMENSION {
            return Err(InferenceError::FeatureShape {
                expected: format!("{} features", FEATURE_DIMENSION),
                actual: format!("{} features", features.values.len()),
            });
        }

        let probability = classifier.predict_proba(&features.values)?;
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(InferenceError::InvalidOutput(format!(
                "probability {} outside [0, 1]",
                probability
            )));
        }

        let top_features = classifier
            .contributions(&features.values)
            .map(|c| top_contributions(&c))
            .unwrap_or_default();

        debug!(model_version = %classifier.version(), probability, "ML score computed");
        Ok(MlScore {
            probability,
            model_version: classifier.version().to_string(),
            top_features,
        })
    }
}

/// Largest finite contributions by magnitude; ties keep vector order
fn top_contributions(contributions: &[f64]) -> Vec<FeatureContribution> {
    let mut ranked: Vec<(FeatureName, f64)> = FeatureName::ALL
        .iter()
        .copied()
        .zip(contributions.iter().copied())
        .filter(|(_, c)| c.is_finite() && *c != 0.0)
        .collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    ranked
        .into_iter()
        .take(TOP_CONTRIBUTIONS)
        .map(|(name, contribution)| FeatureContribution {
            feature: name.as_str().to_string(),
            contribution,
        })
        .collect()
}

impl std::fmt::Debug for MlScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlScorer")
            .field("model_version", &self.model_version())
            .finish()
    }
}
