//! ONNX Backend (tract)

use crate::classifier::FraudClassifier;
use crate::InferenceError;
use feature_engine::{FeatureName, FEATURE_DIMENSION};
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX classifier run through tract.
///
/// The graph must take `f32[1, 13]` and produce either a single probability
/// or `[p_legit, p_fraud]` as its first output. Exports with a ZipMap output
/// are not supported.
pub struct OnnxClassifier {
    plan: OnnxPlan,
    version: String,
    feature_names: Vec<String>,
}

impl OnnxClassifier {
    /// Load and optimize a model from disk
    pub fn from_path<P: AsRef<Path>>(path: P, version: &str) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX model: {} (version {})", path.display(), version);

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(0, f32::fact([1, FEATURE_DIMENSION]).into())
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| InferenceError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        info!("Model loaded successfully");
        Ok(Self {
            plan,
            version: version.to_string(),
            // ONNX graphs carry no column names; the artifact is bound to the
            // extractor's order by contract.
            feature_names: FeatureName::names().into_iter().map(String::from).collect(),
        })
    }

    fn fraud_probability(output: &[f32]) -> Result<f64, InferenceError> {
        match output {
            [p] => Ok(*p as f64),
            [_, p_fraud] => Ok(*p_fraud as f64),
            other => Err(InferenceError::InvalidOutput(format!(
                "expected 1 or 2 output values, got {}",
                other.len()
            ))),
        }
    }
}

impl FraudClassifier for OnnxClassifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, InferenceError> {
        if features.len() != FEATURE_DIMENSION {
            return Err(InferenceError::FeatureShape {
                expected: format!("{} features", FEATURE_DIMENSION),
                actual: format!("{} features", features.len()),
            });
        }

        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let tensor = tract_ndarray::Array2::from_shape_vec((1, FEATURE_DIMENSION), input)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(Tensor::from(tensor).into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let first = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".to_string()))?;
        let view = first
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;
        let values: Vec<f32> = view.iter().copied().collect();

        let probability = Self::fraud_probability(&values)?;
        debug!(model_version = %self.version, probability, "ONNX inference complete");
        Ok(probability)
    }
}
