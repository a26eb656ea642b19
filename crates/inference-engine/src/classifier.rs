//! Classifier Contract and Linear Backend

use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Pretrained binary fraud classifier.
///
/// Implementations hold read-only weights after construction and must be
/// safe to call from many evaluations at once.
pub trait FraudClassifier: Send + Sync {
    /// Artifact version reported in audit records
    fn version(&self) -> &str;

    /// Feature names in the order the model was trained on
    fn feature_names(&self) -> &[String];

    /// Fraud probability for one ordered input vector
    fn predict_proba(&self, features: &[f64]) -> Result<f64, InferenceError>;

    /// Per-feature additive share of the logit, in input order.
    ///
    /// `None` when the backend cannot attribute its output.
    fn contributions(&self, _features: &[f64]) -> Option<Vec<f64>> {
        None
    }
}

/// Standardized logistic model stored as a JSON artifact.
///
/// `p = sigmoid(bias + sum(w_i * (x_i - mean_i) / scale_i))`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub version: String,
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearClassifier {
    /// Load the artifact from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        let model = Self::from_json_str(&text)?;
        info!(
            model_version = %model.version,
            path = %path.display(),
            "Linear classifier loaded"
        );
        Ok(model)
    }

    /// Parse and check the artifact
    pub fn from_json_str(text: &str) -> Result<Self, InferenceError> {
        let model: Self = serde_json::from_str(text)
            .map_err(|e| InferenceError::ModelLoad(format!("invalid linear artifact: {}", e)))?;
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<(), InferenceError> {
        let n = self.feature_names.len();
        if self.means.len() != n || self.scales.len() != n || self.weights.len() != n {
            return Err(InferenceError::ModelLoad(format!(
                "artifact declares {} features but has {} means, {} scales, {} weights",
                n,
                self.means.len(),
                self.scales.len(),
                self.weights.len()
            )));
        }
        let all_finite = self
            .means
            .iter()
            .chain(&self.scales)
            .chain(&self.weights)
            .chain(std::iter::once(&self.bias))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(InferenceError::ModelLoad("artifact contains non-finite parameters".to_string()));
        }
        if self.scales.iter().any(|s| *s <= 0.0) {
            return Err(InferenceError::ModelLoad("scales must be positive".to_string()));
        }
        Ok(())
    }
}

impl FraudClassifier for LinearClassifier {
    fn version(&self) -> &str {
        &self.version
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, features: &[f64]) -> Result<f64, InferenceError> {
        if features.len() != self.weights.len() {
            return Err(InferenceError::FeatureShape {
                expected: format!("{} features", self.weights.len()),
                actual: format!("{} features", features.len()),
            });
        }

        let logit = self
            .terms(features)
            .fold(self.bias, |acc, term| acc + term);

        Ok(1.0 / (1.0 + (-logit).exp()))
    }

    fn contributions(&self, features: &[f64]) -> Option<Vec<f64>> {
        if features.len() != self.weights.len() {
            return None;
        }
        Some(self.terms(features).collect())
    }
}

impl LinearClassifier {
    /// `w_i * (x_i - mean_i) / scale_i` for each input
    fn terms<'a>(&'a self, features: &'a [f64]) -> impl Iterator<Item = f64> + 'a {
        features
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((x, mean), scale), w)| w * (x - mean) / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(n: usize) -> String {
        let names: Vec<String> = (0..n).map(|i| format!("f{}", i)).collect();
        serde_json::json!({
            "version": "linear-test",
            "feature_names": names,
            "means": vec![0.0; n],
            "scales": vec![1.0; n],
            "weights": vec![0.5; n],
            "bias": -1.0,
        })
        .to_string()
    }

    #[test]
    fn test_linear_prediction() {
        let model = LinearClassifier::from_json_str(&artifact(2)).unwrap();
        // logit = -1 + 0.5*2 + 0.5*0 = 0
        let p = model.predict_proba(&[2.0, 0.0]).unwrap();
        assert_eq!(p, 0.5);
        assert_eq!(model.version(), "linear-test");
    }

    #[test]
    fn test_contributions_sum_to_logit() {
        let text = serde_json::json!({
            "version": "linear-test",
            "feature_names": ["a", "b", "c"],
            "means": [1.0, 0.0, 10.0],
            "scales": [2.0, 1.0, 5.0],
            "weights": [0.5, -1.0, 2.0],
            "bias": -1.0,
        })
        .to_string();
        let model = LinearClassifier::from_json_str(&text).unwrap();

        let contributions = model.contributions(&[5.0, 0.5, 10.0]).unwrap();
        assert_eq!(contributions, vec![1.0, -0.5, 0.0]);

        // logit = -1 + 1 - 0.5 + 0
        let p = model.predict_proba(&[5.0, 0.5, 10.0]).unwrap();
        assert_eq!(p, 1.0 / (1.0 + 0.5f64.exp()));
        assert!(model.contributions(&[1.0]).is_none());
    }

    #[test]
    fn test_wrong_input_length() {
        let model = LinearClassifier::from_json_str(&artifact(3)).unwrap();
        let err = model.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(err, InferenceError::FeatureShape { .. }));
    }

    #[test]
    fn test_inconsistent_artifact_rejected() {
        let text = serde_json::json!({
            "version": "broken",
            "feature_names": ["a", "b"],
            "means": [0.0],
            "scales": [1.0, 1.0],
            "weights": [1.0, 1.0],
            "bias": 0.0,
        })
        .to_string();
        assert!(matches!(
            LinearClassifier::from_json_str(&text),
            Err(InferenceError::ModelLoad(_))
        ));
        assert!(matches!(
            LinearClassifier::from_json_str("not json"),
            Err(InferenceError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = LinearClassifier::from_path("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, InferenceError::ModelLoad(_)));
    }
}
