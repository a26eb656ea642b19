//! Score Blending

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Fixed linear weights for the hybrid score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub ml_weight: f64,
    pub rule_weight: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            ml_weight: 0.7,
            rule_weight: 0.3,
        }
    }
}

impl BlendWeights {
    /// Each weight in [0, 1] and the pair summing to 1.
    ///
    /// The sum may fall short of 1 by rounding but never exceed it, so
    /// `blend` stays within [0, 1] for any inputs in [0, 1].
    pub fn validate(&self) -> Result<(), EngineError> {
        let in_unit = |w: f64| w.is_finite() && (0.0..=1.0).contains(&w);
        if !in_unit(self.ml_weight) || !in_unit(self.rule_weight) {
            return Err(EngineError::Config(format!(
                "blend weights must be within [0, 1], got ml={} rule={}",
                self.ml_weight, self.rule_weight
            )));
        }
        let total = self.ml_weight + self.rule_weight;
        if total > 1.0 || 1.0 - total > 1e-9 {
            return Err(EngineError::Config(format!("blend weights must sum to 1, got {}", total)));
        }
        Ok(())
    }

    /// `ml_weight * ml + rule_weight * rule`, rejected if outside [0, 1]
    pub fn blend(&self, ml: f64, rule: f64) -> Result<f64, EngineError> {
        let score = self.ml_weight * ml + self.rule_weight * rule;
        ensure_unit("blended score", score)?;
        Ok(score)
    }
}

/// Fail instead of clamping a score that left [0, 1]
pub(crate) fn ensure_unit(what: &str, score: f64) -> Result<f64, EngineError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(EngineError::ScoreInvariant(format!("{} {} outside [0, 1]", what, score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_is_exact() {
        let weights = BlendWeights::default();
        let score = weights.blend(0.8, 0.2).unwrap();
        assert_eq!(score.to_bits(), (0.7 * 0.8 + 0.3 * 0.2f64).to_bits());
        assert!((score - 0.62).abs() < 1e-12);
    }

    #[test]
    fn test_blend_extremes() {
        let weights = BlendWeights::default();
        assert_eq!(weights.blend(0.0, 0.0).unwrap(), 0.0);
        assert!(weights.blend(1.0, 1.0).unwrap() <= 1.0);
    }

    #[test]
    fn test_out_of_range_inputs_not_clamped() {
        let weights = BlendWeights::default();
        assert!(matches!(weights.blend(1.5, 1.0), Err(EngineError::ScoreInvariant(_))));
        assert!(matches!(weights.blend(-0.5, 0.0), Err(EngineError::ScoreInvariant(_))));
        assert!(matches!(weights.blend(f64::NAN, 0.0), Err(EngineError::ScoreInvariant(_))));
    }

    #[test]
    fn test_weight_validation() {
        assert!(BlendWeights::default().validate().is_ok());
        assert!(BlendWeights { ml_weight: 1.0, rule_weight: 0.0 }.validate().is_ok());
        assert!(BlendWeights { ml_weight: 0.6, rule_weight: 0.3 }.validate().is_err());
        assert!(BlendWeights { ml_weight: 1.2, rule_weight: -0.2 }.validate().is_err());
    }

    #[test]
    fn test_weights_summing_above_one_rejected() {
        let over = BlendWeights {
            ml_weight: 0.7000000005,
            rule_weight: 0.3,
        };
        assert!(matches!(over.validate(), Err(EngineError::Config(_))));

        let under = BlendWeights {
            ml_weight: 0.6999999995,
            rule_weight: 0.3,
        };
        assert!(under.validate().is_ok());
        assert!(under.blend(1.0, 1.0).unwrap() <= 1.0);
    }
}
