//! Decision Policy Implementation

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Actionable verdict, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionLabel {
    Approve,
    Review,
    Block,
}

impl DecisionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionLabel::Approve => "APPROVE",
            DecisionLabel::Review => "REVIEW",
            DecisionLabel::Block => "BLOCK",
        }
    }
}

impl fmt::Display for DecisionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Band boundaries; each threshold belongs to the higher band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Lowest score sent to manual review (default: 0.4)
    pub review: f64,
    /// Lowest score blocked outright (default: 0.7)
    pub block: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            review: 0.4,
            block: 0.7,
        }
    }
}

impl Thresholds {
    /// Require `0 < review < block <= 1`
    pub fn validate(&self) -> Result<(), EngineError> {
        let ordered = self.review.is_finite()
            && self.block.is_finite()
            && 0.0 < self.review
            && self.review < self.block
            && self.block <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(EngineError::Config(format!(
                "thresholds must satisfy 0 < review < block <= 1, got review={} block={}",
                self.review, self.block
            )))
        }
    }
}

/// Pure mapping from blended score to label
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecisionPolicy {
    thresholds: Thresholds,
}

impl DecisionPolicy {
    pub fn new(thresholds: Thresholds) -> Result<Self, EngineError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Classify a blended score.
    ///
    /// # Panics
    ///
    /// If `score` is not within [0, 1]. Callers check the blend first.
    pub fn classify(&self, score: f64) -> DecisionLabel {
        assert!(
            (0.0..=1.0).contains(&score),
            "blended score {} outside [0, 1]",
            score
        );

        if score >= self.thresholds.block {
            DecisionLabel::Block
        } else if score >= self.thresholds.review {
            DecisionLabel::Review
        } else {
            DecisionLabel::Approve
        }
    }
}
