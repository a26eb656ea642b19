//! Decision Audit Record

use crate::policy::DecisionLabel;
use chrono::{DateTime, Utc};
use inference_engine::MlScore;
use rule_engine::{RuleId, RuleScore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verdict for one transaction, handed to persistence as the audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: Uuid,
    pub transaction_id: String,
    pub label: DecisionLabel,
    pub blended_score: f64,
    /// Absent when scored rule-only
    pub ml_score: Option<MlScore>,
    pub rule_score: RuleScore,
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    pub imputed_features: Vec<String>,
    /// Engine configuration version in force
    pub config_version: String,
    pub audit_trail: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl Decision {
    pub fn triggered_rules(&self) -> Vec<RuleId> {
        self.rule_score.triggered_ids()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.ml_score.as_ref().map(|s| s.model_version.as_str())
    }
}
