//! Rule Evaluator Implementation

use crate::config::RuleSetConfig;
use crate::error::RuleConfigError;
use crate::rules::{Rule, RuleId};
use feature_engine::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use transaction_validator::Transaction;

/// Rule that fired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub id: RuleId,
    pub name: String,
    pub weight: u32,
}

/// Rule excluded from the sum because its predicate failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub id: RuleId,
    pub name: String,
    pub reason: String,
}

impl SkippedRule {
    /// Line recorded in the decision audit trail
    pub fn audit_line(&self) -> String {
        format!("rule {} skipped: evaluation error: {}", self.id, self.reason)
    }
}

/// Normalized rule score with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleScore {
    /// Triggered points over the normalization constant, in [0, 1]
    pub value: f64,
    /// Ascending by rule id
    pub triggered: Vec<RuleHit>,
    pub skipped: Vec<SkippedRule>,
    pub triggered_points: u32,
    pub normalization: u32,
    pub ruleset_version: String,
}

impl RuleScore {
    pub fn triggered_ids(&self) -> Vec<RuleId> {
        self.triggered.iter().map(|hit| hit.id).collect()
    }
}

/// Evaluates an immutable rule table
#[derive(Debug)]
pub struct RuleEvaluator {
    version: String,
    normalization: u32,
    /// Sorted by id
    rules: Vec<Rule>,
}

impl RuleEvaluator {
    /// Build from an explicit rule list
    pub fn new(version: impl Into<String>, normalization: u32, mut rules: Vec<Rule>) -> Result<Self, RuleConfigError> {
        if normalization == 0 {
            return Err(RuleConfigError::ZeroNormalization);
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id) {
                return Err(RuleConfigError::DuplicateId(rule.id));
            }
        }

        let total: u64 = rules.iter().map(|r| u64::from(r.weight)).sum();
        if total > u64::from(normalization) {
            return Err(RuleConfigError::WeightsExceedNormalization { total, normalization });
        }

        rules.sort_by_key(|r| r.id);
        let version = version.into();
        info!(
            ruleset_version = %version,
            normalization,
            "Rule evaluator ready with {} rules",
            rules.len()
        );

        Ok(Self {
            version,
            normalization,
            rules,
        })
    }

    /// Build from configuration; disabled rules are dropped
    pub fn from_config(config: &RuleSetConfig) -> Result<Self, RuleConfigError> {
        config.validate()?;

        let rules = config
            .enabled_rules()
            .map(|def| Rule::new(def.id, def.display_name(), def.weight, Box::new(def.predicate.clone())))
            .collect();

        Self::new(config.version.clone(), config.normalization, rules)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn normalization(&self) -> u32 {
        self.normalization
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every rule against one transaction.
    ///
    /// A failing predicate is logged, excluded from the sum and reported in
    /// `skipped`; it never aborts the evaluation.
    pub fn evaluate(&self, tx: &Transaction, features: &FeatureVector) -> RuleScore {
        let mut triggered = Vec::new();
        let mut skipped = Vec::new();
        // Bounded by the normalization constant, checked at construction
        let mut points = 0u32;

        for rule in &self.rules {
            match rule.predicate.matches(tx, features) {
                Ok(true) => {
                    points += rule.weight;
                    triggered.push(RuleHit {
                        id: rule.id,
                        name: rule.name.clone(),
                        weight: rule.weight,
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        transaction_id = %tx.transaction_id,
                        rule_id = %rule.id,
                        error = %e,
                        "Rule skipped"
                    );
                    skipped.push(SkippedRule {
                        id: rule.id,
                        name: rule.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let value = points as f64 / self.normalization as f64;
        debug!(
            transaction_id = %tx.transaction_id,
            points,
            value,
            "{} rules triggered, {} skipped",
            triggered.len(),
            skipped.len()
        );

        RuleScore {
            value,
            triggered,
            skipped,
            triggered_points: points,
            normalization: self.normalization,
            ruleset_version: self.version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleEvaluationError;
    use crate::rules::RulePredicate;
    use chrono::{TimeZone, Utc};
    use feature_engine::FeatureExtractor;
    use proptest::prelude::*;
    use transaction_validator::{PaymentChannel, SenderHistory};

    struct Always(bool);

    impl RulePredicate for Always {
        fn matches(&self, _tx: &Transaction, _features: &FeatureVector) -> Result<bool, RuleEvaluationError> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl RulePredicate for Failing {
        fn matches(&self, _tx: &Transaction, _features: &FeatureVector) -> Result<bool, RuleEvaluationError> {
            Err(RuleEvaluationError::Predicate("lookup table missing".to_string()))
        }
    }

    fn transaction(amount: f64, location: &str) -> Transaction {
        Transaction {
            transaction_id: "tx_eval".to_string(),
            amount,
            // Wednesday afternoon
            timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 14, 30, 0).unwrap(),
            sender_id: "acc_1".to_string(),
            receiver_id: "acc_2".to_string(),
            channel: PaymentChannel::Card,
            location: location.to_string(),
            geo: None,
            device_fingerprint: "fp_1".to_string(),
            user_agent: None,
            failed_attempts: 0,
            sender_balance: None,
            history: None,
        }
    }

    fn evaluate(evaluator: &RuleEvaluator, tx: &Transaction) -> RuleScore {
        let features = FeatureExtractor::default().extract_validated(tx);
        evaluator.evaluate(tx, &features)
    }

    #[test]
    fn test_failing_rule_is_isolated() {
        let rules = vec![
            Rule::new(RuleId(1), "one", 10, Box::new(Always(true))),
            Rule::new(RuleId(2), "two", 20, Box::new(Always(true))),
            Rule::new(RuleId(3), "broken", 30, Box::new(Failing)),
            Rule::new(RuleId(4), "four", 40, Box::new(Always(true))),
            Rule::new(RuleId(5), "five", 50, Box::new(Always(true))),
        ];
        let evaluator = RuleEvaluator::new("test", 150, rules).unwrap();
        let score = evaluate(&evaluator, &transaction(10.0, "US"));

        assert_eq!(score.triggered_points, 120);
        assert_eq!(score.value, 120.0 / 150.0);
        assert_eq!(score.triggered_ids(), vec![RuleId(1), RuleId(2), RuleId(4), RuleId(5)]);
        assert_eq!(score.skipped.len(), 1);
        assert_eq!(score.skipped[0].id, RuleId(3));
        let line = score.skipped[0].audit_line();
        assert!(line.contains("R003"));
        assert!(line.contains("lookup table missing"));
    }

    #[test]
    fn test_triggered_ids_ascending_regardless_of_order() {
        let rules = vec![
            Rule::new(RuleId(9), "nine", 10, Box::new(Always(true))),
            Rule::new(RuleId(2), "two", 10, Box::new(Always(true))),
            Rule::new(RuleId(5), "five", 10, Box::new(Always(false))),
            Rule::new(RuleId(4), "four", 10, Box::new(Always(true))),
        ];
        let evaluator = RuleEvaluator::new("test", 100, rules).unwrap();
        let score = evaluate(&evaluator, &transaction(10.0, "US"));
        assert_eq!(score.triggered_ids(), vec![RuleId(2), RuleId(4), RuleId(9)]);
        assert!(score.skipped.is_empty());
    }

    #[test]
    fn test_constructor_rejects_bad_tables() {
        let dup = vec![
            Rule::new(RuleId(1), "a", 10, Box::new(Always(true))),
            Rule::new(RuleId(1), "b", 10, Box::new(Always(true))),
        ];
        assert!(matches!(
            RuleEvaluator::new("test", 100, dup),
            Err(RuleConfigError::DuplicateId(RuleId(1)))
        ));

        let heavy = vec![Rule::new(RuleId(1), "a", 101, Box::new(Always(true)))];
        assert!(matches!(
            RuleEvaluator::new("test", 100, heavy),
            Err(RuleConfigError::WeightsExceedNormalization { .. })
        ));

        let wrapping = vec![
            Rule::new(RuleId(1), "a", u32::MAX, Box::new(Always(true))),
            Rule::new(RuleId(2), "b", 1, Box::new(Always(true))),
        ];
        assert_eq!(
            RuleEvaluator::new("test", 100, wrapping).unwrap_err(),
            RuleConfigError::WeightsExceedNormalization {
                total: 1 << 32,
                normalization: 100
            }
        );
        assert!(matches!(
            RuleEvaluator::new("test", 0, Vec::new()),
            Err(RuleConfigError::ZeroNormalization)
        ));
    }

    #[test]
    fn test_default_rules_on_clean_transaction() {
        let evaluator = RuleEvaluator::from_config(&RuleSetConfig::default()).unwrap();
        assert_eq!(evaluator.rule_count(), 21);
        assert_eq!(evaluator.version(), "rules-v2");

        let score = evaluate(&evaluator, &transaction(42.5, "US"));
        assert_eq!(score.value, 0.0);
        assert!(score.triggered.is_empty());
    }

    #[test]
    fn test_default_rules_on_risky_transaction() {
        let evaluator = RuleEvaluator::from_config(&RuleSetConfig::default()).unwrap();
        let mut tx = transaction(6000.0, "VPN-Detected");
        tx.history = Some(SenderHistory {
            tx_count_24h: 8,
            ..Default::default()
        });

        let score = evaluate(&evaluator, &tx);
        // large_amount, round_amount, high_risk_location, velocity, new receiver,
        // hourly amount velocity
        assert_eq!(
            score.triggered_ids(),
            vec![RuleId(1), RuleId(2), RuleId(4), RuleId(7), RuleId(12), RuleId(19)]
        );
        assert_eq!(score.triggered_points, 35 + 25 + 30 + 25 + 20 + 20);
        assert_eq!(score.value, 155.0 / 515.0);
    }

    #[test]
    fn test_disabled_rule_not_evaluated() {
        let mut config = RuleSetConfig::default();
        config.rules[0].enabled = false;
        let evaluator = RuleEvaluator::from_config(&config).unwrap();
        assert_eq!(evaluator.rule_count(), 20);

        let score = evaluate(&evaluator, &transaction(6001.0, "US"));
        assert!(!score.triggered_ids().contains(&RuleId(1)));
    }

    #[test]
    fn test_malformed_history_is_skipped_not_fatal() {
        let evaluator = RuleEvaluator::from_config(&RuleSetConfig::default()).unwrap();
        let mut tx = transaction(6000.0, "US");
        tx.history = Some(SenderHistory {
            amount_24h: -5.0,
            ..Default::default()
        });

        let score = evaluate(&evaluator, &tx);
        assert_eq!(score.skipped.len(), 1);
        assert_eq!(score.skipped[0].id, RuleId(8));
        assert!(score.triggered_ids().contains(&RuleId(1)));
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_deterministic(
            amount in 0.01f64..50_000.0,
            location in prop::sample::select(vec!["US", "DE", "Unknown", "Tor-Exit-Node"]),
            count in 0u32..20,
        ) {
            let evaluator = RuleEvaluator::from_config(&RuleSetConfig::default()).unwrap();
            let mut tx = transaction(amount, location);
            tx.history = Some(SenderHistory { tx_count_24h: count, ..Default::default() });

            let first = evaluate(&evaluator, &tx);
            let second = evaluate(&evaluator, &tx);
            prop_assert_eq!(first.value.to_bits(), second.value.to_bits());
            prop_assert_eq!(&first.triggered, &second.triggered);
            prop_assert!((0.0..=1.0).contains(&first.value));
        }
    }
}
