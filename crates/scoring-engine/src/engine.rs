//! Hybrid Scoring Engine
//!
//! Validates and featurizes a transaction, runs the classifier and the rule
//! table side by side, blends the two scores and classifies the result.

use crate::blend::{ensure_unit, BlendWeights};
use crate::config::{DegradedModePolicy, EngineConfig};
use crate::decision::Decision;
use crate::error::EngineError;
use crate::policy::DecisionPolicy;
use crate::telemetry;
use chrono::{DateTime, Utc};
use feature_engine::{FeatureExtractor, FeatureVector, FEATURE_DIMENSION};
use inference_engine::{InferenceError, MlScore, MlScorer};
use rule_engine::{RuleEvaluator, RuleScore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use transaction_validator::{Transaction, TransactionRecord, Validator};
use uuid::Uuid;

/// Scoring engine shared across tasks.
///
/// Holds only read-only state; cloning is cheap and every clone scores
/// identically.
#[derive(Debug, Clone)]
pub struct HybridScoringEngine {
    extractor: Arc<FeatureExtractor>,
    scorer: Arc<MlScorer>,
    rules: Arc<RuleEvaluator>,
    blend: BlendWeights,
    policy: DecisionPolicy,
    degraded_mode: DegradedModePolicy,
    config_version: String,
    max_concurrency: usize,
}

impl HybridScoringEngine {
    /// Assemble an engine from a validated configuration and injected scorers
    pub fn new(config: &EngineConfig, scorer: MlScorer, rules: RuleEvaluator) -> Result<Self, EngineError> {
        config.validate()?;

        let extractor = FeatureExtractor::new(
            Validator::new(config.validation.clone()),
            config.imputation.clone(),
        );
        let policy = DecisionPolicy::new(config.thresholds)?;

        info!(
            config_version = %config.version,
            model_version = scorer.model_version().unwrap_or("none"),
            ruleset_version = %rules.version(),
            degraded_mode = ?config.degraded_mode,
            "Scoring engine ready"
        );
        if !scorer.is_loaded() {
            warn!(
                degraded_mode = ?config.degraded_mode,
                "No classifier loaded; every evaluation follows the degraded-mode policy"
            );
        }

        Ok(Self {
            extractor: Arc::new(extractor),
            scorer: Arc::new(scorer),
            rules: Arc::new(rules),
            blend: config.blend,
            policy,
            degraded_mode: config.degraded_mode,
            config_version: config.version.clone(),
            max_concurrency: config.batch.max_concurrency,
        })
    }

    /// Load the model and rule table named by the configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let scorer = MlScorer::load(&config.model)?;
        let rules = RuleEvaluator::from_config(&config.rules)?;
        Self::new(config, scorer, rules)
    }

    pub fn config_version(&self) -> &str {
        &self.config_version
    }

    pub fn degraded_mode(&self) -> DegradedModePolicy {
        self.degraded_mode
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Evaluate against the wall clock
    pub async fn evaluate(&self, record: &TransactionRecord) -> Result<Decision, EngineError> {
        self.evaluate_at(record, Utc::now()).await
    }

    /// Evaluate with `now` as the reference time for validation and the
    /// decision timestamp
    pub async fn evaluate_at(
        &self,
        record: &TransactionRecord,
        now: DateTime<Utc>,
    ) -> Result<Decision, EngineError> {
        let started = Instant::now();

        let tx = match self.extractor.validator().validate_at(record, now) {
            Ok(tx) => tx,
            Err(e) => {
                warn!(
                    transaction_id = record.transaction_id.as_deref().unwrap_or("<missing>"),
                    field = e.field(),
                    error = %e,
                    "Transaction rejected"
                );
                telemetry::record_rejection(e.field());
                return Err(e.into());
            }
        };

        let features = self.extractor.extract_validated(&tx);
        if !features.has_valid_shape() {
            telemetry::record_failure("feature_shape");
            return Err(EngineError::FeatureShape(format!(
                "extractor produced {} values, expected {}",
                features.values.len(),
                FEATURE_DIMENSION
            )));
        }

        // Classifier on the blocking pool, rules here; joined before blending
        let scorer = Arc::clone(&self.scorer);
        let ml_features = features.clone();
        let ml_task = tokio::task::spawn_blocking(move || scorer.score(&ml_features));
        let rule_score = self.rules.evaluate(&tx, &features);
        let ml_result = match ml_task.await {
            Ok(result) => result,
            Err(e) => Err(InferenceError::InferenceFailed(format!("scoring task failed: {}", e))),
        };

        let result = self.assemble(&tx, &features, ml_result, rule_score, now);
        match &result {
            Ok(decision) => {
                telemetry::record_decision(decision, started.elapsed());
                info!(
                    transaction_id = %decision.transaction_id,
                    decision = %decision.label,
                    blended_score = decision.blended_score,
                    degraded = decision.degraded,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Transaction scored"
                );
            }
            Err(e) => {
                telemetry::record_failure(failure_kind(e));
                error!(transaction_id = %tx.transaction_id, error = %e, "Evaluation failed");
            }
        }
        result
    }

    fn assemble(
        &self,
        tx: &Transaction,
        features: &FeatureVector,
        ml_result: Result<MlScore, InferenceError>,
        rule_score: RuleScore,
        now: DateTime<Utc>,
    ) -> Result<Decision, EngineError> {
        let mut audit_trail = Vec::new();

        let (ml_score, degraded_reason) = match ml_result {
            Ok(score) => (Some(score), None),
            Err(e @ (InferenceError::ModelUnavailable(_) | InferenceError::InferenceFailed(_))) => {
                match self.degraded_mode {
                    DegradedModePolicy::FailFast => return Err(EngineError::from(e)),
                    DegradedModePolicy::RuleOnly => {
                        warn!(
                            transaction_id = %tx.transaction_id,
                            reason = %e,
                            "Classifier unavailable, scoring from rules only"
                        );
                        (None, Some(e.to_string()))
                    }
                }
            }
            Err(e) => return Err(EngineError::from(e)),
        };

        let rule_value = ensure_unit("rule score", rule_score.value)?;
        let blended_score = match &ml_score {
            Some(ml) => {
                audit_trail.push(format!(
                    "ml score {:.4} from model {}",
                    ml.probability, ml.model_version
                ));
                if !ml.top_features.is_empty() {
                    let top: Vec<String> = ml
                        .top_features
                        .iter()
                        .map(|c| format!("{} {:+.4}", c.feature, c.contribution))
                        .collect();
                    audit_trail.push(format!("ml top features: {}", top.join(", ")));
                }
                self.blend.blend(ml.probability, rule_value)?
            }
            None => {
                audit_trail.push(format!(
                    "degraded: {}; rule-only scoring",
                    degraded_reason.as_deref().unwrap_or("classifier unavailable")
                ));
                rule_value
            }
        };

        audit_trail.push(format!(
            "rule score {:.4} ({}/{} points, {})",
            rule_value, rule_score.triggered_points, rule_score.normalization, rule_score.ruleset_version
        ));
        for hit in &rule_score.triggered {
            audit_trail.push(format!("rule {} {} triggered (+{})", hit.id, hit.name, hit.weight));
        }
        for skipped in &rule_score.skipped {
            audit_trail.push(skipped.audit_line());
        }

        let imputed_features: Vec<String> =
            features.imputed_features().into_iter().map(String::from).collect();
        if !imputed_features.is_empty() {
            audit_trail.push(format!("imputed features: {}", imputed_features.join(", ")));
        }

        let label = self.policy.classify(blended_score);
        audit_trail.push(format!("blended score {:.4} -> {}", blended_score, label));
        debug!(transaction_id = %tx.transaction_id, ?audit_trail, "Decision assembled");

        Ok(Decision {
            decision_id: Uuid::new_v4(),
            transaction_id: tx.transaction_id.clone(),
            label,
            blended_score,
            ml_score,
            rule_score,
            degraded: degraded_reason.is_some(),
            degraded_reason,
            imputed_features,
            config_version: self.config_version.clone(),
            audit_trail,
            evaluated_at: now,
        })
    }

    /// Evaluate or fail with `DeadlineExceeded`; never a partial score
    pub async fn evaluate_with_deadline(
        &self,
        record: &TransactionRecord,
        deadline: Duration,
    ) -> Result<Decision, EngineError> {
        match tokio::time::timeout(deadline, self.evaluate(record)).await {
            Ok(result) => result,
            Err(_) => {
                telemetry::record_failure("deadline");
                warn!(
                    transaction_id = record.transaction_id.as_deref().unwrap_or("<missing>"),
                    deadline_ms = deadline.as_millis() as u64,
                    "Evaluation deadline exceeded"
                );
                Err(EngineError::DeadlineExceeded(deadline))
            }
        }
    }

    /// Evaluate many records concurrently; results keep input order
    pub async fn evaluate_batch(&self, records: Vec<TransactionRecord>) -> Vec<Result<Decision, EngineError>> {
        self.run_batch(records, None).await
    }

    /// Batch evaluation with a per-record deadline
    pub async fn evaluate_batch_with_deadline(
        &self,
        records: Vec<TransactionRecord>,
        deadline: Duration,
    ) -> Vec<Result<Decision, EngineError>> {
        self.run_batch(records, Some(deadline)).await
    }

    async fn run_batch(
        &self,
        records: Vec<TransactionRecord>,
        deadline: Option<Duration>,
    ) -> Vec<Result<Decision, EngineError>> {
        let count = records.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, record) in records.into_iter().enumerate() {
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // Held until the evaluation finishes
                let _permit = semaphore.acquire_owned().await.ok();
                let result = match deadline {
                    Some(deadline) => engine.evaluate_with_deadline(&record, deadline).await,
                    None => engine.evaluate(&record).await,
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Decision, EngineError>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "Batch evaluation task failed"),
            }
        }

        let decided = results.iter().filter(|r| matches!(r, Some(Ok(_)))).count();
        info!("Batch complete: {}/{} transactions decided", decided, count);

        results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(EngineError::TaskFailed("evaluation task aborted".to_string()))))
            .collect()
    }
}

fn failure_kind(err: &EngineError) -> &'static str {
    match err {
        EngineError::InvalidTransaction(_) => "invalid_transaction",
        EngineError::FeatureShape(_) => "feature_shape",
        EngineError::InvalidModelOutput(_) => "invalid_model_output",
        EngineError::ScoringUnavailable(_) => "scoring_unavailable",
        EngineError::DeadlineExceeded(_) => "deadline",
        EngineError::ScoreInvariant(_) => "score_invariant",
        EngineError::Config(_) => "config",
        EngineError::TaskFailed(_) => "task_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DecisionLabel, Thresholds};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use feature_engine::FeatureName;
    use inference_engine::{FraudClassifier, LinearClassifier};
    use rule_engine::{Rule, RuleEvaluationError, RuleId, RulePredicate};
    use transaction_validator::{PaymentChannel, SenderHistory, ValidationError};

    struct FixedClassifier {
        probability: f64,
        names: Vec<String>,
    }

    impl FixedClassifier {
        fn scorer(probability: f64) -> MlScorer {
            let classifier = Self {
                probability,
                names: FeatureName::names().into_iter().map(String::from).collect(),
            };
            MlScorer::new(Arc::new(classifier)).unwrap()
        }
    }

    impl FraudClassifier for FixedClassifier {
        fn version(&self) -> &str {
            "fixed-1"
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, _features: &[f64]) -> Result<f64, InferenceError> {
            Ok(self.probability)
        }
    }

    /// Classifier that fails at runtime or blocks
    struct MisbehavingClassifier {
        names: Vec<String>,
        sleep: Option<std::time::Duration>,
        output: Result<f64, InferenceError>,
    }

    impl MisbehavingClassifier {
        fn scorer(sleep: Option<std::time::Duration>, output: Result<f64, InferenceError>) -> MlScorer {
            let classifier = Self {
                names: FeatureName::names().into_iter().map(String::from).collect(),
                sleep,
                output,
            };
            MlScorer::new(Arc::new(classifier)).unwrap()
        }
    }

    impl FraudClassifier for MisbehavingClassifier {
        fn version(&self) -> &str {
            "misbehaving-1"
        }

        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, _features: &[f64]) -> Result<f64, InferenceError> {
            if let Some(sleep) = self.sleep {
                std::thread::sleep(sleep);
            }
            self.output.clone()
        }
    }

    struct Always(bool);

    impl RulePredicate for Always {
        fn matches(&self, _tx: &Transaction, _f: &FeatureVector) -> Result<bool, RuleEvaluationError> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl RulePredicate for Failing {
        fn matches(&self, _tx: &Transaction, _f: &FeatureVector) -> Result<bool, RuleEvaluationError> {
            Err(RuleEvaluationError::Predicate("velocity store returned garbage".to_string()))
        }
    }

    /// 20 of 100 points fire: rule score 0.2
    fn fixed_rules() -> RuleEvaluator {
        RuleEvaluator::new(
            "rules-test",
            100,
            vec![
                Rule::new(RuleId(1), "fires", 20, Box::new(Always(true))),
                Rule::new(RuleId(2), "quiet", 30, Box::new(Always(false))),
            ],
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 14, 30, 0).unwrap()
    }

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord {
            transaction_id: Some(id.to_string()),
            amount: Some(120.5),
            timestamp: Some(now() - ChronoDuration::minutes(1)),
            sender_id: Some("acc_1".to_string()),
            receiver_id: Some("acc_2".to_string()),
            channel: Some(PaymentChannel::Card),
            location: Some("US".to_string()),
            device_fingerprint: Some("fp_1".to_string()),
            history: Some(SenderHistory {
                tx_count_1h: 1,
                tx_count_24h: 2,
                amount_1h: 50.0,
                amount_24h: 300.0,
                avg_amount: Some(100.0),
                known_receivers: ["acc_2".to_string()].into_iter().collect(),
                ..Default::default()
            }),
            sender_balance: Some(5000.0),
            ..Default::default()
        }
    }

    fn engine(config: &EngineConfig, scorer: MlScorer) -> HybridScoringEngine {
        HybridScoringEngine::new(config, scorer, fixed_rules()).unwrap()
    }

    #[tokio::test]
    async fn test_hybrid_blend() {
        let engine = engine(&EngineConfig::default(), FixedClassifier::scorer(0.8));
        let decision = engine.evaluate_at(&record("tx_1"), now()).await.unwrap();

        assert_eq!(decision.transaction_id, "tx_1");
        assert_eq!(decision.rule_score.value, 0.2);
        assert_eq!(decision.blended_score.to_bits(), (0.7 * 0.8 + 0.3 * 0.2f64).to_bits());
        assert_eq!(decision.label, DecisionLabel::Review);
        assert!(!decision.degraded);
        assert_eq!(decision.model_version(), Some("fixed-1"));
        assert_eq!(decision.triggered_rules(), vec![RuleId(1)]);
        assert_eq!(decision.config_version, "engine-v1");
        assert_eq!(decision.evaluated_at, now());
        assert!(decision.imputed_features.is_empty());
    }

    #[tokio::test]
    async fn test_rule_only_degraded_mode() {
        let engine = engine(&EngineConfig::default(), MlScorer::unavailable());
        let decision = engine.evaluate_at(&record("tx_2"), now()).await.unwrap();

        assert!(decision.degraded);
        assert!(decision.degraded_reason.is_some());
        assert!(decision.ml_score.is_none());
        assert_eq!(decision.blended_score.to_bits(), decision.rule_score.value.to_bits());
        assert_eq!(decision.label, DecisionLabel::Approve);
        assert!(decision.audit_trail.iter().any(|l| l.starts_with("degraded:")));
    }

    #[tokio::test]
    async fn test_fail_fast_degraded_mode() {
        let config = EngineConfig {
            degraded_mode: DegradedModePolicy::FailFast,
            ..Default::default()
        };
        let engine = engine(&config, MlScorer::unavailable());
        let err = engine.evaluate_at(&record("tx_3"), now()).await.unwrap_err();
        assert!(matches!(err, EngineError::ScoringUnavailable(_)));
    }

    #[tokio::test]
    async fn test_runtime_inference_failure_follows_policy() {
        let scorer = MisbehavingClassifier::scorer(None, Err(InferenceError::InferenceFailed("tensor error".to_string())));
        let engine = engine(&EngineConfig::default(), scorer);
        let decision = engine.evaluate_at(&record("tx_4"), now()).await.unwrap();
        assert!(decision.degraded);
        assert!(decision.degraded_reason.unwrap().contains("tensor error"));
    }

    #[tokio::test]
    async fn test_invalid_model_output_is_fatal() {
        // Never degraded, even under rule-only
        let scorer = MisbehavingClassifier::scorer(None, Ok(1.7));
        let engine = engine(&EngineConfig::default(), scorer);
        let err = engine.evaluate_at(&record("tx_5"), now()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidModelOutput(_)));
    }

    #[tokio::test]
    async fn test_missing_field_rejected_before_scoring() {
        let engine = engine(&EngineConfig::default(), FixedClassifier::scorer(0.1));
        let mut bad = record("tx_6");
        bad.receiver_id = None;

        let err = engine.evaluate_at(&bad, now()).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTransaction(ValidationError::MissingField("receiver_id"))
        );
    }

    #[tokio::test]
    async fn test_failing_rule_recorded_in_audit_trail() {
        let rules = RuleEvaluator::new(
            "rules-test",
            100,
            vec![
                Rule::new(RuleId(1), "fires", 20, Box::new(Always(true))),
                Rule::new(RuleId(7), "velocity", 30, Box::new(Failing)),
            ],
        )
        .unwrap();
        let engine =
            HybridScoringEngine::new(&EngineConfig::default(), FixedClassifier::scorer(0.5), rules).unwrap();

        let decision = engine.evaluate_at(&record("tx_7"), now()).await.unwrap();
        assert_eq!(decision.rule_score.value, 0.2);
        assert!(decision
            .audit_trail
            .iter()
            .any(|l| l == "rule R007 skipped: evaluation error: predicate failed: velocity store returned garbage"));
    }

    #[tokio::test]
    async fn test_thresholds_from_config() {
        let config = EngineConfig {
            thresholds: Thresholds { review: 0.3, block: 0.6 },
            ..Default::default()
        };
        let engine = engine(&config, FixedClassifier::scorer(0.8));
        let decision = engine.evaluate_at(&record("tx_8"), now()).await.unwrap();
        // 0.62 >= 0.6
        assert_eq!(decision.label, DecisionLabel::Block);
    }

    #[tokio::test]
    async fn test_imputed_features_reported() {
        let engine = engine(&EngineConfig::default(), FixedClassifier::scorer(0.1));
        let mut sparse = record("tx_9");
        sparse.history = None;
        sparse.sender_balance = None;

        let decision = engine.evaluate_at(&sparse, now()).await.unwrap();
        assert!(decision.imputed_features.contains(&"amount_velocity_1h".to_string()));
        assert!(decision.imputed_features.contains(&"sender_balance_ratio".to_string()));
        assert!(decision.audit_trail.iter().any(|l| l.starts_with("imputed features:")));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let scorer = MisbehavingClassifier::scorer(Some(std::time::Duration::from_millis(300)), Ok(0.5));
        let engine = engine(&EngineConfig::default(), scorer);

        let err = engine
            .evaluate_with_deadline(&record("tx_10"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::DeadlineExceeded(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_deadline_met() {
        let engine = engine(&EngineConfig::default(), FixedClassifier::scorer(0.8));
        let decision = engine
            .evaluate_with_deadline(&record("tx_11"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(decision.label, DecisionLabel::Review);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_preserves_input_order() {
        let config = EngineConfig {
            batch: crate::config::BatchConfig {
                max_concurrency: 3,
                deadline_ms: None,
            },
            ..Default::default()
        };
        let engine = engine(&config, FixedClassifier::scorer(0.8));

        let mut records: Vec<TransactionRecord> = (0..20).map(|i| record(&format!("tx_{:02}", i))).collect();
        records[5].amount = None;

        let results = engine.evaluate_batch(records).await;
        assert_eq!(results.len(), 20);
        for (i, result) in results.iter().enumerate() {
            if i == 5 {
                assert!(matches!(result, Err(EngineError::InvalidTransaction(_))));
            } else {
                assert_eq!(result.as_ref().unwrap().transaction_id, format!("tx_{:02}", i));
            }
        }
    }

    #[tokio::test]
    async fn test_ml_contributions_in_audit_trail() {
        let mut weights = vec![0.0; FeatureName::ALL.len()];
        weights[FeatureName::Amount.index()] = 0.001;
        let classifier = LinearClassifier {
            version: "linear-audit".to_string(),
            feature_names: FeatureName::names().into_iter().map(String::from).collect(),
            means: vec![0.0; weights.len()],
            scales: vec![1.0; weights.len()],
            weights,
            bias: -1.0,
        };
        let scorer = MlScorer::new(Arc::new(classifier)).unwrap();
        let engine = engine(&EngineConfig::default(), scorer);

        let decision = engine.evaluate_at(&record("tx_explain"), now()).await.unwrap();
        let ml = decision.ml_score.as_ref().unwrap();
        assert_eq!(ml.top_features.len(), 1);
        assert_eq!(ml.top_features[0].feature, "amount");
        assert!(decision
            .audit_trail
            .iter()
            .any(|l| l == "ml top features: amount +0.1205"));
    }

    #[tokio::test]
    async fn test_default_rules_end_to_end() {
        let config = EngineConfig::default();
        let rules = RuleEvaluator::from_config(&config.rules).unwrap();
        let engine = HybridScoringEngine::new(&config, FixedClassifier::scorer(0.9), rules).unwrap();

        let mut risky = record("tx_risky");
        risky.amount = Some(7000.0);
        risky.location = Some("Tor-Exit-Node".to_string());
        risky.receiver_id = Some("acc_unknown".to_string());

        let decision = engine.evaluate_at(&risky, now()).await.unwrap();
        // large_amount, round_amount, high_risk_location, amount_spike,
        // new_receiver_high_value, hourly_amount_velocity
        assert_eq!(
            decision.triggered_rules(),
            vec![RuleId(1), RuleId(2), RuleId(4), RuleId(9), RuleId(12), RuleId(19)]
        );
        assert_eq!(decision.rule_score.value, 145.0 / 515.0);
        assert_eq!(decision.label, DecisionLabel::Block);
        assert_eq!(decision.rule_score.ruleset_version, "rules-v2");
    }
}
