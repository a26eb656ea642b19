//! Engine Telemetry

use crate::decision::Decision;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

pub const DECISIONS_TOTAL: &str = "risk_decisions_total";
pub const DEGRADED_TOTAL: &str = "risk_degraded_evaluations_total";
pub const REJECTED_TOTAL: &str = "risk_rejected_transactions_total";
pub const FAILED_TOTAL: &str = "risk_failed_evaluations_total";
pub const SKIPPED_RULES_TOTAL: &str = "risk_skipped_rules_total";
pub const BLENDED_SCORE: &str = "risk_blended_score";
pub const EVALUATION_SECONDS: &str = "risk_evaluation_duration_seconds";

/// Register descriptions with the installed recorder
pub fn describe() {
    describe_counter!(DECISIONS_TOTAL, "Decisions issued, by label");
    describe_counter!(DEGRADED_TOTAL, "Evaluations scored without the classifier");
    describe_counter!(REJECTED_TOTAL, "Transactions rejected by validation, by field");
    describe_counter!(FAILED_TOTAL, "Evaluations that returned an error, by kind");
    describe_counter!(SKIPPED_RULES_TOTAL, "Rule predicates that failed and were excluded");
    describe_histogram!(BLENDED_SCORE, "Distribution of blended risk scores");
    describe_histogram!(EVALUATION_SECONDS, "End-to-end evaluation latency");
}

pub(crate) fn record_decision(decision: &Decision, elapsed: Duration) {
    counter!(DECISIONS_TOTAL, "label" => decision.label.as_str()).increment(1);
    if decision.degraded {
        counter!(DEGRADED_TOTAL).increment(1);
    }
    let skipped = decision.rule_score.skipped.len();
    if skipped > 0 {
        counter!(SKIPPED_RULES_TOTAL).increment(skipped as u64);
    }
    histogram!(BLENDED_SCORE).record(decision.blended_score);
    histogram!(EVALUATION_SECONDS).record(elapsed.as_secs_f64());
}

pub(crate) fn record_rejection(field: &'static str) {
    counter!(REJECTED_TOTAL, "field" => field).increment(1);
}

pub(crate) fn record_failure(kind: &'static str) {
    counter!(FAILED_TOTAL, "kind" => kind).increment(1);
}
