//! Rule-Based Risk Scoring
//!
//! Deterministic fraud heuristics with integer severity weights. The rule
//! table is data: each entry pairs an id and weight with a configured
//! predicate, and the score is the triggered weight over a fixed
//! normalization constant.

mod config;
mod error;
mod evaluator;
mod rules;

pub use config::{RuleDefinition, RuleSetConfig};
pub use error::{RuleConfigError, RuleEvaluationError};
pub use evaluator::{RuleEvaluator, RuleHit, RuleScore, SkippedRule};
pub use rules::{Rule, RuleId, RuleKind, RulePredicate, SpikeBasis};
