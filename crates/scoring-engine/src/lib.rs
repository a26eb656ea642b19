//! Hybrid Risk Scoring
//!
//! Combines the fraud classifier and the rule table into one blended score
//! and maps it to APPROVE, REVIEW or BLOCK.

mod blend;
mod config;
mod decision;
mod engine;
mod error;
mod policy;
pub mod telemetry;

pub use blend::BlendWeights;
pub use self::config::{BatchConfig, DegradedModePolicy, EngineConfig, LogFormat, LoggingConfig, TelemetryConfig};
pub use decision::Decision;
pub use engine::HybridScoringEngine;
pub use error::EngineError;
pub use policy::{DecisionLabel, DecisionPolicy, Thresholds};

pub use transaction_validator::TransactionRecord;
