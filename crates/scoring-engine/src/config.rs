//! Engine Configuration
//!
//! Loaded once at startup from TOML with `RISK__` environment overrides,
//! e.g. `RISK__THRESHOLDS__BLOCK=0.8` or `RISK__DEGRADED_MODE=fail_fast`.

use crate::blend::BlendWeights;
use crate::error::EngineError;
use crate::policy::Thresholds;
use config::{Config, Environment, File, FileFormat};
use feature_engine::ImputationDefaults;
use inference_engine::ModelConfig;
use rule_engine::RuleSetConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use transaction_validator::ValidationConfig;

/// What to do when the classifier cannot produce a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedModePolicy {
    /// Return `ScoringUnavailable`
    FailFast,
    /// Score from rules alone and mark the decision degraded
    #[default]
    RuleOnly,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Prometheus scrape address, exporter disabled when unset
    pub prometheus_listen: Option<String>,
}

/// Batch evaluation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Evaluations in flight at once
    pub max_concurrency: usize,
    /// Per-transaction deadline in milliseconds
    pub deadline_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            deadline_ms: None,
        }
    }
}

impl BatchConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Versioned engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recorded on every decision
    pub version: String,
    pub degraded_mode: DegradedModePolicy,
    pub blend: BlendWeights,
    pub thresholds: Thresholds,
    pub validation: ValidationConfig,
    pub imputation: ImputationDefaults,
    pub model: ModelConfig,
    pub rules: RuleSetConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "engine-v1".to_string(),
            degraded_mode: DegradedModePolicy::default(),
            blend: BlendWeights::default(),
            thresholds: Thresholds::default(),
            validation: ValidationConfig::default(),
            imputation: ImputationDefaults::default(),
            model: ModelConfig::default(),
            rules: RuleSetConfig::default(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file plus `RISK__` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix("RISK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let config = Self::build(builder, &path.display().to_string())?;
        info!(
            config_version = %config.version,
            path = %path.display(),
            "Engine configuration loaded"
        );
        Ok(config)
    }

    /// Parse TOML text without environment overrides
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let builder = Config::builder().add_source(File::from_str(text, FileFormat::Toml));
        Self::build(builder, "inline")
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        origin: &str,
    ) -> Result<Self, EngineError> {
        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EngineError::Config(format!("{}: {}", origin, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section; nothing is clamped or repaired
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.version.trim().is_empty() {
            return Err(EngineError::Config("version must not be empty".to_string()));
        }
        self.blend.validate()?;
        self.thresholds.validate()?;
        self.rules.validate()?;
        self.imputation.validate().map_err(EngineError::Config)?;

        if self.validation.clock_skew_secs < 0 {
            return Err(EngineError::Config(format!(
                "validation.clock_skew_secs must be non-negative, got {}",
                self.validation.clock_skew_secs
            )));
        }
        if !(self.validation.max_amount.is_finite() && self.validation.max_amount > 0.0) {
            return Err(EngineError::Config(format!(
                "validation.max_amount must be positive, got {}",
                self.validation.max_amount
            )));
        }
        if self.batch.max_concurrency == 0 {
            return Err(EngineError::Config("batch.max_concurrency must be at least 1".to_string()));
        }
        if self.batch.deadline_ms == Some(0) {
            return Err(EngineError::Config("batch.deadline_ms must be positive".to_string()));
        }
        Ok(())
    }
}
