//! Transaction Schema Validator

use crate::error::ValidationError;
use crate::transaction::{Transaction, TransactionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// How far ahead of "now" a timestamp may be (seconds)
    pub clock_skew_secs: i64,
    /// Largest accepted transaction amount
    pub max_amount: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 300,
            max_amount: 1.0e9,
        }
    }
}

/// Schema validator for incoming transaction records
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a record against the wall clock
    pub fn validate(&self, record: &TransactionRecord) -> Result<Transaction, ValidationError> {
        self.validate_at(record, Utc::now())
    }

    /// Validate a record, treating `now` as the current time.
    ///
    /// Checks run in field order and stop at the first failure; nothing is
    /// produced for a record that fails.
    pub fn validate_at(
        &self,
        record: &TransactionRecord,
        now: DateTime<Utc>,
    ) -> Result<Transaction, ValidationError> {
        let transaction_id = required_text("transaction_id", &record.transaction_id)?;

        let amount = record.amount.ok_or(ValidationError::MissingField("amount"))?;
        self.validate_amount(amount)?;

        let timestamp = record
            .timestamp
            .ok_or(ValidationError::MissingField("timestamp"))?;
        self.validate_timestamp(timestamp, now)?;

        let sender_id = required_text("sender_id", &record.sender_id)?;
        let receiver_id = required_text("receiver_id", &record.receiver_id)?;
        let channel = record.channel.ok_or(ValidationError::MissingField("channel"))?;
        let location = required_text("location", &record.location)?;
        let device_fingerprint = required_text("device_fingerprint", &record.device_fingerprint)?;

        if let Some(geo) = record.geo {
            if !geo.is_valid() {
                return Err(ValidationError::InvalidField {
                    field: "geo",
                    reason: format!("coordinates ({}, {}) are not on the globe", geo.lat, geo.lon),
                });
            }
        }

        if let Some(balance) = record.sender_balance {
            if !balance.is_finite() || balance < 0.0 {
                return Err(ValidationError::InvalidField {
                    field: "sender_balance",
                    reason: format!("balance must be a non-negative number, got {}", balance),
                });
            }
        }

        debug!(transaction_id = %transaction_id, "Transaction passed schema validation");

        Ok(Transaction {
            transaction_id,
            amount,
            timestamp,
            sender_id,
            receiver_id,
            channel,
            location,
            geo: record.geo,
            device_fingerprint,
            user_agent: record.user_agent.clone(),
            failed_attempts: record.failed_attempts.unwrap_or(0),
            sender_balance: record.sender_balance,
            history: record.history.clone(),
        })
    }

    /// Validate the amount: finite, strictly positive and under the cap
    pub fn validate_amount(&self, amount: f64) -> Result<(), ValidationError> {
        if !amount.is_finite() {
            return Err(ValidationError::InvalidField {
                field: "amount",
                reason: "amount must be a finite number".to_string(),
            });
        }
        if amount <= 0.0 || amount > self.config.max_amount {
            return Err(ValidationError::OutOfRange {
                field: "amount",
                value: amount,
                min: 0.0,
                max: self.config.max_amount,
            });
        }
        Ok(())
    }

    /// Reject timestamps beyond the clock-skew tolerance
    pub fn validate_timestamp(
        &self,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let ahead_secs = (timestamp - now).num_seconds();
        if ahead_secs > self.config.clock_skew_secs {
            return Err(ValidationError::FutureTimestamp {
                ahead_secs,
                tolerance_secs: self.config.clock_skew_secs,
            });
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

fn required_text(field: &'static str, value: &Option<String>) -> Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        None => Err(ValidationError::MissingField(field)),
        Some("") => Err(ValidationError::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        }),
        Some(text) => Ok(text.to_string()),
    }
}
