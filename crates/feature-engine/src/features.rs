//! Feature Vector Assembly

use crate::imputation::ImputationDefaults;
use crate::signals::{self, HIGH_RISK_LOCATIONS, RISKY_DEVICE_MARKERS};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;
use transaction_validator::{Transaction, TransactionRecord, ValidationError, Validator};

/// Number of features in the vector
pub const FEATURE_DIMENSION: usize = 13;

/// Cap on failed authentication attempts
pub const MAX_FAILED_ATTEMPTS: f64 = 20.0;
/// Cap on velocity amounts
pub const MAX_VELOCITY_AMOUNT: f64 = 1.0e12;
/// Cap on the 1h transaction count
pub const MAX_TX_COUNT_1H: f64 = 10_000.0;
/// Cap on the 24h transaction count
pub const MAX_TX_COUNT_24H: f64 = 100_000.0;

/// Named features, in the order the classifier was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    Amount,
    Hour,
    DayOfWeek,
    FailedAttempts,
    UnusualLocation,
    DeviceRisk,
    AmountVelocity1h,
    AmountVelocity24h,
    TxCount1h,
    TxCount24h,
    RecipientNew,
    SenderBalanceRatio,
    RoundAmount,
}

impl FeatureName {
    /// All features in vector order
    pub const ALL: [FeatureName; FEATURE_DIMENSION] = [
        FeatureName::Amount,
        FeatureName::Hour,
        FeatureName::DayOfWeek,
        FeatureName::FailedAttempts,
        FeatureName::UnusualLocation,
        FeatureName::DeviceRisk,
        FeatureName::AmountVelocity1h,
        FeatureName::AmountVelocity24h,
        FeatureName::TxCount1h,
        FeatureName::TxCount24h,
        FeatureName::RecipientNew,
        FeatureName::SenderBalanceRatio,
        FeatureName::RoundAmount,
    ];

    /// Position in the vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Get string representation (matches the training schema)
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::Amount => "amount",
            FeatureName::Hour => "hour",
            FeatureName::DayOfWeek => "day_of_week",
            FeatureName::FailedAttempts => "failed_attempts",
            FeatureName::UnusualLocation => "unusual_location",
            FeatureName::DeviceRisk => "device_risk",
            FeatureName::AmountVelocity1h => "amount_velocity_1h",
            FeatureName::AmountVelocity24h => "amount_velocity_24h",
            FeatureName::TxCount1h => "tx_count_1h",
            FeatureName::TxCount24h => "tx_count_24h",
            FeatureName::RecipientNew => "recipient_new",
            FeatureName::SenderBalanceRatio => "sender_balance_ratio",
            FeatureName::RoundAmount => "round_amount",
        }
    }

    /// Documented valid range (inclusive).
    ///
    /// `Amount` is further capped by the validator's `max_amount`.
    pub fn range(self) -> (f64, f64) {
        match self {
            FeatureName::Amount => (0.0, f64::MAX),
            FeatureName::Hour => (0.0, 23.0),
            FeatureName::DayOfWeek => (0.0, 6.0),
            FeatureName::FailedAttempts => (0.0, MAX_FAILED_ATTEMPTS),
            FeatureName::AmountVelocity1h | FeatureName::AmountVelocity24h => {
                (0.0, MAX_VELOCITY_AMOUNT)
            }
            FeatureName::TxCount1h => (0.0, MAX_TX_COUNT_1H),
            FeatureName::TxCount24h => (0.0, MAX_TX_COUNT_24H),
            FeatureName::UnusualLocation
            | FeatureName::DeviceRisk
            | FeatureName::RecipientNew
            | FeatureName::SenderBalanceRatio
            | FeatureName::RoundAmount => (0.0, 1.0),
        }
    }

    /// Feature names in vector order
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|f| f.as_str()).collect()
    }
}

/// Feature vector for ML inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Raw feature values, indexed by [`FeatureName::index`]
    pub values: Vec<f64>,
    /// Per-feature imputation flags (audit only; never alters `values`)
    pub imputed: Vec<bool>,
}

impl FeatureVector {
    /// Value of a named feature
    pub fn get(&self, name: FeatureName) -> f64 {
        self.values[name.index()]
    }

    /// Whether a named feature was imputed
    pub fn is_imputed(&self, name: FeatureName) -> bool {
        self.imputed[name.index()]
    }

    /// Names of imputed features, in vector order
    pub fn imputed_features(&self) -> Vec<&'static str> {
        FeatureName::ALL
            .iter()
            .filter(|f| self.imputed.get(f.index()).copied().unwrap_or(false))
            .map(|f| f.as_str())
            .collect()
    }

    /// Length matches [`FEATURE_DIMENSION`] for both values and flags
    pub fn has_valid_shape(&self) -> bool {
        self.values.len() == FEATURE_DIMENSION && self.imputed.len() == FEATURE_DIMENSION
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            values: vec![0.0; FEATURE_DIMENSION],
            imputed: vec![false; FEATURE_DIMENSION],
        }
    }
}

/// Builder that writes features by name so the order lives in one place
struct FeatureWriter {
    vector: FeatureVector,
}

impl FeatureWriter {
    fn new() -> Self {
        Self {
            vector: FeatureVector::default(),
        }
    }

    fn set(&mut self, name: FeatureName, value: f64) {
        let (min, max) = name.range();
        self.vector.values[name.index()] = value.clamp(min, max);
    }

    /// Stored as configured; defaults are range-checked at load
    fn set_imputed(&mut self, name: FeatureName, value: f64) {
        self.vector.values[name.index()] = value;
        self.vector.imputed[name.index()] = true;
    }

    /// Use the observed signal when usable, otherwise the imputation default
    fn set_or_impute(&mut self, name: FeatureName, observed: Option<f64>, default: f64) {
        match observed.filter(|v| v.is_finite() && *v >= 0.0) {
            Some(value) => self.set(name, value),
            None => self.set_imputed(name, default),
        }
    }

    fn finish(self) -> FeatureVector {
        self.vector
    }
}

/// Feature extractor that turns transactions into model input features.
///
/// Extraction performs no I/O: all history comes from the record.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    validator: Validator,
    imputation: ImputationDefaults,
}

impl FeatureExtractor {
    /// Create a new feature extractor.
    ///
    /// `imputation` is expected to pass [`ImputationDefaults::validate`].
    pub fn new(validator: Validator, imputation: ImputationDefaults) -> Self {
        Self {
            validator,
            imputation,
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate a raw record and extract its features against the wall clock
    pub fn extract(&self, record: &TransactionRecord) -> Result<FeatureVector, ValidationError> {
        let transaction = self.validator.validate(record)?;
        Ok(self.extract_validated(&transaction))
    }

    /// Extract features from an already validated transaction
    pub fn extract_validated(&self, tx: &Transaction) -> FeatureVector {
        let mut writer = FeatureWriter::new();
        let defaults = &self.imputation;

        writer.set(FeatureName::Amount, tx.amount);
        writer.set(FeatureName::Hour, tx.timestamp.hour() as f64);
        writer.set(
            FeatureName::DayOfWeek,
            tx.timestamp.weekday().num_days_from_monday() as f64,
        );
        writer.set(FeatureName::FailedAttempts, tx.failed_attempts as f64);

        let unusual_location = signals::is_listed_location(&tx.location, HIGH_RISK_LOCATIONS);
        writer.set(FeatureName::UnusualLocation, flag(unusual_location));

        let device_texts = [
            tx.device_fingerprint.as_str(),
            tx.user_agent.as_deref().unwrap_or_default(),
        ];
        let device_risk = !signals::find_markers(&device_texts, RISKY_DEVICE_MARKERS).is_empty();
        writer.set(FeatureName::DeviceRisk, flag(device_risk));

        let history = tx.history.as_ref();
        writer.set_or_impute(
            FeatureName::AmountVelocity1h,
            history.map(|h| h.amount_1h),
            defaults.amount_velocity_1h,
        );
        writer.set_or_impute(
            FeatureName::AmountVelocity24h,
            history.map(|h| h.amount_24h),
            defaults.amount_velocity_24h,
        );
        writer.set_or_impute(
            FeatureName::TxCount1h,
            history.map(|h| h.tx_count_1h as f64),
            defaults.tx_count_1h,
        );
        writer.set_or_impute(
            FeatureName::TxCount24h,
            history.map(|h| h.tx_count_24h as f64),
            defaults.tx_count_24h,
        );
        writer.set_or_impute(
            FeatureName::RecipientNew,
            tx.receiver_known().map(|known| flag(!known)),
            defaults.recipient_new,
        );

        let balance_ratio = tx.sender_balance.map(|balance| {
            if balance > 0.0 {
                (tx.amount / balance).min(1.0)
            } else {
                1.0
            }
        });
        writer.set_or_impute(
            FeatureName::SenderBalanceRatio,
            balance_ratio,
            defaults.sender_balance_ratio,
        );

        writer.set(
            FeatureName::RoundAmount,
            flag(signals::is_round_amount(tx.amount, 100.0, 100.0)),
        );

        let vector = writer.finish();
        debug!(
            transaction_id = %tx.transaction_id,
            imputed = ?vector.imputed_features(),
            "Extracted {} features",
            vector.values.len()
        );
        vector
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
