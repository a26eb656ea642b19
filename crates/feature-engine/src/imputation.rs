//! Imputation Defaults

use crate::features::FeatureName;
use serde::{Deserialize, Serialize};

/// Values substituted when a historical signal is unavailable.
///
/// Defaults are the population means of the training distribution. An imputed
/// feature is flagged on the vector but keeps exactly this value, so every
/// default must already lie in its feature's documented range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationDefaults {
    pub amount_velocity_1h: f64,
    pub amount_velocity_24h: f64,
    pub tx_count_1h: f64,
    pub tx_count_24h: f64,
    /// Unknown receiver history counts as a new receiver
    pub recipient_new: f64,
    pub sender_balance_ratio: f64,
}

impl Default for ImputationDefaults {
    fn default() -> Self {
        Self {
            amount_velocity_1h: 50.0,
            amount_velocity_24h: 200.0,
            tx_count_1h: 1.0,
            tx_count_24h: 5.0,
            recipient_new: 1.0,
            sender_balance_ratio: 0.15,
        }
    }
}

impl ImputationDefaults {
    /// Each default paired with the feature it stands in for
    pub fn entries(&self) -> [(FeatureName, f64); 6] {
        [
            (FeatureName::AmountVelocity1h, self.amount_velocity_1h),
            (FeatureName::AmountVelocity24h, self.amount_velocity_24h),
            (FeatureName::TxCount1h, self.tx_count_1h),
            (FeatureName::TxCount24h, self.tx_count_24h),
            (FeatureName::RecipientNew, self.recipient_new),
            (FeatureName::SenderBalanceRatio, self.sender_balance_ratio),
        ]
    }

    /// Reject defaults that are not finite or fall outside the feature range
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in self.entries() {
            let (min, max) = name.range();
            if !value.is_finite() || value < min || value > max {
                return Err(format!(
                    "imputation.{} must be within [{}, {}], got {}",
                    name.as_str(),
                    min,
                    max,
                    value
                ));
            }
        }
        Ok(())
    }
}
