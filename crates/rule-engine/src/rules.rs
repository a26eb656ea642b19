//! Rule Predicates

use crate::error::RuleEvaluationError;
use chrono::Datelike;
use feature_engine::signals;
use feature_engine::{FeatureName, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use transaction_validator::Transaction;

/// Stable rule identifier; output is ordered by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u16);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{:03}", self.0)
    }
}

/// Deterministic boolean fraud heuristic.
///
/// Implementations must be pure: same inputs, same answer, no shared state.
pub trait RulePredicate: Send + Sync {
    fn matches(&self, tx: &Transaction, features: &FeatureVector) -> Result<bool, RuleEvaluationError>;
}

/// Reference amount for spike detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeBasis {
    #[default]
    Average,
    Maximum,
}

/// Built-in predicates, parameterized from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Amount above a fixed limit
    LargeAmount { limit: f64 },
    /// Amount in `(above, up_to]`
    ElevatedAmount { above: f64, up_to: f64 },
    /// Round-number structuring pattern
    RoundAmount { unit: f64, min_amount: f64 },
    /// Card-testing micro payment
    MicroTransaction { below: f64 },
    HighRiskLocation { locations: Vec<String> },
    /// Automation or emulator markers on the device
    SuspiciousDevice { markers: Vec<String> },
    FailedAttempts { min_attempts: u32 },
    TransactionVelocity { max_count_24h: u32 },
    AmountVelocity { max_amount_24h: f64 },
    /// Trailing-hour count, this transaction included
    HourlyTransactionVelocity { max_count_1h: u32 },
    /// Trailing-hour amount, this transaction included
    HourlyAmountVelocity { max_amount_1h: f64 },
    /// Distinct receivers paid in the trailing 24 hours
    UniqueRecipients { max_unique_24h: u32 },
    /// Burst of small payments among the sender's most recent ones
    CardTesting {
        small_below: f64,
        min_count: u32,
        window: usize,
    },
    /// Amount above `multiplier` times the sender's average or maximum
    AmountSpike {
        multiplier: f64,
        #[serde(default)]
        basis: SpikeBasis,
    },
    NewAccount { min_age_days: u32 },
    /// Account age in `[min_age_days, max_age_days)`
    RecentAccount { min_age_days: u32, max_age_days: u32 },
    /// UTC hour in `[start_hour, end_hour)`
    UnusualHour { start_hour: u32, end_hour: u32 },
    NewReceiverHighValue { min_amount: f64 },
    /// Geolocation jump faster than plausible travel
    ImpossibleTravel { max_speed_kmh: f64 },
    Blacklisted {
        #[serde(default)]
        accounts: BTreeSet<String>,
        #[serde(default)]
        devices: BTreeSet<String>,
    },
    WeekendActivity,
}

impl RuleKind {
    /// Default display name
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::LargeAmount { .. } => "large_amount",
            RuleKind::ElevatedAmount { .. } => "elevated_amount",
            RuleKind::RoundAmount { .. } => "round_amount",
            RuleKind::MicroTransaction { .. } => "micro_transaction",
            RuleKind::HighRiskLocation { .. } => "high_risk_location",
            RuleKind::SuspiciousDevice { .. } => "suspicious_device",
            RuleKind::FailedAttempts { .. } => "failed_attempts",
            RuleKind::TransactionVelocity { .. } => "transaction_velocity",
            RuleKind::AmountVelocity { .. } => "amount_velocity",
            RuleKind::HourlyTransactionVelocity { .. } => "hourly_transaction_velocity",
            RuleKind::HourlyAmountVelocity { .. } => "hourly_amount_velocity",
            RuleKind::UniqueRecipients { .. } => "unique_recipients",
            RuleKind::CardTesting { .. } => "card_testing",
            RuleKind::AmountSpike { .. } => "amount_spike",
            RuleKind::NewAccount { .. } => "new_account",
            RuleKind::RecentAccount { .. } => "recent_account",
            RuleKind::UnusualHour { .. } => "unusual_hour",
            RuleKind::NewReceiverHighValue { .. } => "new_receiver_high_value",
            RuleKind::ImpossibleTravel { .. } => "impossible_travel",
            RuleKind::Blacklisted { .. } => "blacklisted",
            RuleKind::WeekendActivity => "weekend_activity",
        }
    }

    /// Check parameters at load time
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(format!("{} must be a positive number, got {}", name, v))
            }
        };

        match self {
            RuleKind::LargeAmount { limit } => positive("limit", *limit),
            RuleKind::ElevatedAmount { above, up_to } => {
                positive("above", *above)?;
                positive("up_to", *up_to)?;
                if above < up_to {
                    Ok(())
                } else {
                    Err(format!("amount band ({}, {}] is empty", above, up_to))
                }
            }
            RuleKind::RoundAmount { unit, min_amount } => {
                positive("unit", *unit)?;
                positive("min_amount", *min_amount)
            }
            RuleKind::MicroTransaction { below } => positive("below", *below),
            RuleKind::AmountVelocity { max_amount_24h } => positive("max_amount_24h", *max_amount_24h),
            RuleKind::HourlyAmountVelocity { max_amount_1h } => positive("max_amount_1h", *max_amount_1h),
            RuleKind::CardTesting {
                small_below,
                min_count,
                window,
            } => {
                positive("small_below", *small_below)?;
                if *min_count == 0 || *min_count as usize > *window {
                    Err(format!("min_count {} must be in 1..={}", min_count, window))
                } else {
                    Ok(())
                }
            }
            RuleKind::RecentAccount {
                min_age_days,
                max_age_days,
            } => {
                if min_age_days < max_age_days {
                    Ok(())
                } else {
                    Err(format!("age window [{}, {}) is empty", min_age_days, max_age_days))
                }
            }
            RuleKind::AmountSpike { multiplier, .. } => positive("multiplier", *multiplier),
            RuleKind::NewReceiverHighValue { min_amount } => positive("min_amount", *min_amount),
            RuleKind::ImpossibleTravel { max_speed_kmh } => positive("max_speed_kmh", *max_speed_kmh),
            RuleKind::UnusualHour { start_hour, end_hour } => {
                if start_hour < end_hour && *end_hour <= 24 {
                    Ok(())
                } else {
                    Err(format!("hour window [{}, {}) is empty or beyond 24", start_hour, end_hour))
                }
            }
            RuleKind::HighRiskLocation { .. }
            | RuleKind::SuspiciousDevice { .. }
            | RuleKind::FailedAttempts { .. }
            | RuleKind::TransactionVelocity { .. }
            | RuleKind::HourlyTransactionVelocity { .. }
            | RuleKind::UniqueRecipients { .. }
            | RuleKind::NewAccount { .. }
            | RuleKind::Blacklisted { .. }
            | RuleKind::WeekendActivity => Ok(()),
        }
    }
}

impl RulePredicate for RuleKind {
    fn matches(&self, tx: &Transaction, features: &FeatureVector) -> Result<bool, RuleEvaluationError> {
        let history = tx.history.as_ref();

        match self {
            RuleKind::LargeAmount { limit } => Ok(tx.amount > *limit),

            RuleKind::ElevatedAmount { above, up_to } => Ok(tx.amount > *above && tx.amount <= *up_to),

            RuleKind::RoundAmount { unit, min_amount } => {
                Ok(signals::is_round_amount(tx.amount, *unit, *min_amount))
            }

            RuleKind::MicroTransaction { below } => Ok(tx.amount < *below),

            RuleKind::HighRiskLocation { locations } => {
                Ok(signals::is_listed_location(&tx.location, locations))
            }

            RuleKind::SuspiciousDevice { markers } => {
                let texts = [
                    tx.device_fingerprint.as_str(),
                    tx.user_agent.as_deref().unwrap_or_default(),
                ];
                Ok(!signals::find_markers(&texts, markers).is_empty())
            }

            RuleKind::FailedAttempts { min_attempts } => Ok(tx.failed_attempts >= *min_attempts),

            RuleKind::TransactionVelocity { max_count_24h } => {
                Ok(history.is_some_and(|h| h.tx_count_24h > *max_count_24h))
            }

            RuleKind::AmountVelocity { max_amount_24h } => match history {
                None => Ok(false),
                Some(h) => {
                    let recent = checked_amount("amount_24h", h.amount_24h)?;
                    Ok(recent + tx.amount > *max_amount_24h)
                }
            },

            RuleKind::HourlyTransactionVelocity { max_count_1h } => {
                Ok(history.is_some_and(|h| h.tx_count_1h.saturating_add(1) > *max_count_1h))
            }

            RuleKind::HourlyAmountVelocity { max_amount_1h } => match history {
                None => Ok(false),
                Some(h) => {
                    let recent = checked_amount("amount_1h", h.amount_1h)?;
                    Ok(recent + tx.amount > *max_amount_1h)
                }
            },

            RuleKind::UniqueRecipients { max_unique_24h } => {
                Ok(history.is_some_and(|h| h.unique_receivers_24h > *max_unique_24h))
            }

            RuleKind::CardTesting {
                small_below,
                min_count,
                window,
            } => {
                let Some(h) = history else {
                    return Ok(false);
                };
                let recent = &h.recent_amounts[h.recent_amounts.len().saturating_sub(*window)..];
                let mut small = 0u32;
                for amount in recent {
                    if checked_amount("recent_amounts", *amount)? < *small_below {
                        small += 1;
                    }
                }
                Ok(small >= *min_count)
            }

            RuleKind::AmountSpike { multiplier, basis } => {
                let reference = history.and_then(|h| match basis {
                    SpikeBasis::Average => h.avg_amount,
                    SpikeBasis::Maximum => h.max_amount,
                });
                match reference {
                    None => Ok(false),
                    Some(value) => {
                        let signal = match basis {
                            SpikeBasis::Average => "avg_amount",
                            SpikeBasis::Maximum => "max_amount",
                        };
                        let reference = checked_amount(signal, value)?;
                        if reference == 0.0 {
                            return Err(RuleEvaluationError::InvalidSignal {
                                signal,
                                reason: "reference amount is zero".to_string(),
                            });
                        }
                        Ok(tx.amount > reference * multiplier)
                    }
                }
            }

            RuleKind::NewAccount { min_age_days } => Ok(history
                .and_then(|h| h.account_age_days)
                .is_some_and(|age| age < *min_age_days)),

            RuleKind::RecentAccount {
                min_age_days,
                max_age_days,
            } => Ok(history
                .and_then(|h| h.account_age_days)
                .is_some_and(|age| age >= *min_age_days && age < *max_age_days)),

            RuleKind::UnusualHour { start_hour, end_hour } => {
                let hour = features.get(FeatureName::Hour);
                Ok(hour >= *start_hour as f64 && hour < *end_hour as f64)
            }

            RuleKind::NewReceiverHighValue { min_amount } => {
                Ok(tx.receiver_known() == Some(false) && tx.amount > *min_amount)
            }

            RuleKind::ImpossibleTravel { max_speed_kmh } => impossible_travel(tx, *max_speed_kmh),

            RuleKind::Blacklisted { accounts, devices } => Ok(accounts.contains(&tx.sender_id)
                || accounts.contains(&tx.receiver_id)
                || devices.contains(&tx.device_fingerprint)),

            RuleKind::WeekendActivity => {
                let weekday = tx.timestamp.weekday().num_days_from_monday();
                Ok(weekday >= 5)
            }
        }
    }
}

fn checked_amount(signal: &'static str, value: f64) -> Result<f64, RuleEvaluationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(RuleEvaluationError::InvalidSignal {
            signal,
            reason: format!("expected a non-negative amount, got {}", value),
        })
    }
}

fn impossible_travel(tx: &Transaction, max_speed_kmh: f64) -> Result<bool, RuleEvaluationError> {
    let Some(current) = tx.geo else {
        return Ok(false);
    };
    let Some(history) = tx.history.as_ref() else {
        return Ok(false);
    };
    let (Some(previous), Some(last_seen)) = (history.last_geo, history.last_seen_at) else {
        return Ok(false);
    };

    if !previous.is_valid() {
        return Err(RuleEvaluationError::InvalidSignal {
            signal: "last_geo",
            reason: format!("coordinates ({}, {}) are not on the globe", previous.lat, previous.lon),
        });
    }

    let elapsed_secs = (tx.timestamp - last_seen).num_seconds();
    if elapsed_secs < 0 {
        return Err(RuleEvaluationError::InvalidSignal {
            signal: "last_seen_at",
            reason: format!("previous transaction is {}s after this one", -elapsed_secs),
        });
    }

    let distance_km = current.distance_km(&previous);
    if elapsed_secs == 0 {
        // Same instant, different place
        return Ok(distance_km > 1.0);
    }

    let speed_kmh = distance_km / (elapsed_secs as f64 / 3600.0);
    Ok(speed_kmh > max_speed_kmh)
}

/// Rule ready for evaluation
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    /// Severity points; 100 points = 1.0
    pub weight: u32,
    pub predicate: Box<dyn RulePredicate>,
}

impl Rule {
    pub fn new(id: RuleId, name: impl Into<String>, weight: u32, predicate: Box<dyn RulePredicate>) -> Self {
        Self {
            id,
            name: name.into(),
            weight,
            predicate,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}
