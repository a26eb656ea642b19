//! Rule Set Configuration

use crate::error::RuleConfigError;
use crate::rules::{RuleId, RuleKind, SpikeBasis};
use feature_engine::signals;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// One entry of the rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: RuleId,
    /// Display name, defaults to the predicate kind
    #[serde(default)]
    pub name: Option<String>,
    /// Severity points
    pub weight: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub predicate: RuleKind,
}

fn default_enabled() -> bool {
    true
}

impl RuleDefinition {
    fn new(id: u16, weight: u32, predicate: RuleKind) -> Self {
        Self {
            id: RuleId(id),
            name: None,
            weight,
            enabled: true,
            predicate,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.predicate.name())
    }
}

/// Versioned rule table with its normalization constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    pub version: String,
    /// Fixed denominator in severity points
    pub normalization: u32,
    pub rules: Vec<RuleDefinition>,
}

impl Default for RuleSetConfig {
    fn default() -> Self {
        let strings = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            version: "rules-v2".to_string(),
            normalization: 515,
            rules: vec![
                RuleDefinition::new(1, 35, RuleKind::LargeAmount { limit: 5000.0 }),
                RuleDefinition::new(2, 25, RuleKind::RoundAmount { unit: 100.0, min_amount: 500.0 }),
                RuleDefinition::new(3, 40, RuleKind::MicroTransaction { below: 1.0 }),
                RuleDefinition::new(
                    4,
                    30,
                    RuleKind::HighRiskLocation {
                        locations: strings(signals::HIGH_RISK_LOCATIONS),
                    },
                ),
                RuleDefinition::new(
                    5,
                    30,
                    RuleKind::SuspiciousDevice {
                        markers: strings(signals::AUTOMATION_MARKERS),
                    },
                ),
                RuleDefinition::new(6, 20, RuleKind::FailedAttempts { min_attempts: 2 }),
                RuleDefinition::new(7, 25, RuleKind::TransactionVelocity { max_count_24h: 5 }),
                RuleDefinition::new(8, 20, RuleKind::AmountVelocity { max_amount_24h: 10_000.0 }),
                RuleDefinition::new(
                    9,
                    15,
                    RuleKind::AmountSpike {
                        multiplier: 3.0,
                        basis: SpikeBasis::Average,
                    },
                ),
                RuleDefinition::new(10, 20, RuleKind::NewAccount { min_age_days: 7 }),
                RuleDefinition::new(11, 15, RuleKind::UnusualHour { start_hour: 0, end_hour: 6 }),
                RuleDefinition::new(12, 20, RuleKind::NewReceiverHighValue { min_amount: 1000.0 }),
                RuleDefinition::new(13, 30, RuleKind::ImpossibleTravel { max_speed_kmh: 900.0 }),
                RuleDefinition::new(
                    14,
                    50,
                    RuleKind::Blacklisted {
                        accounts: BTreeSet::new(),
                        devices: BTreeSet::new(),
                    },
                ),
                RuleDefinition::new(15, 5, RuleKind::WeekendActivity),
                RuleDefinition::new(16, 20, RuleKind::ElevatedAmount { above: 1000.0, up_to: 5000.0 }),
                RuleDefinition::new(
                    17,
                    10,
                    RuleKind::RecentAccount {
                        min_age_days: 7,
                        max_age_days: 30,
                    },
                ),
                RuleDefinition::new(18, 25, RuleKind::HourlyTransactionVelocity { max_count_1h: 10 }),
                RuleDefinition::new(19, 20, RuleKind::HourlyAmountVelocity { max_amount_1h: 5000.0 }),
                RuleDefinition::new(20, 20, RuleKind::UniqueRecipients { max_unique_24h: 20 }),
                RuleDefinition::new(
                    21,
                    40,
                    RuleKind::CardTesting {
                        small_below: 10.0,
                        min_count: 5,
                        window: 20,
                    },
                ),
            ],
        }
    }
}

impl RuleSetConfig {
    /// Enabled entries only
    pub fn enabled_rules(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Sum of enabled weights in severity points
    pub fn enabled_weight(&self) -> u64 {
        self.enabled_rules().map(|r| u64::from(r.weight)).sum()
    }

    /// Reject tables that would produce scores outside [0, 1]
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        if self.normalization == 0 {
            return Err(RuleConfigError::ZeroNormalization);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id) {
                return Err(RuleConfigError::DuplicateId(rule.id));
            }
            rule.predicate
                .validate()
                .map_err(|reason| RuleConfigError::InvalidParameter { id: rule.id, reason })?;
        }

        let total = self.enabled_weight();
        if total > u64::from(self.normalization) {
            return Err(RuleConfigError::WeightsExceedNormalization {
                total,
                normalization: self.normalization,
            });
        }
        Ok(())
    }
}
