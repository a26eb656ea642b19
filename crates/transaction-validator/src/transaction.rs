//! Transaction Data Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Mean Earth radius used for great-circle distances (km)
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Payment channel the transaction was submitted through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    Card,
    BankTransfer,
    Wallet,
    Upi,
    Other,
}

impl PaymentChannel {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::Card => "card",
            PaymentChannel::BankTransfer => "bank_transfer",
            PaymentChannel::Wallet => "wallet",
            PaymentChannel::Upi => "upi",
            PaymentChannel::Other => "other",
        }
    }
}

/// Geographic fix (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether the coordinates are finite and on the globe
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to another point (haversine, km)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Pre-computed sender aggregates supplied by the persistence layer.
///
/// The scoring core never queries storage; whatever the caller fetched is
/// what gets scored. Absent values stay at their defaults and are imputed
/// downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderHistory {
    /// Sender transactions in the trailing hour
    pub tx_count_1h: u32,
    /// Sender transactions in the trailing 24 hours
    pub tx_count_24h: u32,
    /// Total amount sent in the trailing hour
    pub amount_1h: f64,
    /// Total amount sent in the trailing 24 hours
    pub amount_24h: f64,
    /// Distinct receivers paid in the trailing 24 hours
    pub unique_receivers_24h: u32,
    /// Most recent transaction amounts, oldest first
    pub recent_amounts: Vec<f64>,
    /// Rolling average transaction amount
    pub avg_amount: Option<f64>,
    /// Largest historical transaction amount
    pub max_amount: Option<f64>,
    /// Receivers the sender has paid before
    pub known_receivers: BTreeSet<String>,
    /// Days since the sender account was opened
    pub account_age_days: Option<u32>,
    /// Location of the sender's previous transaction
    pub last_geo: Option<GeoPoint>,
    /// Timestamp of the sender's previous transaction
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Transaction as received on the wire, before schema validation.
///
/// Every field is optional here so that an absent field can be reported by
/// name instead of failing deserialization wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: Option<String>,
    pub amount: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub channel: Option<PaymentChannel>,
    /// Location label (country, "VPN-Detected", "Tor-Exit-Node", ...)
    pub location: Option<String>,
    pub geo: Option<GeoPoint>,
    pub device_fingerprint: Option<String>,
    pub user_agent: Option<String>,
    /// Authentication failures preceding this submission
    pub failed_attempts: Option<u32>,
    pub sender_balance: Option<f64>,
    pub history: Option<SenderHistory>,
}

/// Validated, immutable transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub receiver_id: String,
    pub channel: PaymentChannel,
    pub location: String,
    pub geo: Option<GeoPoint>,
    pub device_fingerprint: String,
    pub user_agent: Option<String>,
    pub failed_attempts: u32,
    pub sender_balance: Option<f64>,
    pub history: Option<SenderHistory>,
}

impl Transaction {
    /// Whether the sender has paid this receiver before, if history is known
    pub fn receiver_known(&self) -> Option<bool> {
        self.history
            .as_ref()
            .map(|h| h.known_receivers.contains(&self.receiver_id))
    }
}
