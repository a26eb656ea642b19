//! Raw Risk Signals
//!
//! Shared predicates over transaction attributes. The feature extractor turns
//! them into 0/1 features; the rule engine uses the same lists as defaults.

/// Location labels treated as high risk
pub const HIGH_RISK_LOCATIONS: &[&str] = &["Unknown", "High-Risk-Geo", "Tor-Exit-Node", "VPN-Detected"];

/// Device markers that raise the device risk feature
pub const RISKY_DEVICE_MARKERS: &[&str] = &["emulator", "rooted", "unknown"];

/// User-agent fragments typical of scripted clients
pub const AUTOMATION_MARKERS: &[&str] = &["bot", "headless", "automation", "emulator", "selenium", "phantom"];

/// Case-sensitive exact match against a location list
pub fn is_listed_location(location: &str, list: &[impl AsRef<str>]) -> bool {
    list.iter().any(|l| l.as_ref() == location)
}

/// Markers (lowercase) found in any of the given texts
pub fn find_markers<'a>(texts: &[&str], markers: &'a [impl AsRef<str>]) -> Vec<&'a str> {
    let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
    markers
        .iter()
        .map(|m| m.as_ref())
        .filter(|m| lowered.iter().any(|t| t.contains(&m.to_lowercase())))
        .collect()
}

/// Amount is at least `min` and a whole multiple of `unit`
pub fn is_round_amount(amount: f64, unit: f64, min: f64) -> bool {
    amount >= min && unit > 0.0 && (amount % unit) == 0.0
}
