//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Days per year used for age-based decay (accounts for leap years)
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Age of `timestamp` relative to `reference`, in fractional days
///
/// Timestamps in the future relative to `reference` have age 0.
pub fn age_days(timestamp: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
    let seconds = (reference - timestamp).num_seconds();
    if seconds <= 0 {
        0.0
    } else {
        seconds as f64 / 86_400.0
    }
}

/// Age of `timestamp` relative to `reference`, in fractional years
pub fn age_years(timestamp: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
    age_days(timestamp, reference) / DAYS_PER_YEAR
}
