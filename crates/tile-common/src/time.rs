//! Timestep identity and UTC time helpers.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A discrete forecast valid-time instant, keyed by its UTC `YYYY-MM-DDTHHMM`
/// string. Lexicographic string order matches chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestep(String);

/// Errors constructing or parsing a [`Timestep`].
#[derive(Debug, thiserror::Error)]
pub enum TimestepError {
    #[error("timestep string '{0}' does not match YYYY-MM-DDTHHMM")]
    InvalidFormat(String),
}

impl Timestep {
    /// Build a timestep string from a UTC instant, truncating to the minute.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.format("%Y-%m-%dT%H%M").to_string())
    }

    /// Parse a previously formatted timestep string, validating its shape.
    pub fn parse(s: &str) -> Result<Self, TimestepError> {
        if NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H%M").is_err() {
            return Err(TimestepError::InvalidFormat(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to a UTC `DateTime` for distance/eviction arithmetic.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let naive = NaiveDateTime::parse_from_str(&self.0, "%Y-%m-%dT%H%M")
            .expect("Timestep is constructed only via validated paths");
        Utc.from_utc_datetime(&naive)
    }

    /// Produce the timestep `hours` after this one.
    pub fn plus_hours(&self, hours: i64) -> Self {
        Self::from_datetime(self.to_datetime() + Duration::hours(hours))
    }
}

impl std::fmt::Display for Timestep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for Timestep {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestep {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// Absolute distance between a timestep and a reference instant.
pub fn distance(ts: &Timestep, reference: DateTime<Utc>) -> Duration {
    let delta = ts.to_datetime() - reference;
    if delta < Duration::zero() {
        -delta
    } else {
        delta
    }
}

/// Whether a timestep lies at or after the reference instant.
pub fn is_future(ts: &Timestep, reference: DateTime<Utc>) -> bool {
    ts.to_datetime() >= reference
}
