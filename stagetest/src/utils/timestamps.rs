//! Timestamp helpers for events and failure records.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
///
/// # Examples
///
/// ```
/// use stagetest::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds elapsed since `start`.
#[must_use]
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
