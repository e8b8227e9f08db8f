//! Millisecond-epoch timestamp helpers.
//!
//! Storage and transport use millisecond epoch integers; in-process code uses
//! `DateTime<Utc>` and converts at the edges.

use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds since the Unix epoch.
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Convert milliseconds since the Unix epoch back to a UTC instant.
///
/// Out-of-range values clamp to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Current time truncated to millisecond precision (what storage round-trips).
pub fn now_millis() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}
