//! Timestamp handling shared by the client store and the server.
//!
//! Record timestamps are millisecond-precision UTC. They are stored as Unix
//! milliseconds and travel as RFC 3339 strings, so truncating to whole
//! milliseconds keeps both representations exact.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Current time, truncated to milliseconds.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now)
}

/// The zero watermark: a device that never synced.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Out-of-range values clamp to the epoch.
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(epoch)
}
