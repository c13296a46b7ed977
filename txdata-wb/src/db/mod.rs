//! Database repositories
//!
//! Plain async functions over a `SqlitePool`. Timestamps are stored as
//! RFC 3339 UTC strings so they sort lexicographically.

pub mod encoders;
pub mod sessions;
pub mod studies;
pub mod tutorials;
pub mod users;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamp text as stored in the database
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time as stored in the database
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}
