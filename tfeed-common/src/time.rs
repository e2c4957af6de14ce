//! Timestamp utilities

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current time as an ISO-8601 string (UTC, millisecond precision)
pub fn now_iso() -> String {
    to_iso(now())
}

/// Format a UTC timestamp as ISO-8601 with millisecond precision
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Ledger sort key for a millisecond timestamp
///
/// Zero-padded to 13 digits so lexical order matches numeric order.
pub fn sort_key(millis: i64) -> String {
    format!("{:013}", millis.max(0))
}

/// Parse an event timestamp
///
/// Accepts RFC 3339 and the offset-less ISO form (`2025-06-01T21:15:00.123456`)
/// that some producers emit; the latter is taken as UTC.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::<FixedOffset>::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
