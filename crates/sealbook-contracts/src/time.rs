//! Timestamp formatting shared by every sealed record.
//!
//! Timestamps are stored as RFC 3339 UTC strings with exactly three
//! fractional digits.  The fixed width makes lexical order equal to
//! chronological order, which the period queries rely on.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};

use crate::error::{SealError, SealResult};

/// `2024-01-31T23:59:59.999Z`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// `2024-01-31`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> SealResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SealError::Serialization {
            reason: format!("invalid timestamp '{s}': {e}"),
        })
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> SealResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| SealError::Serialization {
        reason: format!("invalid date '{s}': {e}"),
    })
}

/// Current time truncated to the millisecond precision we store.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// `date` at 00:00:00.000 UTC.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// `date` at 23:59:59.999 UTC.
pub fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::milliseconds(1)
}
