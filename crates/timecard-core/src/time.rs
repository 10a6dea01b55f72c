//! Timestamp parsing and spreadsheet date serials

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, TimeZone};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid timestamp {value:?}: {reason}")]
pub struct TimestampError {
    pub value: String,
    pub reason: String,
}

/// 1899-12-30T00:00:00Z as milliseconds since the Unix epoch
const SERIAL_EPOCH_UNIX_MILLIS: i64 = -2_209_161_600_000;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parse an RFC 3339 date-time, keeping its offset.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
    DateTime::parse_from_rfc3339(value).map_err(|e| TimestampError {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Calendar day of a timestamp, taken in the timestamp's own offset
pub fn calendar_day(t: &DateTime<FixedOffset>) -> NaiveDate {
    t.date_naive()
}

/// The timestamp `days` calendar days after `start`, in `start`'s offset
pub fn add_days(start: &DateTime<FixedOffset>, days: u32) -> DateTime<FixedOffset> {
    *start + TimeDelta::days(i64::from(days))
}

/// Days elapsed since 1899-12-30T00:00:00Z, the spreadsheet serial epoch.
///
/// Fractional days are kept, so a local midnight east or west of UTC lands
/// on a non-integral serial.
pub fn date_serial<Tz: TimeZone>(t: &DateTime<Tz>) -> f64 {
    (t.timestamp_millis() - SERIAL_EPOCH_UNIX_MILLIS) as f64 / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn serial_epoch_is_zero() {
        assert_eq!(date_serial(&ts("1899-12-30T00:00:00Z")), 0.0);
    }

    #[test]
    fn serial_first_of_1900_is_two() {
        assert_eq!(date_serial(&ts("1900-01-01T00:00:00Z")), 2.0);
    }

    #[test]
    fn serial_modern_date() {
        // 2025-01-06 is serial 45663 in the 1900 date system
        assert_eq!(date_serial(&ts("2025-01-06T00:00:00Z")), 45663.0);
        assert_eq!(date_serial(&ts("2025-01-06T12:00:00Z")), 45663.5);
    }

    #[test]
    fn serial_respects_offset() {
        let serial = date_serial(&ts("2025-01-06T00:00:00-06:00"));
        assert_eq!(serial, 45663.25);
    }

    #[test]
    fn calendar_day_uses_own_offset() {
        let t = ts("2025-01-06T23:00:00-05:00");
        assert_eq!(calendar_day(&t), NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
    }

    #[test]
    fn add_days_keeps_offset() {
        let start = ts("2025-01-06T00:00:00-05:00");
        let sunday = add_days(&start, 6);
        assert_eq!(calendar_day(&sunday), NaiveDate::from_ymd_opt(2025, 1, 12).unwrap());
        assert_eq!(sunday.offset(), start.offset());
    }

    #[test]
    fn rejects_date_only() {
        let err = parse_timestamp("2025-01-06").unwrap_err();
        assert_eq!(err.value, "2025-01-06");
    }
}
