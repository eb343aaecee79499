use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Parses a UTC ISO-8601 timestamp as written by the assistant logs.
///
/// Accepts RFC 3339 (`Z` suffix or explicit offset, optional fractional
/// seconds) and offset-less `YYYY-MM-DDTHH:MM:SS[.fff]`, which is read as UTC.
/// Empty or unparsable input yields `None`.
pub fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc));
        }
    }
    None
}

/// Converts a UTC timestamp into the process-local timezone as of this call.
pub fn normalize_to_local(raw: &str) -> Option<DateTime<FixedOffset>> {
    normalize_to_zone(raw, &Local)
}

pub fn normalize_to_zone<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    let utc = parse_utc_timestamp(raw)?;
    Some(utc.with_timezone(tz).fixed_offset())
}

pub fn date_key<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day())
}

/// Local-time hour bucket used as the key of hourly aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HourBucket {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl HourBucket {
    pub fn from_local<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
        }
    }

    pub fn date(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Parses the `YYYY-MM-DD HH:00:00` form produced by `Display`.
    pub fn parse(value: &str) -> Option<Self> {
        let parsed = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok()?;
        if parsed.minute() != 0 || parsed.second() != 0 {
            return None;
        }
        Some(Self {
            year: parsed.year(),
            month: parsed.month(),
            day: parsed.day(),
            hour: parsed.hour(),
        })
    }
}

impl fmt::Display for HourBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:00:00",
            self.year, self.month, self.day, self.hour
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zulu_with_fraction() {
        let parsed = parse_utc_timestamp("2025-11-27T02:09:11.551Z").expect("timestamp");
        assert_eq!(parsed.to_rfc3339(), "2025-11-27T02:09:11.551+00:00");
    }

    #[test]
    fn offset_less_timestamp_is_utc() {
        let parsed = parse_utc_timestamp("2025-06-01T10:00:00").expect("timestamp");
        assert_eq!(parsed.hour(), 10);
    }

    #[test]
    fn empty_or_garbage_is_none() {
        assert!(parse_utc_timestamp("").is_none());
        assert!(parse_utc_timestamp("   ").is_none());
        assert!(parse_utc_timestamp("yesterday").is_none());
        assert!(normalize_to_local("not a time").is_none());
    }

    #[test]
    fn normalizes_into_requested_zone() {
        let plus_two = FixedOffset::east_opt(2 * 3600).expect("offset");
        let local = normalize_to_zone("2025-12-31T23:30:00Z", &plus_two).expect("local");
        assert_eq!(date_key(&local), "2026-01-01");
        let bucket = HourBucket::from_local(&local);
        assert_eq!(bucket.to_string(), "2026-01-01 01:00:00");
        assert_eq!(bucket.year, 2026);
    }

    #[test]
    fn hour_bucket_display_roundtrips() {
        let bucket = HourBucket {
            year: 2025,
            month: 3,
            day: 9,
            hour: 7,
        };
        assert_eq!(HourBucket::parse(&bucket.to_string()), Some(bucket));
        assert_eq!(bucket.date(), "2025-03-09");
        assert!(HourBucket::parse("2025-03-09 07:30:00").is_none());
    }
}
