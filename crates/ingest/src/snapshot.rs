use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, SecondsFormat};
use chrono_tz::Tz;
use regex::Regex;
use serde_json::Value;
use usage_core::UsageSnapshot;

use crate::limits::{month_number, to_24_hour, wall_clock};
use crate::types::SnapshotError;

const UNKNOWN_EMAIL: &str = "unknown";

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").expect("valid percent regex"));

static WEEK_RESET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^([a-z]{3,9})\.? (\d{1,2}),(?:\s*(\d{4}),)?\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)(?:\s*\(([^)]+)\))?$",
    )
    .expect("valid week reset regex")
});

fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn nested_text(root: &Value, section: &str, key: &str) -> Option<String> {
    root.get(section)
        .and_then(|section| section.get(key))
        .and_then(text_field)
}

/// First `NN%` (or bare number) in the scraped text.
pub fn parse_used_percent(raw: &str) -> Option<f64> {
    if let Some(caps) = PERCENT.captures(raw) {
        return caps.get(1)?.as_str().parse().ok();
    }
    raw.trim().parse().ok()
}

/// Parses `Mon D, YYYY, H[:MM]am` or `Mon D, H[:MM]am`, optionally followed by
/// a parenthesized zone name. Without a year the reset lies at or after `now`.
pub fn parse_week_reset(raw: &str, now: &DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let caps = WEEK_RESET.captures(raw.trim())?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let explicit_year: Option<i32> = match caps.get(3) {
        Some(year) => Some(year.as_str().parse().ok()?),
        None => None,
    };
    let hour = to_24_hour(caps.get(4)?.as_str().parse().ok()?, caps.get(6)?.as_str())?;
    let minute: u32 = caps
        .get(5)
        .map_or(Some(0), |value| value.as_str().parse().ok())?;
    if minute > 59 {
        return None;
    }
    let zone = caps
        .get(7)
        .and_then(|name| name.as_str().trim().parse::<Tz>().ok());

    let resolve = |year: i32| -> Option<DateTime<FixedOffset>> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        match zone {
            Some(zone) => wall_clock(&zone, date, hour, minute).map(|dt| dt.fixed_offset()),
            None => wall_clock(&now.timezone(), date, hour, minute),
        }
    };

    match explicit_year {
        Some(year) => resolve(year),
        None => {
            let this_year = resolve(now.year());
            match this_year {
                Some(candidate) if candidate >= *now => Some(candidate),
                _ => resolve(now.year() + 1),
            }
        }
    }
}

/// Parses one scraper payload captured at `now`. Anything but a JSON object is
/// rejected; missing fields stay empty.
pub fn parse_snapshot(raw: &str, now: DateTime<FixedOffset>) -> Result<UsageSnapshot, SnapshotError> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(SnapshotError::NotAnObject);
    }
    let session_used = nested_text(&value, "current_session", "used");
    let week_used = nested_text(&value, "current_week_all_models", "used");
    let week_resets = nested_text(&value, "current_week_all_models", "resets");
    let week_reset_at = week_resets
        .as_deref()
        .and_then(|text| parse_week_reset(text, &now))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false));
    Ok(UsageSnapshot {
        email: value
            .get("email")
            .and_then(text_field)
            .unwrap_or_else(|| UNKNOWN_EMAIL.to_string()),
        logfile: value.get("logfile").and_then(text_field),
        session_used_pct: session_used.as_deref().and_then(parse_used_percent),
        session_resets: nested_text(&value, "current_session", "resets"),
        week_used_pct: week_used.as_deref().and_then(parse_used_percent),
        week_resets,
        week_reset_at,
        captured_at: now.to_rfc3339_opts(SecondsFormat::Secs, false),
    })
}
