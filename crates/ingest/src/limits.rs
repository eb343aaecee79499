use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use regex::Regex;
use usage_core::{LimitEvent, LimitType, date_key};

static RESET_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)resets [^∙·]+").expect("valid reset phrase regex"));

static HOUR_RESET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)resets (\d{1,2})(?::(\d{2}))?\s*(am|pm)(?:\s*\(([^)]+)\))?")
        .expect("valid hour reset regex")
});

static MONTH_DAY_RESET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)resets ([a-z]{3,9})\.? (\d{1,2}),?\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)(?:\s*\(([^)]+)\))?",
    )
    .expect("valid month/day reset regex")
});

const FALLBACK_RESET_HOURS: i64 = 24;

/// A limit event whose occurrence time is not yet known. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialLimitEvent {
    pub identity_key: String,
    pub limit_type: LimitType,
    pub reset_text: Option<String>,
    pub summary_text: Option<String>,
    pub session_id: Option<String>,
    pub source_file: String,
}

impl PartialLimitEvent {
    /// The only way to obtain a persistable [`LimitEvent`].
    ///
    /// `session_id` wins over the one carried by the partial record.
    pub fn complete<Z: TimeZone>(
        self,
        occurred_at: DateTime<Utc>,
        session_id: Option<String>,
        zone: &Z,
    ) -> LimitEvent {
        let occurred_at_local = occurred_at.with_timezone(zone).fixed_offset();
        let reset_at_local = parse_reset_time(&occurred_at_local, self.reset_text.as_deref());
        LimitEvent {
            identity_key: self.identity_key,
            limit_type: self.limit_type,
            occurred_at,
            local_year: occurred_at_local.year(),
            local_date: date_key(&occurred_at_local),
            local_hour: occurred_at_local.hour(),
            occurred_at_local,
            reset_at_local,
            reset_text: self.reset_text,
            session_id: session_id.or(self.session_id),
            summary_text: self.summary_text,
            source_file: self.source_file,
        }
    }
}

/// Most specific phrase first; `None` when the text names no known limit.
pub fn classify_limit_type(text: &str) -> Option<LimitType> {
    let lower = text.to_lowercase();
    if lower.contains("spending cap") {
        Some(LimitType::SpendingCap)
    } else if lower.contains("api context limit") || lower.contains("context limit") {
        Some(LimitType::Context)
    } else if lower.contains("5-hour limit") {
        Some(LimitType::FiveHour)
    } else if lower.contains("session limit") {
        Some(LimitType::Session)
    } else {
        None
    }
}

pub fn extract_reset_text(text: &str) -> Option<String> {
    RESET_PHRASE
        .find(text)
        .map(|found| found.as_str().trim().to_string())
        .filter(|found| !found.is_empty())
}

pub(crate) fn to_24_hour(hour: u32, period: &str) -> Option<u32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = period.eq_ignore_ascii_case("pm");
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (hour, false) => hour,
        (hour, true) => hour + 12,
    })
}

pub(crate) fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

pub(crate) fn wall_clock<Z: TimeZone>(
    zone: &Z,
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Z>> {
    zone.from_local_datetime(&date.and_hms_opt(hour, minute, 0)?)
        .earliest()
}

fn next_daily<Z: TimeZone>(occurred: &DateTime<Z>, hour: u32, minute: u32) -> Option<DateTime<Z>> {
    let zone = occurred.timezone();
    let today = occurred.date_naive();
    let candidate = wall_clock(&zone, today, hour, minute)?;
    if candidate > *occurred {
        return Some(candidate);
    }
    wall_clock(&zone, today.succ_opt()?, hour, minute)
}

fn next_yearly<Z: TimeZone>(
    occurred: &DateTime<Z>,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Z>> {
    let zone = occurred.timezone();
    let year = occurred.year();
    let candidate = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| wall_clock(&zone, date, hour, minute));
    if let Some(candidate) = candidate
        && candidate > *occurred
    {
        return Some(candidate);
    }
    let next = NaiveDate::from_ymd_opt(year + 1, month, day)?;
    wall_clock(&zone, next, hour, minute)
}

fn named_zone(capture: Option<regex::Match<'_>>) -> Option<Tz> {
    capture.and_then(|name| name.as_str().trim().parse::<Tz>().ok())
}

/// Runs `roll` in the named zone when one parses, else in the occurrence offset.
/// The result is always expressed in the occurrence's offset.
fn in_zone(
    occurred: &DateTime<FixedOffset>,
    zone: Option<Tz>,
    roll: impl Fn(&DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>>,
    roll_named: impl Fn(&DateTime<Tz>) -> Option<DateTime<Tz>>,
) -> Option<DateTime<FixedOffset>> {
    match zone {
        Some(zone) => roll_named(&occurred.with_timezone(&zone))
            .map(|reset| reset.with_timezone(&occurred.timezone())),
        None => roll(occurred),
    }
}

fn parse_hour_reset(
    occurred: &DateTime<FixedOffset>,
    text: &str,
) -> Option<DateTime<FixedOffset>> {
    let caps = HOUR_RESET.captures(text)?;
    let hour = to_24_hour(caps.get(1)?.as_str().parse().ok()?, caps.get(3)?.as_str())?;
    let minute = caps
        .get(2)
        .map_or(Some(0), |value| value.as_str().parse().ok())?;
    if minute > 59 {
        return None;
    }
    in_zone(
        occurred,
        named_zone(caps.get(4)),
        |local| next_daily(local, hour, minute),
        |named| next_daily(named, hour, minute),
    )
}

fn parse_month_day_reset(
    occurred: &DateTime<FixedOffset>,
    text: &str,
) -> Option<DateTime<FixedOffset>> {
    let caps = MONTH_DAY_RESET.captures(text)?;
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let hour = to_24_hour(caps.get(3)?.as_str().parse().ok()?, caps.get(5)?.as_str())?;
    let minute = caps
        .get(4)
        .map_or(Some(0), |value| value.as_str().parse().ok())?;
    if minute > 59 {
        return None;
    }
    in_zone(
        occurred,
        named_zone(caps.get(6)),
        |local| next_yearly(local, month, day, hour, minute),
        |named| next_yearly(named, month, day, hour, minute),
    )
}

/// Resolves the reset time announced by a limit message.
///
/// `resets 6pm` rolls to the next day unless strictly after the occurrence;
/// `resets Dec 12, 1pm` rolls to the next year under the same rule. Without a
/// recognisable phrase the reset is 24 hours after the occurrence.
pub fn parse_reset_time(
    occurred: &DateTime<FixedOffset>,
    reset_text: Option<&str>,
) -> DateTime<FixedOffset> {
    reset_text
        .and_then(|text| {
            parse_hour_reset(occurred, text).or_else(|| parse_month_day_reset(occurred, text))
        })
        .unwrap_or_else(|| *occurred + Duration::hours(FALLBACK_RESET_HOURS))
}
