use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::config::RangeParams;
use crate::error::{AppError, Result};
use usage_core::DateRange;

const DATE_FORMAT: &str = "%Y-%m-%d";
const ALL_TIME_FROM: &str = "0001-01-01";
const ALL_TIME_TO: &str = "9999-12-31";

pub fn resolve_range(params: &RangeParams) -> Result<DateRange> {
    resolve_range_at(params, Local::now().date_naive())
}

/// Resolves `params` into an inclusive local date range relative to `today`.
pub fn resolve_range_at(params: &RangeParams, today: NaiveDate) -> Result<DateRange> {
    if params.from.is_some() || params.to.is_some() {
        let from = match params.from.as_deref() {
            Some(value) => parse_date(value)?,
            None => parse_date(ALL_TIME_FROM)?,
        };
        let to = match params.to.as_deref() {
            Some(value) => parse_date(value)?,
            None => today,
        };
        if from > to {
            return Err(AppError::InvalidInput(format!(
                "range start {from} is after end {to}"
            )));
        }
        return Ok(date_range(from, to));
    }
    let (from, to) = match params.range.as_deref().unwrap_or("last7days") {
        "today" => (today, today),
        "yesterday" => {
            let yesterday = today - Duration::days(1);
            (yesterday, yesterday)
        }
        "last7days" => (today - Duration::days(6), today),
        "last30days" => (today - Duration::days(29), today),
        "thismonth" => (today.with_day(1).unwrap_or(today), today),
        "thisyear" => (
            NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            today,
        ),
        "alltime" => {
            return Ok(DateRange {
                from: ALL_TIME_FROM.to_string(),
                to: ALL_TIME_TO.to_string(),
            });
        }
        value => {
            return Err(AppError::InvalidInput(format!(
                "unsupported range {}",
                value
            )));
        }
    };
    Ok(date_range(from, to))
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|err| AppError::InvalidInput(format!("invalid date {value}: {err}")))
}

fn date_range(from: NaiveDate, to: NaiveDate) -> DateRange {
    DateRange {
        from: from.format(DATE_FORMAT).to_string(),
        to: to.format(DATE_FORMAT).to_string(),
    }
}
