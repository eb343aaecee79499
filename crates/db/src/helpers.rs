use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use rusqlite::Row;
use usage_core::{
    HourlyAggregate, LimitEvent, LimitType, ModelAggregate, ModelUsage, SessionSummary,
    UsageSnapshot, UsageTotals,
};

use crate::error::{DbError, Result};

pub(crate) fn format_utc(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn format_local(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, false)
}

pub(crate) fn get_u64(row: &Row<'_>, index: usize) -> std::result::Result<u64, rusqlite::Error> {
    Ok(row.get::<_, Option<i64>>(index)?.unwrap_or(0).max(0) as u64)
}

pub(crate) fn get_f64(row: &Row<'_>, index: usize) -> std::result::Result<f64, rusqlite::Error> {
    Ok(row.get::<_, Option<f64>>(index)?.unwrap_or(0.0))
}

/// Expects: messages, sessions, total, input, output, cache read, cache write, cost, first.
pub(crate) fn row_to_totals(row: &Row<'_>) -> std::result::Result<UsageTotals, rusqlite::Error> {
    Ok(UsageTotals {
        messages: get_u64(row, 0)?,
        sessions: get_u64(row, 1)?,
        total_tokens: get_u64(row, 2)?,
        input_tokens: get_u64(row, 3)?,
        output_tokens: get_u64(row, 4)?,
        cache_read_tokens: get_u64(row, 5)?,
        cache_write_tokens: get_u64(row, 6)?,
        total_cost: get_f64(row, 7)?,
        first_session: row.get(8)?,
    })
}

pub(crate) fn row_to_model_usage(
    row: &Row<'_>,
) -> std::result::Result<ModelUsage, rusqlite::Error> {
    Ok(ModelUsage {
        model: row.get(0)?,
        messages: get_u64(row, 1)?,
        input_tokens: get_u64(row, 2)?,
        output_tokens: get_u64(row, 3)?,
        cache_read_tokens: get_u64(row, 4)?,
        cache_write_tokens: get_u64(row, 5)?,
        total_tokens: get_u64(row, 6)?,
        total_cost: get_f64(row, 7)?,
    })
}

pub(crate) fn row_to_session_summary(
    row: &Row<'_>,
) -> std::result::Result<SessionSummary, rusqlite::Error> {
    Ok(SessionSummary {
        session_id: row.get(0)?,
        project_id: row.get(1)?,
        model: row.get(2)?,
        first_timestamp: row.get(3)?,
        last_timestamp: row.get(4)?,
        messages: get_u64(row, 5)?,
        total_tokens: get_u64(row, 6)?,
        total_cost: get_f64(row, 7)?,
    })
}

pub(crate) fn row_to_hourly_aggregate(
    row: &Row<'_>,
) -> std::result::Result<HourlyAggregate, rusqlite::Error> {
    Ok(HourlyAggregate {
        date: row.get(0)?,
        hour: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        day: row.get(4)?,
        message_count: get_u64(row, 5)?,
        session_count: get_u64(row, 6)?,
        total_tokens: get_u64(row, 7)?,
        total_cost: get_f64(row, 8)?,
    })
}

pub(crate) fn row_to_model_aggregate(
    row: &Row<'_>,
) -> std::result::Result<ModelAggregate, rusqlite::Error> {
    Ok(ModelAggregate {
        model: row.get(0)?,
        year: row.get(1)?,
        message_count: get_u64(row, 2)?,
        input_tokens: get_u64(row, 3)?,
        output_tokens: get_u64(row, 4)?,
        cache_read_tokens: get_u64(row, 5)?,
        cache_write_tokens: get_u64(row, 6)?,
        total_tokens: get_u64(row, 7)?,
        total_cost: get_f64(row, 8)?,
    })
}

pub(crate) fn row_to_snapshot(row: &Row<'_>) -> std::result::Result<UsageSnapshot, rusqlite::Error> {
    Ok(UsageSnapshot {
        email: row.get(0)?,
        logfile: row.get(1)?,
        session_used_pct: row.get(2)?,
        session_resets: row.get(3)?,
        week_used_pct: row.get(4)?,
        week_resets: row.get(5)?,
        week_reset_at: row.get(6)?,
        captured_at: row.get(7)?,
    })
}

/// Limit event columns as stored; timestamps are parsed after the row is read.
pub(crate) struct LimitEventRow {
    identity_key: String,
    limit_type: String,
    occurred_at: String,
    occurred_at_local: String,
    local_year: i32,
    local_date: String,
    local_hour: u32,
    reset_at_local: String,
    reset_text: Option<String>,
    session_id: Option<String>,
    summary_text: Option<String>,
    source_file: String,
}

pub(crate) fn row_to_limit_event_row(
    row: &Row<'_>,
) -> std::result::Result<LimitEventRow, rusqlite::Error> {
    Ok(LimitEventRow {
        identity_key: row.get(0)?,
        limit_type: row.get(1)?,
        occurred_at: row.get(2)?,
        occurred_at_local: row.get(3)?,
        local_year: row.get(4)?,
        local_date: row.get(5)?,
        local_hour: row.get(6)?,
        reset_at_local: row.get(7)?,
        reset_text: row.get(8)?,
        session_id: row.get(9)?,
        summary_text: row.get(10)?,
        source_file: row.get(11)?,
    })
}

impl LimitEventRow {
    pub(crate) fn into_event(self) -> Result<LimitEvent> {
        let limit_type = LimitType::parse(&self.limit_type).ok_or_else(|| {
            DbError::Integrity(format!(
                "unknown limit type {:?} for event {}",
                self.limit_type, self.identity_key
            ))
        })?;
        Ok(LimitEvent {
            limit_type,
            occurred_at: DateTime::parse_from_rfc3339(&self.occurred_at)?.with_timezone(&Utc),
            occurred_at_local: DateTime::parse_from_rfc3339(&self.occurred_at_local)?,
            reset_at_local: DateTime::parse_from_rfc3339(&self.reset_at_local)?,
            identity_key: self.identity_key,
            local_year: self.local_year,
            local_date: self.local_date,
            local_hour: self.local_hour,
            reset_text: self.reset_text,
            session_id: self.session_id,
            summary_text: self.summary_text,
            source_file: self.source_file,
        })
    }
}
