#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};
use tempfile::TempDir;
use usage_core::{FileTrack, LimitEvent, LimitType, MessageEntry, TokenUsage, date_key};
use usage_db::Db;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn utc(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .expect("timestamp")
        .with_timezone(&Utc)
}

pub fn usage(input: u64, output: u64, cache_read: u64, cache_write: u64) -> TokenUsage {
    TokenUsage {
        input_tokens: input,
        output_tokens: output,
        cache_read_tokens: cache_read,
        cache_write_tokens: cache_write,
    }
}

/// Builds an entry whose local time is UTC, so buckets are predictable.
pub fn make_entry(
    key: &str,
    ts: &str,
    session: &str,
    model: &str,
    usage: TokenUsage,
    cost: Option<f64>,
    project: &str,
) -> MessageEntry {
    let utc_timestamp = utc(ts);
    let local = utc_timestamp.with_timezone(&FixedOffset::east_opt(0).expect("offset"));
    let (message_id, request_id) = key.split_once(':').unwrap_or((key, "req"));
    MessageEntry {
        identity_key: key.to_string(),
        utc_timestamp,
        local_timestamp: local,
        local_year: local.year(),
        local_date: date_key(&local),
        local_hour: local.hour(),
        session_id: Some(session.to_string()),
        request_id: Some(request_id.to_string()),
        message_id: Some(message_id.to_string()),
        model: Some(model.to_string()),
        cost_usd: cost,
        usage,
        source_file: format!("/logs/{project}/{session}.jsonl"),
        project_id: project.to_string(),
    }
}

pub fn make_limit_event(key: &str, ts: &str, limit_type: LimitType) -> LimitEvent {
    let occurred_at = utc(ts);
    let local = occurred_at.with_timezone(&FixedOffset::east_opt(0).expect("offset"));
    LimitEvent {
        identity_key: key.to_string(),
        limit_type,
        occurred_at,
        occurred_at_local: local,
        local_year: local.year(),
        local_date: date_key(&local),
        local_hour: local.hour(),
        reset_at_local: local + Duration::hours(5),
        reset_text: Some("resets 6pm".to_string()),
        session_id: Some("session-1".to_string()),
        summary_text: Some("5-hour limit reached".to_string()),
        source_file: "/logs/p/session-1.jsonl".to_string(),
    }
}

pub fn make_track(path: &str, mtime_ns: i64, size_bytes: i64, entry_count: i64) -> FileTrack {
    FileTrack {
        path: path.to_string(),
        mtime_ns,
        size_bytes,
        last_scanned: "2025-06-01T00:00:00Z".to_string(),
        entry_count,
    }
}
