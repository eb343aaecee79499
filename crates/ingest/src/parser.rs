use std::io::{self, BufRead};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use serde_json::Value;
use tracing::debug;
use usage_core::{LimitEvent, LimitType, MessageEntry, TokenUsage, date_key, parse_utc_timestamp};

use crate::dedup::{limit_identity, message_identity};
use crate::limits::{PartialLimitEvent, classify_limit_type, extract_reset_text};

/// How far (in records) a timestamp-less limit event looks for a neighbour.
pub const LIMIT_TIMESTAMP_WINDOW: usize = 10;

/// Where the lines being parsed came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    pub source_file: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Message(MessageEntry),
    Limit(LimitEvent),
    PartialLimit(PartialLimitEvent),
}

/// Everything usable from one log file.
#[derive(Debug, Clone, Default)]
pub struct FileRecords {
    pub entries: Vec<MessageEntry>,
    pub limits: Vec<LimitEvent>,
    pub lines_skipped: usize,
    pub limits_dropped: usize,
}

fn find_string<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    for path in paths {
        let mut current = value;
        let mut ok = true;
        for key in *path {
            if let Some(next) = current.get(*key) {
                current = next;
            } else {
                ok = false;
                break;
            }
        }
        if ok && let Some(found) = current.as_str() {
            return Some(found);
        }
    }
    None
}

pub(crate) fn parse_json_line(line: &str) -> Option<Value> {
    serde_json::from_str(line).ok()
}

fn value_to_f64(value: &Value) -> Option<f64> {
    if let Some(value) = value.as_f64() {
        return Some(value);
    }
    if let Some(value) = value.as_i64() {
        return Some(value as f64);
    }
    if let Some(value) = value.as_u64() {
        return Some(value as f64);
    }
    if let Some(value) = value.as_str() {
        return value.parse::<f64>().ok();
    }
    None
}

/// Largest per-turn token counter accepted; a line reporting more is malformed.
pub const MAX_TOKEN_COUNT: u64 = u32::MAX as u64;

/// `None` when the counter is present but out of range. Missing or
/// non-numeric counters are zero.
fn token_counter(usage: Option<&Value>, key: &str) -> Option<u64> {
    let count = usage
        .and_then(|usage| usage.get(key))
        .and_then(|value| {
            value
                .as_u64()
                .or_else(|| value_to_f64(value).filter(|n| *n >= 0.0).map(|n| n as u64))
        })
        .unwrap_or(0);
    (count <= MAX_TOKEN_COUNT).then_some(count)
}

fn token_usage(value: &Value) -> Option<TokenUsage> {
    let usage = value.get("message").and_then(|message| message.get("usage"));
    Some(TokenUsage {
        input_tokens: token_counter(usage, "input_tokens")?,
        output_tokens: token_counter(usage, "output_tokens")?,
        cache_read_tokens: token_counter(usage, "cache_read_input_tokens")?,
        cache_write_tokens: token_counter(usage, "cache_creation_input_tokens")?,
    })
}

fn extract_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    find_string(value, &[&["timestamp"]]).and_then(parse_utc_timestamp)
}

fn extract_session_id(value: &Value) -> Option<String> {
    find_string(value, &[&["sessionId"], &["session_id"]]).map(str::to_string)
}

fn message_text(value: &Value) -> Option<&str> {
    let content = value.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text);
    }
    content.as_array()?.iter().find_map(|item| {
        if item.get("type").and_then(Value::as_str) == Some("text") {
            item.get("text").and_then(Value::as_str)
        } else {
            None
        }
    })
}

fn is_legacy_limit(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("summary")
}

fn is_modern_limit(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("assistant")
        && value.get("error").and_then(Value::as_str) == Some("rate_limit")
}

fn parse_legacy_limit(value: &Value, ctx: &SourceContext) -> Option<ParsedRecord> {
    let summary = find_string(value, &[&["summary"]])?;
    let limit_type = classify_limit_type(summary)?;
    let identity_key = limit_identity(find_string(value, &[&["leafUuid"]]))?;
    Some(ParsedRecord::PartialLimit(PartialLimitEvent {
        identity_key,
        limit_type,
        reset_text: extract_reset_text(summary),
        summary_text: Some(summary.to_string()),
        session_id: extract_session_id(value),
        source_file: ctx.source_file.clone(),
    }))
}

fn parse_modern_limit<Z: TimeZone>(
    value: &Value,
    ctx: &SourceContext,
    zone: &Z,
) -> Option<ParsedRecord> {
    let identity_key = limit_identity(find_string(value, &[&["uuid"]]))?;
    let text = message_text(value).unwrap_or_default();
    let partial = PartialLimitEvent {
        identity_key,
        limit_type: classify_limit_type(text).unwrap_or(LimitType::Session),
        reset_text: extract_reset_text(text),
        summary_text: (!text.is_empty()).then(|| text.to_string()),
        session_id: extract_session_id(value),
        source_file: ctx.source_file.clone(),
    };
    match extract_timestamp(value) {
        Some(occurred_at) => Some(ParsedRecord::Limit(partial.complete(occurred_at, None, zone))),
        None => Some(ParsedRecord::PartialLimit(partial)),
    }
}

fn parse_message<Z: TimeZone>(
    value: &Value,
    ctx: &SourceContext,
    zone: &Z,
) -> Option<MessageEntry> {
    let message_id = find_string(value, &[&["message", "id"]]);
    let request_id = find_string(value, &[&["requestId"], &["request_id"]]);
    let identity_key = message_identity(message_id, request_id)?;
    let utc_timestamp = extract_timestamp(value)?;
    let local_timestamp = utc_timestamp.with_timezone(zone).fixed_offset();
    let usage = token_usage(value)?;
    Some(MessageEntry {
        identity_key,
        utc_timestamp,
        local_year: local_timestamp.year(),
        local_date: date_key(&local_timestamp),
        local_hour: local_timestamp.hour(),
        local_timestamp,
        session_id: extract_session_id(value),
        request_id: request_id.map(str::to_string),
        message_id: message_id.map(str::to_string),
        model: find_string(value, &[&["message", "model"], &["model"]]).map(str::to_string),
        cost_usd: value.get("costUSD").and_then(value_to_f64),
        usage,
        source_file: ctx.source_file.clone(),
        project_id: ctx.project_id.clone(),
    })
}

/// Classifies one decoded record. Limit shapes take precedence over messages.
pub fn parse_value_in<Z: TimeZone>(
    value: &Value,
    ctx: &SourceContext,
    zone: &Z,
) -> Option<ParsedRecord> {
    if is_legacy_limit(value) {
        return parse_legacy_limit(value, ctx);
    }
    if is_modern_limit(value) {
        return parse_modern_limit(value, ctx, zone);
    }
    parse_message(value, ctx, zone).map(ParsedRecord::Message)
}

pub fn parse_line_in<Z: TimeZone>(line: &str, ctx: &SourceContext, zone: &Z) -> Option<ParsedRecord> {
    let value = parse_json_line(line)?;
    parse_value_in(&value, ctx, zone)
}

/// Parses one raw log line in the process-local timezone.
pub fn parse_line(line: &str, ctx: &SourceContext) -> Option<ParsedRecord> {
    parse_line_in(line, ctx, &Local)
}

struct Anchor {
    timestamp: Option<DateTime<Utc>>,
    session_id: Option<String>,
}

fn resolve_anchor(anchors: &[Anchor], index: usize) -> Option<&Anchor> {
    let end = (index + LIMIT_TIMESTAMP_WINDOW).min(anchors.len().saturating_sub(1));
    let following = anchors
        .get(index + 1..=end)
        .and_then(|window| window.iter().find(|anchor| anchor.timestamp.is_some()));
    following.or_else(|| {
        let start = index.saturating_sub(LIMIT_TIMESTAMP_WINDOW);
        anchors[start..index]
            .iter()
            .rev()
            .find(|anchor| anchor.timestamp.is_some())
    })
}

/// Parses a whole log file, completing timestamp-less limit events from the
/// nearest timestamped record: the next ones first, then the preceding ones.
///
/// Malformed lines (bad JSON, invalid UTF-8, token counters above
/// [`MAX_TOKEN_COUNT`]) are skipped and counted. Read errors are returned so
/// the caller can skip the file as a unit.
pub fn parse_reader_in<R: BufRead, Z: TimeZone>(
    mut reader: R,
    ctx: &SourceContext,
    zone: &Z,
) -> io::Result<FileRecords> {
    let mut records = FileRecords::default();
    let mut anchors: Vec<Anchor> = Vec::new();
    let mut partials: Vec<(usize, PartialLimitEvent)> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let Ok(line) = std::str::from_utf8(&buf) else {
            records.lines_skipped += 1;
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(value) = parse_json_line(line).filter(|value| token_usage(value).is_some()) else {
            records.lines_skipped += 1;
            continue;
        };
        let index = anchors.len();
        anchors.push(Anchor {
            timestamp: extract_timestamp(&value),
            session_id: extract_session_id(&value),
        });
        match parse_value_in(&value, ctx, zone) {
            Some(ParsedRecord::Message(entry)) => records.entries.push(entry),
            Some(ParsedRecord::Limit(event)) => records.limits.push(event),
            Some(ParsedRecord::PartialLimit(partial)) => partials.push((index, partial)),
            None => {}
        }
    }

    for (index, partial) in partials {
        match resolve_anchor(&anchors, index).and_then(|anchor| {
            anchor
                .timestamp
                .map(|timestamp| (timestamp, anchor.session_id.clone()))
        }) {
            Some((occurred_at, session_id)) => {
                records.limits.push(partial.complete(occurred_at, session_id, zone));
            }
            None => {
                debug!(
                    file = %ctx.source_file,
                    limit = %partial.identity_key,
                    "dropping limit event without a nearby timestamp"
                );
                records.limits_dropped += 1;
            }
        }
    }
    Ok(records)
}

pub fn parse_reader<R: BufRead>(reader: R, ctx: &SourceContext) -> io::Result<FileRecords> {
    parse_reader_in(reader, ctx, &Local)
}
