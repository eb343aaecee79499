use std::collections::{BTreeSet, HashMap};

use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Transaction, params, params_from_iter};
use usage_core::{FileTrack, HourBucket, LimitEvent, MessageEntry};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{format_local, format_utc};
use crate::types::FileCommit;

const ENTRY_COLUMNS: &[&str] = &[
    "identity_key",
    "utc_timestamp",
    "local_timestamp",
    "local_year",
    "local_date",
    "local_hour",
    "session_id",
    "request_id",
    "message_id",
    "model",
    "cost_usd",
    "input_tokens",
    "output_tokens",
    "cache_read_tokens",
    "cache_write_tokens",
    "total_tokens",
    "source_file",
    "project_id",
];

const LIMIT_COLUMNS: &[&str] = &[
    "identity_key",
    "limit_type",
    "occurred_at",
    "occurred_at_local",
    "local_year",
    "local_date",
    "local_hour",
    "reset_at_local",
    "reset_text",
    "session_id",
    "summary_text",
    "source_file",
];

impl Db {
    /// Persists one scanned file atomically: entries, limit events, pending
    /// rollup markers, then the tracking row. The tracking row is the commit
    /// point for the file.
    ///
    /// Every hour and year the file touches is marked pending in the same
    /// transaction, so aggregates left stale by an interrupted run are rebuilt
    /// by the next [`Db::recompute_pending_rollups`].
    pub fn commit_file(
        &mut self,
        track: &FileTrack,
        entries: &[MessageEntry],
        limit_events: &[LimitEvent],
    ) -> Result<FileCommit> {
        let batch_size = self.batch_size;
        let tx = self.conn.transaction()?;
        let entries_inserted = insert_batched(
            &tx,
            "message_entries",
            ENTRY_COLUMNS,
            entries,
            batch_size,
            entry_values,
        )?;
        let limit_events_inserted = insert_batched(
            &tx,
            "limit_events",
            LIMIT_COLUMNS,
            limit_events,
            batch_size,
            limit_values,
        )?;
        mark_pending(&tx, entries)?;
        upsert_track(&tx, track)?;
        tx.commit()?;
        Ok(FileCommit {
            entries_inserted,
            limit_events_inserted,
        })
    }

    pub fn insert_message_entries(&mut self, entries: &[MessageEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let batch_size = self.batch_size;
        let tx = self.conn.transaction()?;
        let inserted = insert_batched(
            &tx,
            "message_entries",
            ENTRY_COLUMNS,
            entries,
            batch_size,
            entry_values,
        )?;
        mark_pending(&tx, entries)?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn insert_limit_events(&mut self, events: &[LimitEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let batch_size = self.batch_size;
        let tx = self.conn.transaction()?;
        let inserted =
            insert_batched(&tx, "limit_events", LIMIT_COLUMNS, events, batch_size, limit_values)?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn upsert_file_track(&mut self, track: &FileTrack) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_track(&tx, track)?;
        tx.commit()?;
        Ok(())
    }

    pub fn file_tracks(&self) -> Result<HashMap<String, FileTrack>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT path, mtime_ns, size_bytes, last_scanned, entry_count
            FROM file_tracks
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FileTrack {
                    path: row.get(0)?,
                    mtime_ns: row.get(1)?,
                    size_bytes: row.get(2)?,
                    last_scanned: row.get(3)?,
                    entry_count: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|track| (track.path.clone(), track))
            .collect())
    }

    pub fn file_track(&self, path: &str) -> Result<Option<FileTrack>> {
        self.conn
            .query_row(
                r#"
                SELECT path, mtime_ns, size_bytes, last_scanned, entry_count
                FROM file_tracks
                WHERE path = ?1
                "#,
                params![path],
                |row| {
                    Ok(FileTrack {
                        path: row.get(0)?,
                        mtime_ns: row.get(1)?,
                        size_bytes: row.get(2)?,
                        last_scanned: row.get(3)?,
                        entry_count: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
    }

    pub fn count_message_entries(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM message_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_limit_events(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM limit_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Rows whose stored total disagrees with the sum of its four counters.
    pub fn count_inconsistent_totals(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM message_entries
            WHERE total_tokens != input_tokens + output_tokens + cache_read_tokens + cache_write_tokens
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn mark_pending(tx: &Transaction<'_>, entries: &[MessageEntry]) -> Result<()> {
    let mut hour = tx.prepare_cached(
        "INSERT OR IGNORE INTO pending_hours (year, month, day, hour) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut year = tx.prepare_cached("INSERT OR IGNORE INTO pending_years (year) VALUES (?1)")?;
    let buckets: BTreeSet<HourBucket> = entries.iter().map(MessageEntry::bucket).collect();
    for bucket in &buckets {
        hour.execute(params![bucket.year, bucket.month, bucket.day, bucket.hour])?;
    }
    let years: BTreeSet<i32> = entries.iter().map(|entry| entry.local_year).collect();
    for value in years {
        year.execute(params![value])?;
    }
    Ok(())
}

fn upsert_track(tx: &Transaction<'_>, track: &FileTrack) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO file_tracks (path, mtime_ns, size_bytes, last_scanned, entry_count)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(path) DO UPDATE SET
          mtime_ns = excluded.mtime_ns,
          size_bytes = excluded.size_bytes,
          last_scanned = excluded.last_scanned,
          entry_count = excluded.entry_count
        "#,
        params![
            track.path,
            track.mtime_ns,
            track.size_bytes,
            track.last_scanned,
            track.entry_count
        ],
    )?;
    Ok(())
}

fn batch_insert_sql(table: &str, columns: &[&str], rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![row.as_str(); rows].join(", ");
    format!(
        "INSERT OR IGNORE INTO {table} ({}) VALUES {values}",
        columns.join(", ")
    )
}

fn insert_batched<T>(
    tx: &Transaction<'_>,
    table: &str,
    columns: &[&str],
    rows: &[T],
    batch_size: usize,
    to_values: fn(&T) -> Vec<Value>,
) -> Result<usize> {
    let mut inserted = 0usize;
    for chunk in rows.chunks(batch_size.max(1)) {
        let sql = batch_insert_sql(table, columns, chunk.len());
        let values: Vec<Value> = chunk.iter().flat_map(to_values).collect();
        let mut stmt = tx.prepare_cached(&sql)?;
        inserted += stmt.execute(params_from_iter(values.iter()))?;
    }
    Ok(inserted)
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn opt_text(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.clone()))
}

fn counter(value: u64) -> Value {
    Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}

fn entry_values(entry: &MessageEntry) -> Vec<Value> {
    vec![
        text(&entry.identity_key),
        Value::Text(format_utc(&entry.utc_timestamp)),
        Value::Text(format_local(&entry.local_timestamp)),
        Value::Integer(entry.local_year as i64),
        text(&entry.local_date),
        Value::Integer(entry.local_hour as i64),
        opt_text(entry.session_id.as_ref()),
        opt_text(entry.request_id.as_ref()),
        opt_text(entry.message_id.as_ref()),
        opt_text(entry.model.as_ref()),
        entry.cost_usd.map_or(Value::Null, Value::Real),
        counter(entry.usage.input_tokens),
        counter(entry.usage.output_tokens),
        counter(entry.usage.cache_read_tokens),
        counter(entry.usage.cache_write_tokens),
        counter(entry.total_tokens()),
        text(&entry.source_file),
        text(&entry.project_id),
    ]
}

fn limit_values(event: &LimitEvent) -> Vec<Value> {
    vec![
        text(&event.identity_key),
        text(event.limit_type.as_str()),
        Value::Text(format_utc(&event.occurred_at)),
        Value::Text(format_local(&event.occurred_at_local)),
        Value::Integer(event.local_year as i64),
        text(&event.local_date),
        Value::Integer(event.local_hour as i64),
        Value::Text(format_local(&event.reset_at_local)),
        opt_text(event.reset_text.as_ref()),
        opt_text(event.session_id.as_ref()),
        opt_text(event.summary_text.as_ref()),
        text(&event.source_file),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_sql_has_one_group_per_row() {
        let sql = batch_insert_sql("t", &["a", "b"], 3);
        assert_eq!(
            sql,
            "INSERT OR IGNORE INTO t (a, b) VALUES (?, ?), (?, ?), (?, ?)"
        );
    }
}
