use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::Db;
use crate::error::{DbError, Result};

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");
const MIGRATION_0002: &str = include_str!("../migrations/0002_usage_snapshots.sql");
const MIGRATION_0003: &str = include_str!("../migrations/0003_pending_rollups.sql");

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "0001_init", MIGRATION_0001),
    (2, "0002_usage_snapshots", MIGRATION_0002),
    (3, "0003_pending_rollups", MIGRATION_0003),
];

pub const LATEST_SCHEMA_VERSION: i64 = 3;

const DATA_TABLES: &[&str] = &[
    "message_entries",
    "limit_events",
    "hourly_aggregates",
    "model_aggregates",
    "file_tracks",
    "usage_snapshots",
    "pending_hours",
    "pending_years",
];

impl Db {
    /// Applies every pending migration in one transaction, recording each in
    /// `schema_version`. A store written by a newer binary is refused.
    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        ensure_version_table(&tx)?;
        let current = current_version(&tx)?;
        if current > LATEST_SCHEMA_VERSION {
            return Err(DbError::Integrity(format!(
                "schema version {current} is newer than supported version {LATEST_SCHEMA_VERSION}"
            )));
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        for (version, name, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            tx.execute_batch(sql)?;
            tx.execute(
                "INSERT INTO schema_version (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![version, name, now],
            )?;
            info!(version, name, "applied migration");
        }
        tx.commit()?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        ensure_version_table(&self.conn)?;
        current_version(&self.conn)
    }

    /// Runs `PRAGMA integrity_check` and validates the schema marker.
    pub fn check_integrity(&self) -> Result<()> {
        let version = self.schema_version()?;
        if version != LATEST_SCHEMA_VERSION {
            return Err(DbError::Integrity(format!(
                "schema version {version} does not match expected {LATEST_SCHEMA_VERSION}"
            )));
        }
        let mut stmt = self.conn.prepare("PRAGMA integrity_check")?;
        let problems = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if problems.len() == 1 && problems[0] == "ok" {
            debug!("integrity check passed");
            return Ok(());
        }
        Err(DbError::Integrity(problems.join("; ")))
    }

    /// Clears every data table, file tracking included. Schema is kept.
    pub fn reset_all(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in DATA_TABLES {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;
        info!("cleared all tables for rebuild");
        Ok(())
    }
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
          version INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          applied_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn current_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}
