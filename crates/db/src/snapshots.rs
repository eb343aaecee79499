use rusqlite::params;
use usage_core::UsageSnapshot;

use crate::Db;
use crate::error::Result;
use crate::helpers::row_to_snapshot;

impl Db {
    pub fn insert_usage_snapshot(&mut self, snapshot: &UsageSnapshot) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO usage_snapshots (
              email, logfile, session_used_pct, session_resets,
              week_used_pct, week_resets, week_reset_at, captured_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                snapshot.email,
                snapshot.logfile,
                snapshot.session_used_pct,
                snapshot.session_resets,
                snapshot.week_used_pct,
                snapshot.week_resets,
                snapshot.week_reset_at,
                snapshot.captured_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent snapshot for each account email, ordered by email.
    pub fn latest_snapshots(&self) -> Result<Vec<UsageSnapshot>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.email, s.logfile, s.session_used_pct, s.session_resets,
                   s.week_used_pct, s.week_resets, s.week_reset_at, s.captured_at
            FROM usage_snapshots s
            WHERE s.id = (
              SELECT latest.id FROM usage_snapshots latest
              WHERE latest.email = s.email
              ORDER BY latest.captured_at DESC, latest.id DESC
              LIMIT 1
            )
            ORDER BY s.email
            "#,
        )?;
        let rows = stmt
            .query_map([], row_to_snapshot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
