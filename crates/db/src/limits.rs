use rusqlite::params;
use usage_core::{DateRange, LimitEvent};

use crate::Db;
use crate::error::Result;
use crate::helpers::row_to_limit_event_row;

const LIMIT_EVENT_COLUMNS: &str = r#"
    identity_key, limit_type, occurred_at, occurred_at_local, local_year, local_date,
    local_hour, reset_at_local, reset_text, session_id, summary_text, source_file
"#;

impl Db {
    /// Limit events whose local occurrence date falls in `range`, oldest first.
    pub fn limit_events(&self, range: &DateRange) -> Result<Vec<LimitEvent>> {
        let sql = format!(
            r#"
            SELECT {LIMIT_EVENT_COLUMNS}
            FROM limit_events
            WHERE local_date BETWEEN ?1 AND ?2
            ORDER BY occurred_at, identity_key
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![range.from, range.to], row_to_limit_event_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(|row| row.into_event()).collect()
    }

    pub fn latest_limit_event(&self) -> Result<Option<LimitEvent>> {
        let sql = format!(
            r#"
            SELECT {LIMIT_EVENT_COLUMNS}
            FROM limit_events
            ORDER BY occurred_at DESC, identity_key DESC
            LIMIT 1
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_limit_event_row(row)?.into_event()?)),
            None => Ok(None),
        }
    }
}
