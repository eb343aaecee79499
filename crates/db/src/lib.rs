use std::path::Path;

use rusqlite::Connection;

mod analytics;
mod error;
mod helpers;
mod ingest;
mod limits;
mod migrations;
mod rollups;
mod snapshots;
mod types;

pub use error::{DbError, Result};
pub use migrations::LATEST_SCHEMA_VERSION;
pub use types::{FileCommit, RollupDrift, RollupRecompute};

/// Rows per multi-value `INSERT OR IGNORE` statement.
pub const BATCH_INSERT_SIZE: usize = 100;

const MAX_BATCH_INSERT_SIZE: usize = 1_000;

pub struct Db {
    conn: Connection,
    batch_size: usize,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "cache_size", -20_000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn,
            batch_size: BATCH_INSERT_SIZE,
        })
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_INSERT_SIZE);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
