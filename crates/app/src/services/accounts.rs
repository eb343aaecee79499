use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use usage_core::UsageSnapshot;
use usage_db::Db;

#[derive(Clone)]
pub struct AccountsService {
    config: SharedConfig,
}

impl AccountsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// Parses one scraper document and stores it as a snapshot.
    pub fn record_snapshot(&self, raw: &str, now: DateTime<FixedOffset>) -> Result<UsageSnapshot> {
        let snapshot = ingest::parse_snapshot(raw, now)?;
        let mut db = self.db()?;
        let id = db.insert_usage_snapshot(&snapshot)?;
        tracing::debug!(id, email = %snapshot.email, "stored usage snapshot");
        Ok(snapshot)
    }

    /// Newest snapshot for each account.
    pub fn latest(&self) -> Result<Vec<UsageSnapshot>> {
        Ok(self.db()?.latest_snapshots()?)
    }
}
