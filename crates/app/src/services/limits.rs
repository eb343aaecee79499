use serde::Serialize;

use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use usage_core::{DateRange, LimitEvent};
use usage_db::Db;

/// Most recent limit hit plus every hit inside the requested range.
#[derive(Debug, Clone, Serialize)]
pub struct LimitsOverview {
    pub latest: Option<LimitEvent>,
    pub events: Vec<LimitEvent>,
}

#[derive(Clone)]
pub struct LimitsService {
    config: SharedConfig,
}

impl LimitsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn events(&self, range: &DateRange) -> Result<Vec<LimitEvent>> {
        Ok(self.db()?.limit_events(range)?)
    }

    pub fn latest(&self) -> Result<Option<LimitEvent>> {
        Ok(self.db()?.latest_limit_event()?)
    }

    pub fn overview(&self, range: &DateRange) -> Result<LimitsOverview> {
        let db = self.db()?;
        Ok(LimitsOverview {
            latest: db.latest_limit_event()?,
            events: db.limit_events(range)?,
        })
    }
}
