use crate::error::Result;
use crate::pricing::PricingCache;
use crate::services::{SharedConfig, open_db};
use ingest::{IngestRequest, IngestStats};
use usage_db::Db;

#[derive(Clone)]
pub struct IngestService {
    config: SharedConfig,
    pricing: PricingCache,
}

impl IngestService {
    pub(super) fn new(config: SharedConfig, pricing: PricingCache) -> Self {
        Self { config, pricing }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    fn request(&self, force_rescan: bool, verbose: bool) -> IngestRequest<'_> {
        IngestRequest {
            roots: self.config.log_roots.clone(),
            projects_path: Some(self.config.projects_path.clone()),
            force_rescan,
            verbose,
            cost_estimator: Some(&self.pricing),
        }
    }

    /// Incremental scan; `force_rescan` reprocesses every discovered file.
    pub fn run(&self, force_rescan: bool, verbose: bool) -> Result<IngestStats> {
        let mut db = self.db()?;
        Ok(ingest::ingest(&mut db, &self.request(force_rescan, verbose))?)
    }

    /// Drops all stored data and re-ingests from scratch.
    pub fn rebuild(&self, verbose: bool) -> Result<IngestStats> {
        let mut db = self.db()?;
        Ok(ingest::rebuild(&mut db, &self.request(true, verbose))?)
    }

    pub fn check_integrity(&self) -> Result<()> {
        let db = self.db()?;
        db.check_integrity()?;
        Ok(())
    }

    pub fn pricing(&self) -> &PricingCache {
        &self.pricing
    }
}
