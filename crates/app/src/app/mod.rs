use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::pricing::{PriceSource, PricingCache};
use crate::services::AppServices;
use crate::startup::AppPaths;
use ingest::IngestStats;
use usage_db::{BATCH_INSERT_SIZE, Db};

/// Paths and knobs needed to run the local command center.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub projects_path: PathBuf,
    pub pricing_cache_path: PathBuf,
    pub log_roots: Vec<PathBuf>,
    pub batch_size: usize,
}

impl AppConfig {
    pub fn from_paths(paths: &AppPaths, log_roots: Vec<PathBuf>) -> Self {
        Self {
            db_path: paths.db_path.clone(),
            projects_path: paths.projects_path.clone(),
            pricing_cache_path: paths.pricing_cache_path.clone(),
            log_roots,
            batch_size: BATCH_INSERT_SIZE,
        }
    }
}

/// Application state shared by front ends (CLI, tests).
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    /// Prices come from the on-disk cache only.
    pub fn new(config: AppConfig) -> Self {
        let pricing = PricingCache::new(Some(config.pricing_cache_path.clone()), None);
        Self::with_pricing(config, pricing)
    }

    pub fn with_price_source(config: AppConfig, source: Arc<dyn PriceSource>) -> Self {
        let pricing = PricingCache::new(Some(config.pricing_cache_path.clone()), Some(source));
        Self::with_pricing(config, pricing)
    }

    fn with_pricing(config: AppConfig, pricing: PricingCache) -> Self {
        let services = AppServices::new(&config, pricing);
        Self { config, services }
    }

    pub fn is_fresh_db(&self) -> bool {
        !self.config.db_path.exists()
    }

    pub fn setup_db(&self) -> Result<()> {
        setup_db(&self.config.db_path)
    }

    /// Migrates the database and runs one incremental ingest.
    pub fn initialize(&self) -> Result<IngestStats> {
        self.setup_db()
            .map_err(|err| AppError::Message(format!("initialize db: {}", err)))?;
        self.refresh_data()
    }

    pub fn open_db(&self) -> Result<Db> {
        let mut db = Db::open(&self.config.db_path)?;
        db.set_batch_size(self.config.batch_size);
        Ok(db)
    }

    pub fn refresh_data(&self) -> Result<IngestStats> {
        self.services.ingest.run(false, false)
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
