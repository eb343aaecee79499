mod accounts;
mod analytics;
mod dashboard;
mod ingest;
mod limits;
mod projects;

use std::sync::Arc;

use crate::app::AppConfig;
use crate::error::Result;
use crate::pricing::PricingCache;
use usage_db::Db;

pub use accounts::AccountsService;
pub use analytics::AnalyticsService;
pub use dashboard::{DashboardBundle, DashboardMeta, DashboardService};
pub use self::ingest::IngestService;
pub use limits::{LimitsOverview, LimitsService};
pub use projects::ProjectsService;

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub accounts: AccountsService,
    pub analytics: AnalyticsService,
    pub dashboard: DashboardService,
    pub ingest: IngestService,
    pub limits: LimitsService,
    pub projects: ProjectsService,
}

impl AppServices {
    pub fn new(config: &AppConfig, pricing: PricingCache) -> Self {
        let shared = Arc::new(config.clone());
        let ingest = IngestService::new(shared.clone(), pricing);
        let analytics = AnalyticsService::new(shared.clone());
        Self {
            accounts: AccountsService::new(shared.clone()),
            dashboard: DashboardService::new(analytics.clone(), ingest.clone()),
            analytics,
            ingest,
            limits: LimitsService::new(shared.clone()),
            projects: ProjectsService::new(shared),
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    let mut db = Db::open(&config.db_path)?;
    db.set_batch_size(config.batch_size);
    Ok(db)
}
