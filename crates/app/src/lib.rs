pub mod app;
pub mod config;
pub mod error;
pub mod pricing;
pub mod services;
pub mod startup;
pub mod util;

pub use app::{AppConfig, AppState, setup_db};
pub use config::RangeParams;
pub use error::{ApiError, AppError, Result};
pub use pricing::{FilePriceSource, PriceSource, PriceTable, PricingCache, StaticPriceSource};
pub use services::{AppServices, DashboardBundle, DashboardMeta, LimitsOverview};
pub use startup::{AppPaths, ensure_app_data_dir};
pub use util::streaks::{Streaks, compute_streaks};
pub use util::time::{resolve_range, resolve_range_at};
