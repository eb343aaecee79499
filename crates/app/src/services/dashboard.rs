use chrono::{Local, NaiveDate, SecondsFormat};
use serde::Serialize;

use crate::config::RangeParams;
use crate::error::Result;
use crate::services::{AnalyticsService, IngestService};
use crate::util::streaks::Streaks;
use crate::util::time::resolve_range_at;
use usage_core::{
    DailyActivity, DateRange, HourlyProfilePoint, ModelUsage, SessionSummary, TimelinePoint,
    UsageTotals,
};

pub const RECENT_SESSIONS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardMeta {
    pub updated_files: usize,
    pub generated_at: String,
    pub range: DateRange,
}

/// Everything the overview screen renders, produced by one call.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardBundle {
    pub totals: UsageTotals,
    pub streaks: Streaks,
    pub daily_activity: Vec<DailyActivity>,
    pub timeline: Vec<TimelinePoint>,
    pub models: Vec<ModelUsage>,
    pub hourly_profile: Vec<HourlyProfilePoint>,
    pub recent_sessions: Vec<SessionSummary>,
    pub meta: DashboardMeta,
}

#[derive(Clone)]
pub struct DashboardService {
    analytics: AnalyticsService,
    ingest: IngestService,
}

impl DashboardService {
    pub(super) fn new(analytics: AnalyticsService, ingest: IngestService) -> Self {
        Self { analytics, ingest }
    }

    pub fn bundle(&self, params: &RangeParams, refresh: bool) -> Result<DashboardBundle> {
        self.bundle_at(params, refresh, Local::now().date_naive())
    }

    /// With `refresh`, runs an incremental ingest before reading.
    pub fn bundle_at(
        &self,
        params: &RangeParams,
        refresh: bool,
        today: NaiveDate,
    ) -> Result<DashboardBundle> {
        let updated_files = if refresh {
            self.ingest.run(false, false)?.files_processed
        } else {
            0
        };
        let range = resolve_range_at(params, today)?;
        let project = params.project();
        let analytics = &self.analytics;
        Ok(DashboardBundle {
            totals: analytics.totals(&range, project)?,
            streaks: analytics.streaks_at(project, today)?,
            daily_activity: analytics.daily_activity(&range, project)?,
            timeline: analytics.timeline(&range, project, "day")?,
            models: analytics.models(&range, project)?,
            hourly_profile: analytics.hourly_profile(&range, project)?,
            recent_sessions: analytics.recent_sessions(&range, project, RECENT_SESSIONS_LIMIT)?,
            meta: DashboardMeta {
                updated_files,
                generated_at: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
                range,
            },
        })
    }
}
