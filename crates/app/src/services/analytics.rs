use chrono::{Local, NaiveDate};

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};
use crate::util::streaks::{Streaks, compute_streaks};
use usage_core::{
    DailyActivity, DateRange, DayDetails, HourlyAggregate, HourlyProfilePoint, ModelAggregate,
    ModelDetails, ModelUsage, SessionDetails, SessionSummary, TimelineGranularity, TimelinePoint,
    UsageTotals,
};
use usage_db::Db;

#[derive(Clone)]
pub struct AnalyticsService {
    config: SharedConfig,
}

impl AnalyticsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn totals(&self, range: &DateRange, project: Option<&str>) -> Result<UsageTotals> {
        Ok(self.db()?.usage_totals(range, project)?)
    }

    pub fn daily_activity(
        &self,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<Vec<DailyActivity>> {
        Ok(self.db()?.daily_activity(range, project)?)
    }

    pub fn timeline(
        &self,
        range: &DateRange,
        project: Option<&str>,
        granularity: &str,
    ) -> Result<Vec<TimelinePoint>> {
        let granularity = TimelineGranularity::parse(granularity).ok_or_else(|| {
            AppError::InvalidInput(format!("unsupported granularity {granularity}"))
        })?;
        Ok(self.db()?.timeline(range, project, granularity)?)
    }

    pub fn models(&self, range: &DateRange, project: Option<&str>) -> Result<Vec<ModelUsage>> {
        Ok(self.db()?.model_distribution(range, project)?)
    }

    pub fn hourly_profile(
        &self,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<Vec<HourlyProfilePoint>> {
        Ok(self.db()?.hourly_profile(range, project)?)
    }

    pub fn recent_sessions(
        &self,
        range: &DateRange,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        Ok(self.db()?.recent_sessions(range, project, limit)?)
    }

    pub fn day_details(&self, date: &str, project: Option<&str>) -> Result<DayDetails> {
        crate::util::time::parse_date(date)?;
        Ok(self.db()?.day_details(date, project)?)
    }

    pub fn model_details(
        &self,
        model: &str,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<ModelDetails> {
        Ok(self.db()?.model_details(model, range, project)?)
    }

    pub fn session_details(&self, session_id: &str) -> Result<SessionDetails> {
        self.db()?
            .session_details(session_id)?
            .ok_or_else(|| AppError::NotFound(format!("session not found: {session_id}")))
    }

    pub fn top_models(&self, year: i32, limit: usize) -> Result<Vec<ModelAggregate>> {
        Ok(self.db()?.top_models(year, limit)?)
    }

    pub fn hourly_aggregates(&self, range: &DateRange) -> Result<Vec<HourlyAggregate>> {
        Ok(self.db()?.hourly_aggregates(range)?)
    }

    pub fn model_aggregates(&self, year: Option<i32>) -> Result<Vec<ModelAggregate>> {
        Ok(self.db()?.model_aggregates(year)?)
    }

    pub fn streaks(&self, project: Option<&str>) -> Result<Streaks> {
        self.streaks_at(project, Local::now().date_naive())
    }

    /// Streaks over the whole history, counted back from `today`.
    pub fn streaks_at(&self, project: Option<&str>, today: NaiveDate) -> Result<Streaks> {
        let db = self.db()?;
        let Some((from, _)) = db.activity_bounds()? else {
            return Ok(Streaks::default());
        };
        let range = DateRange {
            from,
            to: today.format("%Y-%m-%d").to_string(),
        };
        let days = db.daily_activity(&range, project)?;
        Ok(compute_streaks(
            days.iter()
                .filter(|day| day.messages > 0)
                .map(|day| day.date.as_str()),
            today,
        ))
    }
}
