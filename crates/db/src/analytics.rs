use rusqlite::{ToSql, params};
use usage_core::{
    DailyActivity, DateRange, DayDetails, HourlyProfilePoint, ModelDetails, ModelUsage,
    SessionDetails, SessionMessage, SessionSummary, TimelineGranularity, TimelinePoint,
    UsageTotals,
};

use crate::Db;
use crate::error::Result;
use crate::helpers::{get_f64, get_u64, row_to_model_usage, row_to_session_summary, row_to_totals};

const TOP_SESSIONS_LIMIT: usize = 10;

const TOTALS_COLUMNS: &str = r#"
    COUNT(*), COUNT(DISTINCT session_id), SUM(total_tokens), SUM(input_tokens),
    SUM(output_tokens), SUM(cache_read_tokens), SUM(cache_write_tokens), SUM(cost_usd),
    MIN(local_timestamp)
"#;

const SCOPE: &str = "local_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR project_id = ?3)";

fn period_expr(granularity: TimelineGranularity, column: &str) -> String {
    match granularity {
        TimelineGranularity::Day => column.to_string(),
        TimelineGranularity::Week => format!("strftime('%Y-W%W', {column})"),
        TimelineGranularity::Month => format!("substr({column}, 1, 7)"),
    }
}

impl Db {
    pub fn usage_totals(&self, range: &DateRange, project: Option<&str>) -> Result<UsageTotals> {
        let sql = format!("SELECT {TOTALS_COLUMNS} FROM message_entries WHERE {SCOPE}");
        let totals = self
            .conn
            .query_row(&sql, params![range.from, range.to, project], row_to_totals)?;
        Ok(totals)
    }

    /// Earliest and latest local dates with recorded activity.
    pub fn activity_bounds(&self) -> Result<Option<(String, String)>> {
        let bounds: (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(local_date), MAX(local_date) FROM message_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match bounds {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }

    pub fn daily_activity(
        &self,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<Vec<DailyActivity>> {
        self.timeline(range, project, TimelineGranularity::Day)
            .map(|points| {
                points
                    .into_iter()
                    .map(|point| DailyActivity {
                        date: point.period,
                        messages: point.messages,
                        total_tokens: point.total_tokens,
                        total_cost: point.total_cost,
                    })
                    .collect()
            })
    }

    /// Unscoped timelines read the hourly rollups; project scopes read entries.
    pub fn timeline(
        &self,
        range: &DateRange,
        project: Option<&str>,
        granularity: TimelineGranularity,
    ) -> Result<Vec<TimelinePoint>> {
        let sql = match project {
            None => {
                let period = period_expr(granularity, "date");
                format!(
                    r#"
                    SELECT {period} AS period, SUM(message_count), SUM(total_tokens),
                           SUM(total_cost)
                    FROM hourly_aggregates
                    WHERE date BETWEEN ?1 AND ?2 AND ?3 IS NULL
                    GROUP BY period
                    ORDER BY period
                    "#
                )
            }
            Some(_) => {
                let period = period_expr(granularity, "local_date");
                format!(
                    r#"
                    SELECT {period} AS period, COUNT(*), SUM(total_tokens), SUM(cost_usd)
                    FROM message_entries
                    WHERE {SCOPE}
                    GROUP BY period
                    ORDER BY period
                    "#
                )
            }
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![range.from, range.to, project], |row| {
                Ok(TimelinePoint {
                    period: row.get(0)?,
                    messages: get_u64(row, 1)?,
                    total_tokens: get_u64(row, 2)?,
                    total_cost: get_f64(row, 3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn model_distribution(
        &self,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<Vec<ModelUsage>> {
        let sql = format!(
            r#"
            SELECT model, COUNT(*), SUM(input_tokens), SUM(output_tokens),
                   SUM(cache_read_tokens), SUM(cache_write_tokens), SUM(total_tokens),
                   SUM(cost_usd)
            FROM message_entries
            WHERE model IS NOT NULL AND {SCOPE}
            GROUP BY model
            ORDER BY SUM(total_tokens) DESC, model
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![range.from, range.to, project], row_to_model_usage)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Activity per hour of day, always 24 points.
    pub fn hourly_profile(
        &self,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<Vec<HourlyProfilePoint>> {
        let sql = match project {
            None => r#"
                SELECT hour, SUM(message_count), SUM(total_tokens)
                FROM hourly_aggregates
                WHERE date BETWEEN ?1 AND ?2 AND ?3 IS NULL
                GROUP BY hour
                "#
            .to_string(),
            Some(_) => format!(
                r#"
                SELECT local_hour, COUNT(*), SUM(total_tokens)
                FROM message_entries
                WHERE {SCOPE}
                GROUP BY local_hour
                "#
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![range.from, range.to, project], |row| {
                Ok(HourlyProfilePoint {
                    hour: row.get(0)?,
                    messages: get_u64(row, 1)?,
                    total_tokens: get_u64(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(fill_hours(rows))
    }

    pub fn recent_sessions(
        &self,
        range: &DateRange,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        let project = project.map(str::to_string);
        self.session_summaries(
            SCOPE,
            &[&range.from, &range.to, &project],
            "MAX(utc_timestamp) DESC",
            limit,
        )
    }

    pub fn day_details(&self, date: &str, project: Option<&str>) -> Result<DayDetails> {
        let range = DateRange {
            from: date.to_string(),
            to: date.to_string(),
        };
        let totals = self.usage_totals(&range, project)?;
        let sql = format!(
            r#"
            SELECT local_hour, COUNT(*), SUM(total_tokens)
            FROM message_entries
            WHERE {SCOPE}
            GROUP BY local_hour
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let hourly = stmt
            .query_map(params![range.from, range.to, project], |row| {
                Ok(HourlyProfilePoint {
                    hour: row.get(0)?,
                    messages: get_u64(row, 1)?,
                    total_tokens: get_u64(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let models = self.model_distribution(&range, project)?;
        let sessions = self.recent_sessions(&range, project, usize::MAX)?;
        Ok(DayDetails {
            date: date.to_string(),
            totals,
            hourly: fill_hours(hourly),
            models,
            sessions,
        })
    }

    pub fn model_details(
        &self,
        model: &str,
        range: &DateRange,
        project: Option<&str>,
    ) -> Result<ModelDetails> {
        let sql = format!(
            "SELECT {TOTALS_COLUMNS} FROM message_entries WHERE {SCOPE} AND model = ?4"
        );
        let totals = self.conn.query_row(
            &sql,
            params![range.from, range.to, project, model],
            row_to_totals,
        )?;
        let sql = format!(
            r#"
            SELECT local_date, COUNT(*), SUM(total_tokens), SUM(cost_usd)
            FROM message_entries
            WHERE {SCOPE} AND model = ?4
            GROUP BY local_date
            ORDER BY local_date
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let daily = stmt
            .query_map(params![range.from, range.to, project, model], |row| {
                Ok(DailyActivity {
                    date: row.get(0)?,
                    messages: get_u64(row, 1)?,
                    total_tokens: get_u64(row, 2)?,
                    total_cost: get_f64(row, 3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let project = project.map(str::to_string);
        let model_param = model.to_string();
        let top_sessions = self.session_summaries(
            &format!("{SCOPE} AND model = ?4"),
            &[&range.from, &range.to, &project, &model_param],
            "SUM(total_tokens) DESC",
            TOP_SESSIONS_LIMIT,
        )?;
        Ok(ModelDetails {
            model: model.to_string(),
            totals,
            daily,
            top_sessions,
        })
    }

    pub fn session_details(&self, session_id: &str) -> Result<Option<SessionDetails>> {
        let session = session_id.to_string();
        let Some(summary) = self
            .session_summaries("session_id = ?1", &[&session], "MIN(utc_timestamp)", 1)?
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let sql = format!("SELECT {TOTALS_COLUMNS} FROM message_entries WHERE session_id = ?1");
        let totals = self
            .conn
            .query_row(&sql, params![session_id], row_to_totals)?;
        let mut stmt = self.conn.prepare(
            r#"
            SELECT local_timestamp, model, input_tokens, output_tokens, cache_read_tokens,
                   cache_write_tokens, total_tokens, cost_usd
            FROM message_entries
            WHERE session_id = ?1
            ORDER BY utc_timestamp, identity_key
            "#,
        )?;
        let messages = stmt
            .query_map(params![session_id], |row| {
                Ok(SessionMessage {
                    local_timestamp: row.get(0)?,
                    model: row.get(1)?,
                    input_tokens: get_u64(row, 2)?,
                    output_tokens: get_u64(row, 3)?,
                    cache_read_tokens: get_u64(row, 4)?,
                    cache_write_tokens: get_u64(row, 5)?,
                    total_tokens: get_u64(row, 6)?,
                    cost_usd: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some(SessionDetails {
            summary,
            totals,
            messages,
        }))
    }

    fn session_summaries(
        &self,
        filter: &str,
        params: &[&dyn ToSql],
        order: &str,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            r#"
            SELECT m.session_id, MAX(m.project_id),
                   (SELECT latest.model FROM message_entries latest
                    WHERE latest.session_id = m.session_id AND latest.model IS NOT NULL
                    ORDER BY latest.utc_timestamp DESC LIMIT 1),
                   MIN(m.local_timestamp), MAX(m.local_timestamp), COUNT(*),
                   SUM(m.total_tokens), SUM(m.cost_usd)
            FROM message_entries m
            WHERE m.session_id IS NOT NULL AND {filter}
            GROUP BY m.session_id
            ORDER BY {order}
            LIMIT {limit}
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, row_to_session_summary)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn fill_hours(points: Vec<HourlyProfilePoint>) -> Vec<HourlyProfilePoint> {
    let mut filled: Vec<HourlyProfilePoint> = (0..24)
        .map(|hour| HourlyProfilePoint {
            hour,
            messages: 0,
            total_tokens: 0,
        })
        .collect();
    for point in points {
        if let Some(slot) = filled.get_mut(point.hour as usize) {
            *slot = point;
        }
    }
    filled
}
