use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, Transaction, params};
use tracing::debug;
use usage_core::{DateRange, HourBucket, HourlyAggregate, ModelAggregate};

use crate::Db;
use crate::error::Result;
use crate::helpers::{get_f64, get_u64, row_to_hourly_aggregate, row_to_model_aggregate};
use crate::types::{RollupDrift, RollupRecompute};

impl Db {
    /// Rebuilds exactly the given hourly buckets and model years.
    ///
    /// Each target is deleted and re-derived from `message_entries` inside a
    /// single transaction, so a failure leaves every bucket as it was. Pending
    /// markers for the rebuilt targets are cleared in the same transaction.
    pub fn recompute_rollups(
        &mut self,
        buckets: &BTreeSet<HourBucket>,
        years: &BTreeSet<i32>,
    ) -> Result<RollupRecompute> {
        let tx = self.conn.transaction()?;
        let recompute = recompute_in(&tx, buckets, years)?;
        tx.commit()?;
        debug!(
            hours = recompute.hours,
            years = recompute.years,
            "recomputed rollups"
        );
        Ok(recompute)
    }

    /// Rebuilds every hour and year marked pending by committed files,
    /// including ones left over from a run that failed before its rebuild.
    pub fn recompute_pending_rollups(&mut self) -> Result<RollupRecompute> {
        let tx = self.conn.transaction()?;
        let (buckets, years) = load_pending(&tx)?;
        let recompute = recompute_in(&tx, &buckets, &years)?;
        tx.commit()?;
        debug!(
            hours = recompute.hours,
            years = recompute.years,
            "recomputed pending rollups"
        );
        Ok(recompute)
    }

    /// Hours and years waiting for an aggregate rebuild.
    pub fn pending_rollups(&self) -> Result<(BTreeSet<HourBucket>, BTreeSet<i32>)> {
        load_pending(&self.conn)
    }

    pub fn hourly_aggregates(&self, range: &DateRange) -> Result<Vec<HourlyAggregate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT date, hour, year, month, day,
                   message_count, session_count, total_tokens, total_cost
            FROM hourly_aggregates
            WHERE date BETWEEN ?1 AND ?2
            ORDER BY date, hour
            "#,
        )?;
        let rows = stmt
            .query_map(params![range.from, range.to], row_to_hourly_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn model_aggregates(&self, year: Option<i32>) -> Result<Vec<ModelAggregate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT model, year, message_count, input_tokens, output_tokens,
                   cache_read_tokens, cache_write_tokens, total_tokens, total_cost
            FROM model_aggregates
            WHERE ?1 IS NULL OR year = ?1
            ORDER BY year, total_tokens DESC, model
            "#,
        )?;
        let rows = stmt
            .query_map(params![year], row_to_model_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn top_models(&self, year: i32, limit: usize) -> Result<Vec<ModelAggregate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT model, year, message_count, input_tokens, output_tokens,
                   cache_read_tokens, cache_write_tokens, total_tokens, total_cost
            FROM model_aggregates
            WHERE year = ?1
            ORDER BY total_tokens DESC, model
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![year, limit as i64], row_to_model_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Compares every stored aggregate with a fresh derivation from entries.
    pub fn rollup_drift(&self) -> Result<RollupDrift> {
        let mut drift = RollupDrift::default();

        let mut derived_hours: BTreeMap<(String, u32), (u64, u64, u64, f64)> = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT local_date, local_hour, COUNT(*), COUNT(DISTINCT session_id),
                       SUM(total_tokens), SUM(cost_usd)
                FROM message_entries
                GROUP BY local_date, local_hour
                "#,
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                derived_hours.insert(
                    (row.get(0)?, row.get(1)?),
                    (
                        get_u64(row, 2)?,
                        get_u64(row, 3)?,
                        get_u64(row, 4)?,
                        get_f64(row, 5)?,
                    ),
                );
            }
        }
        let mut stored_hours: BTreeMap<(String, u32), (u64, u64, u64, f64)> = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT date, hour, message_count, session_count, total_tokens, total_cost
                FROM hourly_aggregates
                "#,
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                stored_hours.insert(
                    (row.get(0)?, row.get(1)?),
                    (
                        get_u64(row, 2)?,
                        get_u64(row, 3)?,
                        get_u64(row, 4)?,
                        get_f64(row, 5)?,
                    ),
                );
            }
        }
        let hour_keys: BTreeSet<_> = derived_hours.keys().chain(stored_hours.keys()).collect();
        for key in hour_keys {
            if !same_hour(derived_hours.get(key), stored_hours.get(key)) {
                drift.hourly.push(format!("{} {:02}:00", key.0, key.1));
            }
        }

        let derived_models = self.model_rows(
            r#"
            SELECT model, local_year, COUNT(*), SUM(input_tokens), SUM(output_tokens),
                   SUM(cache_read_tokens), SUM(cache_write_tokens), SUM(total_tokens),
                   SUM(cost_usd)
            FROM message_entries
            WHERE model IS NOT NULL
            GROUP BY model, local_year
            "#,
        )?;
        let stored_models = self.model_rows(
            r#"
            SELECT model, year, message_count, input_tokens, output_tokens,
                   cache_read_tokens, cache_write_tokens, total_tokens, total_cost
            FROM model_aggregates
            "#,
        )?;
        let model_keys: BTreeSet<_> = derived_models.keys().chain(stored_models.keys()).collect();
        for key in model_keys {
            let matches = match (derived_models.get(key), stored_models.get(key)) {
                (Some(derived), Some(stored)) => same_model(derived, stored),
                _ => false,
            };
            if !matches {
                drift.models.push(format!("{} {}", key.0, key.1));
            }
        }
        Ok(drift)
    }

    fn model_rows(&self, sql: &str) -> Result<BTreeMap<(String, i32), ModelAggregate>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], row_to_model_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|row| ((row.model.clone(), row.year), row))
            .collect())
    }
}

fn load_pending(conn: &Connection) -> Result<(BTreeSet<HourBucket>, BTreeSet<i32>)> {
    let mut stmt = conn.prepare("SELECT year, month, day, hour FROM pending_hours")?;
    let buckets = stmt
        .query_map([], |row| {
            Ok(HourBucket {
                year: row.get(0)?,
                month: row.get(1)?,
                day: row.get(2)?,
                hour: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    let mut stmt = conn.prepare("SELECT year FROM pending_years")?;
    let years = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<BTreeSet<i32>, _>>()?;
    Ok((buckets, years))
}

fn recompute_in(
    tx: &Transaction<'_>,
    buckets: &BTreeSet<HourBucket>,
    years: &BTreeSet<i32>,
) -> Result<RollupRecompute> {
    let mut delete_hour = tx.prepare("DELETE FROM hourly_aggregates WHERE date = ?1 AND hour = ?2")?;
    let mut insert_hour = tx.prepare(
        r#"
        INSERT INTO hourly_aggregates (
          date, hour, year, month, day,
          message_count, session_count, total_tokens, total_cost
        )
        SELECT
          local_date, local_hour, ?3, ?4, ?5,
          COUNT(*), COUNT(DISTINCT session_id),
          COALESCE(SUM(total_tokens), 0), COALESCE(SUM(cost_usd), 0.0)
        FROM message_entries
        WHERE local_date = ?1 AND local_hour = ?2
        GROUP BY local_date, local_hour
        "#,
    )?;
    let mut clear_hour = tx.prepare(
        "DELETE FROM pending_hours WHERE year = ?1 AND month = ?2 AND day = ?3 AND hour = ?4",
    )?;
    for bucket in buckets {
        let date = bucket.date();
        delete_hour.execute(params![date, bucket.hour])?;
        insert_hour.execute(params![
            date,
            bucket.hour,
            bucket.year,
            bucket.month,
            bucket.day
        ])?;
        clear_hour.execute(params![bucket.year, bucket.month, bucket.day, bucket.hour])?;
    }

    let mut delete_year = tx.prepare("DELETE FROM model_aggregates WHERE year = ?1")?;
    let mut insert_year = tx.prepare(
        r#"
        INSERT INTO model_aggregates (
          model, year, message_count, input_tokens, output_tokens,
          cache_read_tokens, cache_write_tokens, total_tokens, total_cost
        )
        SELECT
          model, local_year, COUNT(*),
          COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0),
          COALESCE(SUM(cache_read_tokens), 0), COALESCE(SUM(cache_write_tokens), 0),
          COALESCE(SUM(total_tokens), 0), COALESCE(SUM(cost_usd), 0.0)
        FROM message_entries
        WHERE local_year = ?1 AND model IS NOT NULL
        GROUP BY model, local_year
        "#,
    )?;
    let mut clear_year = tx.prepare("DELETE FROM pending_years WHERE year = ?1")?;
    for year in years {
        delete_year.execute(params![year])?;
        insert_year.execute(params![year])?;
        clear_year.execute(params![year])?;
    }
    Ok(RollupRecompute {
        hours: buckets.len(),
        years: years.len(),
    })
}

fn close(left: f64, right: f64) -> bool {
    (left - right).abs() < 1e-9
}

fn same_hour(derived: Option<&(u64, u64, u64, f64)>, stored: Option<&(u64, u64, u64, f64)>) -> bool {
    match (derived, stored) {
        (Some(derived), Some(stored)) => {
            derived.0 == stored.0
                && derived.1 == stored.1
                && derived.2 == stored.2
                && close(derived.3, stored.3)
        }
        _ => false,
    }
}

fn same_model(derived: &ModelAggregate, stored: &ModelAggregate) -> bool {
    derived.message_count == stored.message_count
        && derived.input_tokens == stored.input_tokens
        && derived.output_tokens == stored.output_tokens
        && derived.cache_read_tokens == stored.cache_read_tokens
        && derived.cache_write_tokens == stored.cache_write_tokens
        && derived.total_tokens == stored.total_tokens
        && close(derived.total_cost, stored.total_cost)
}
