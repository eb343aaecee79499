use std::collections::BTreeSet;
use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};

use chrono::{Local, SecondsFormat, TimeZone};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use usage_core::{
    FileStatus, FileTrack, MessageEntry, TokenUsage, UNKNOWN_PROJECT, project_id_from_path,
};
use usage_db::Db;

use crate::changes::detect_changes;
use crate::parser::{FileRecords, SourceContext, parse_reader_in};
use crate::projects::ProjectStore;
use crate::scan::discover_log_files;
use crate::types::{IngestIssue, IngestStats, Result};

/// Set to any value to log per-file and total parse/db timings.
pub const TIMING_ENV: &str = "COMMAND_CENTER_INGEST_TIMING";

/// Prices entries whose log record carries no cost.
pub trait CostEstimator {
    fn estimate_cost(&self, model: &str, usage: &TokenUsage) -> Option<f64>;
}

#[derive(Clone, Default)]
pub struct IngestRequest<'a> {
    pub roots: Vec<PathBuf>,
    /// Project metadata document to update; `None` leaves project metadata alone.
    pub projects_path: Option<PathBuf>,
    pub force_rescan: bool,
    pub verbose: bool,
    pub cost_estimator: Option<&'a dyn CostEstimator>,
}

impl IngestRequest<'_> {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }
}

struct ParsedFile {
    status: FileStatus,
    file_path: String,
    outcome: io::Result<FileRecords>,
    parse_duration: StdDuration,
}

fn parse_file<Z, O, R>(status: FileStatus, roots: &[PathBuf], zone: &Z, open: &O) -> ParsedFile
where
    Z: TimeZone,
    O: Fn(&Path) -> io::Result<R>,
    R: BufRead,
{
    let start = Instant::now();
    let file_path = status.path.to_string_lossy().to_string();
    let ctx = SourceContext {
        source_file: file_path.clone(),
        project_id: project_id_from_path(&status.path, roots),
    };
    let outcome = open(&status.path).and_then(|reader| parse_reader_in(reader, &ctx, zone));
    ParsedFile {
        status,
        file_path,
        outcome,
        parse_duration: start.elapsed(),
    }
}

fn apply_cost_estimates(entries: &mut [MessageEntry], estimator: &dyn CostEstimator) {
    for entry in entries.iter_mut().filter(|entry| entry.cost_usd.is_none()) {
        if let Some(model) = entry.model.as_deref() {
            entry.cost_usd = estimator.estimate_cost(model, &entry.usage);
        }
    }
}

/// One incremental (or forced) ingestion run in the process-local timezone.
pub fn ingest(db: &mut Db, request: &IngestRequest<'_>) -> Result<IngestStats> {
    ingest_in(db, request, &Local)
}

/// Discovers, selects, parses and commits log files, then recomputes exactly
/// the rollups the committed entries touch.
///
/// Files are parsed in parallel; every database write happens serially on
/// `db`. A file is committed as a unit with its tracking row and its pending
/// rollup markers, so an aborted run resumes with the files it never
/// committed and still rebuilds the hours of the ones it did. Unreadable
/// files are skipped and reported in [`IngestStats::issues`].
pub fn ingest_in<Z>(db: &mut Db, request: &IngestRequest<'_>, zone: &Z) -> Result<IngestStats>
where
    Z: TimeZone + Sync,
{
    ingest_with(db, request, zone, |path: &Path| {
        File::open(path).map(BufReader::new)
    })
}

pub(crate) fn ingest_with<Z, O, R>(
    db: &mut Db,
    request: &IngestRequest<'_>,
    zone: &Z,
    open: O,
) -> Result<IngestStats>
where
    Z: TimeZone + Sync,
    O: Fn(&Path) -> io::Result<R> + Sync,
    R: BufRead,
{
    let timing_enabled = env::var(TIMING_ENV).is_ok();
    let ingest_start = Instant::now();
    let mut stats = IngestStats::default();

    let (files, issues) = discover_log_files(&request.roots);
    stats.files_discovered = files.len();
    stats.issues.extend(issues);

    let tracked = db.file_tracks()?;
    let selected: Vec<FileStatus> = detect_changes(&files, &tracked)
        .into_iter()
        .filter(|status| request.force_rescan || status.needs_processing())
        .collect();
    debug!(
        discovered = stats.files_discovered,
        selected = selected.len(),
        force = request.force_rescan,
        "log files selected"
    );

    let roots = request.roots.as_slice();
    let parsed_files = selected
        .into_par_iter()
        .map(|status| parse_file(status, roots, zone, &open))
        .collect::<Vec<_>>();

    let scanned_at = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    let mut projects: BTreeSet<String> = BTreeSet::new();
    let mut parse_total = StdDuration::ZERO;
    let mut db_total = StdDuration::ZERO;

    for parsed in parsed_files {
        parse_total += parsed.parse_duration;
        let records = match parsed.outcome {
            Ok(records) => records,
            Err(err) => {
                warn!(file = %parsed.file_path, error = %err, "skipping unreadable log file");
                stats.files_skipped += 1;
                stats.issues.push(IngestIssue {
                    file_path: parsed.file_path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        let FileRecords {
            mut entries,
            limits,
            lines_skipped,
            limits_dropped,
        } = records;
        if let Some(estimator) = request.cost_estimator {
            apply_cost_estimates(&mut entries, estimator);
        }
        projects.extend(entries.iter().map(|entry| entry.project_id.clone()));

        let track = FileTrack {
            path: parsed.file_path.clone(),
            mtime_ns: parsed.status.mtime_ns,
            size_bytes: parsed.status.size_bytes,
            last_scanned: scanned_at.clone(),
            entry_count: i64::try_from(entries.len()).unwrap_or(i64::MAX),
        };
        let db_start = Instant::now();
        let commit = db.commit_file(&track, &entries, &limits)?;
        let db_elapsed = db_start.elapsed();
        db_total += db_elapsed;

        stats.files_processed += 1;
        stats.entries_parsed += entries.len();
        stats.entries_inserted += commit.entries_inserted;
        stats.limit_events_inserted += commit.limit_events_inserted;
        stats.limit_events_dropped += limits_dropped;
        stats.lines_skipped += lines_skipped;

        if timing_enabled {
            info!(
                file = %parsed.file_path,
                parse_ms = parsed.parse_duration.as_millis() as u64,
                db_ms = db_elapsed.as_millis() as u64,
                entries = entries.len(),
                "ingest file timing"
            );
        }
    }

    let db_start = Instant::now();
    let recomputed = db.recompute_pending_rollups()?;
    db_total += db_start.elapsed();
    stats.hours_recomputed = recomputed.hours;
    stats.years_recomputed = recomputed.years;

    projects.remove(UNKNOWN_PROJECT);
    stats.projects_seen = projects.len();
    if let Some(path) = &request.projects_path
        && !projects.is_empty()
    {
        let mut store = ProjectStore::load(path)?;
        let created = store.auto_discover(projects.iter().map(String::as_str), &scanned_at);
        store.save()?;
        debug!(projects = projects.len(), created, "project metadata updated");
    }

    if request.verbose {
        info!(
            discovered = stats.files_discovered,
            processed = stats.files_processed,
            skipped = stats.files_skipped,
            entries = stats.entries_inserted,
            limits = stats.limit_events_inserted,
            dropped_limits = stats.limit_events_dropped,
            bad_lines = stats.lines_skipped,
            hours = stats.hours_recomputed,
            issues = stats.issues.len(),
            "ingest finished"
        );
        for issue in &stats.issues {
            info!(file = %issue.file_path, message = %issue.message, "ingest issue");
        }
    }
    if timing_enabled {
        info!(
            files = stats.files_processed,
            parse_ms = parse_total.as_millis() as u64,
            db_ms = db_total.as_millis() as u64,
            total_ms = ingest_start.elapsed().as_millis() as u64,
            "ingest total timing"
        );
    }
    Ok(stats)
}

/// Incremental run; returns the number of files processed.
pub fn run(db: &mut Db, request: &IngestRequest<'_>) -> Result<usize> {
    Ok(ingest(db, request)?.files_processed)
}

/// Clears every table (file tracking included) and re-ingests everything.
pub fn rebuild(db: &mut Db, request: &IngestRequest<'_>) -> Result<IngestStats> {
    rebuild_in(db, request, &Local)
}

pub fn rebuild_in<Z>(db: &mut Db, request: &IngestRequest<'_>, zone: &Z) -> Result<IngestStats>
where
    Z: TimeZone + Sync,
{
    db.reset_all()?;
    let forced = IngestRequest {
        force_rescan: true,
        ..request.clone()
    };
    ingest_in(db, &forced, zone)
}
