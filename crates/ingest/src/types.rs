use serde::Serialize;
use std::io;
use std::path::PathBuf;

/// Summary returned after one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub entries_parsed: usize,
    pub entries_inserted: usize,
    pub limit_events_inserted: usize,
    pub limit_events_dropped: usize,
    pub lines_skipped: usize,
    pub hours_recomputed: usize,
    pub years_recomputed: usize,
    pub projects_seen: usize,
    pub issues: Vec<IngestIssue>,
}

/// Non-fatal issues encountered during ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub file_path: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectStoreError {
    #[error("failed to access project metadata {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "project metadata {path} is corrupted ({source}); repair or remove it and run a full rebuild"
    )]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error("invalid project field: {0}")]
    InvalidField(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid snapshot json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot must be a JSON object")]
    NotAnObject,
}

/// Errors emitted by the ingest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("db error: {0}")]
    Db(#[from] usage_db::DbError),
    #[error(transparent)]
    Projects(#[from] ProjectStoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
