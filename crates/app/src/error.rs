use ingest::{IngestError, ProjectStoreError, SnapshotError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("db error: {0}")]
    Db(#[from] usage_db::DbError),
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<ProjectStoreError> for AppError {
    fn from(err: ProjectStoreError) -> Self {
        match err {
            ProjectStoreError::UnknownProject(project_id) => {
                AppError::NotFound(format!("project not found: {project_id}"))
            }
            ProjectStoreError::InvalidField(message) => AppError::InvalidInput(message),
            other => AppError::Ingest(IngestError::Projects(other)),
        }
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let (status, code) = match &err {
            AppError::InvalidInput(_) => (400, Some("invalid_input".to_string())),
            AppError::NotFound(_) => (404, Some("not_found".to_string())),
            AppError::Db(usage_db::DbError::Integrity(_))
            | AppError::Ingest(IngestError::Db(usage_db::DbError::Integrity(_)))
            | AppError::Ingest(IngestError::Projects(ProjectStoreError::Corrupted { .. })) => {
                (500, Some("rebuild_required".to_string()))
            }
            AppError::Db(_)
            | AppError::Ingest(_)
            | AppError::Io(_)
            | AppError::Serde(_)
            | AppError::Message(_) => (500, None),
        };
        Self {
            status,
            message: err.to_string(),
            code,
        }
    }
}
