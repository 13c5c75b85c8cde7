use crate::db::DbError;
use thiserror::Error;

/// Failure of one stage of the hot-swap sequence.
#[derive(Error, Debug)]
pub enum HotUpdateError {
    #[error("failed to create a temp dir: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("failed to download vulnerability DB: {0}")]
    Download(#[source] DbError),

    #[error("downloaded DB cannot be opened: {0}")]
    Verify(#[source] DbError),

    #[error("failed to back up the live DB: {0}")]
    Backup(#[source] DbError),

    #[error("failed to close DB: {0}")]
    Close(#[source] DbError),

    #[error("failed to copy the database file: {0}")]
    Replace(#[source] DbError),

    #[error("unable to update database metadata: {0}")]
    UpdateMetadata(#[source] DbError),

    #[error("failed to open DB: {0}")]
    Open(#[source] DbError),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to check if db needs an update: {0}")]
    CheckUpdate(#[source] DbError),

    #[error("failed DB hot update: {0}")]
    HotUpdate(#[from] HotUpdateError),

    #[error("update gauge is not initialized")]
    GaugeUninitialized,

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    MetricsEncoding(String),

    #[error("failed to initialize metrics from database metadata: {0}")]
    Seed(#[source] DbError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
