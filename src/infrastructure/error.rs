use crate::application::placement::PlacementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Placement rejected: {0}")]
    Placement(#[from] PlacementError),
    #[error("Analysis request already in flight")]
    AnalysisBusy,
}
