use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeirError {
    #[error("Failed to download dataset {dataset}: {reason}")]
    Download { dataset: String, reason: String },
    #[error("Failed to extract archive {}: {reason}", path.display())]
    Extract { path: PathBuf, reason: String },
    #[error("corpus.jsonl not found in {}; found files: {found:?}", path.display())]
    MissingArtifact { path: PathBuf, found: Vec<String> },
    #[error("Invalid dataset name: {0:?}")]
    InvalidDatasetName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BeirError>;
