use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("file not found: {}. {hint}", path.display())]
    NotFound { path: PathBuf, hint: String },

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("failed to load model from {uri}: {reason}")]
    ModelLoad { uri: String, reason: String },

    #[error("invalid training spec: {0}")]
    InvalidSpec(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("tracking error: {0}")]
    Tracking(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    pub(crate) fn model_load(uri: impl ToString, reason: impl ToString) -> Self {
        Self::ModelLoad { uri: uri.to_string(), reason: reason.to_string() }
    }
}
