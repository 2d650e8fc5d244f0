use std::path::PathBuf;

use thiserror::Error;

/// Central error type for the stem-dataset-core crate.
#[derive(Debug, Error)]
pub enum DatasetError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Construction-time configuration problems, never retried
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest not found: {}", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("Index {idx} out of range for dataset of length {len}")]
    IndexOutOfRange { idx: usize, len: usize },

    #[error("Datasets are not built yet, call setup() first")]
    NotSetUp,

    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Resample error: {0}")]
    Resample(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatasetError {
    pub fn config(msg: impl Into<String>) -> Self {
        DatasetError::Config(msg.into())
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DatasetError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rubato::ResampleError> for DatasetError {
    fn from(e: rubato::ResampleError) -> Self {
        DatasetError::Resample(e.to_string())
    }
}

impl From<rubato::ResamplerConstructionError> for DatasetError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        DatasetError::Resample(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
