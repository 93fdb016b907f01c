use providers::ProviderError;
use std::path::PathBuf;
use storage::StorageError;
use thiserror::Error;

/// Failures reading or rendering one media file.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("document {0:?} is password protected")]
    Protected(PathBuf),
    #[error("document {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("page {page} out of range for {path:?} ({count} pages)")]
    PageOutOfRange {
        path: PathBuf,
        page: usize,
        count: usize,
    },
    #[error("no page renderer available for {0:?}")]
    Unsupported(PathBuf),
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("engine unavailable: {0}")]
    Engine(#[source] ProviderError),
    #[error("inference failed: {0}")]
    Inference(#[source] ProviderError),
    #[error("engine returned confidence {0} outside [0, 1]")]
    InvalidConfidence(f32),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-file failure; logged and skipped by the pipeline.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Conditions that make a whole scan meaningless.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no media folder could be read: {0}")]
    NoAccessibleRoots(String),
    #[error("directory walk aborted: {0}")]
    Walk(String),
    #[error("invalid exclude pattern: {0}")]
    Exclude(#[from] globset::Error),
}
