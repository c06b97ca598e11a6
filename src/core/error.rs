//! Error types for the ingestion pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for point-cloud ingestion
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported file header. Fails only the affected file.
    #[error("invalid header in {}: {reason}", path.display())]
    Header { path: PathBuf, reason: String },

    /// Point, batch or file count would exceed the arena's hard ceiling.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// The decoder has no implementation for this source format.
    #[error("unsupported point-cloud format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("arena error: {0}")]
    Arena(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("worker error: {0}")]
    Worker(String),
}

impl Error {
    pub(crate) fn header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Header {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
