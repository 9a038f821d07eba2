use std::path::PathBuf;

use thiserror::Error;

/// Every failure the ingestion and retrieval core can surface.
///
/// Each failed call returns exactly one of these; callers display them
/// as-is. `EmptyIndex` is the only variant the retriever swallows.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("No document has been indexed yet")]
    EmptyIndex,

    #[error("Index write failed: {0}")]
    IndexWrite(String),

    #[error("Index read failed: {0}")]
    IndexRead(String),

    #[error("Vector dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index was built with embedder '{indexed}' but queried with '{query}'")]
    EmbedderMismatch { indexed: String, query: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
