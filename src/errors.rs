//! Error types for ragstation
//!
//! One error enum for the whole retrieval core. Fatal conditions carry
//! enough detail (counts, paths) to diagnose without inspecting internals.
//! Stale search references are never surfaced here: the retriever skips
//! them and counts them in its outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the retrieval core
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Build produced zero blocks
    #[error(
        "Corpus at {root} produced no blocks ({files_seen} files seen, {files_skipped} skipped)"
    )]
    EmptyCorpus {
        root: PathBuf,
        files_seen: usize,
        files_skipped: usize,
    },

    /// Vector dimensionality disagrees with the index
    #[error("Dimension mismatch: index stores {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Snapshot artifacts missing or mutually inconsistent
    #[error("Corrupt snapshot at {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// Vector with zero norm cannot be normalized
    #[error("Vector {index} has zero norm and cannot be normalized")]
    ZeroVector { index: usize },

    /// Embedding backend errors
    #[error("Embedder failed: {0}")]
    EmbedderFailed(String),

    /// Embedding call exceeded its deadline
    #[error("Embedder timed out after {seconds}s")]
    EmbedderTimeout { seconds: u64 },

    /// Language model errors
    #[error("Generator failed: {0}")]
    GeneratorFailed(String),

    /// Language model call exceeded its deadline
    #[error("Generator timed out after {seconds}s")]
    GeneratorTimeout { seconds: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors with the offending path
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetrievalError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RetrievalError::CorruptSnapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for retrieval operations
pub type Result<T> = std::result::Result<T, RetrievalError>;
