//! Error types, one enum per failure class.

use std::path::PathBuf;

use thiserror::Error;

/// The document could not be located or fetched.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("PDF not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("download of '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The document exists but its text could not be read.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot open PDF '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("PDF '{}' contains no extractable text", .0.display())]
    NoText(PathBuf),
}

/// The index or metadata artifact could not be written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot create storage directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode '{}': {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

/// Problems reading a serialized vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a vector index file")]
    BadMagic,

    #[error("unsupported index format version {0}")]
    UnsupportedVersion(u32),

    #[error("index file truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Candle model error
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Tokenizer error
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Model file missing or unusable
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Hub download error
    #[error("Failed to download model: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Provider returned a different number of vectors than texts
    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("console error: {0}")]
    Io(#[from] std::io::Error),
}
