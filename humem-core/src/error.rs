//! Error types for the humem core library.

use thiserror::Error;

use crate::types::Tier;

/// Top-level error type for all humem operations.
#[derive(Error, Debug)]
pub enum HumemError {
    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A similarity index rejected or failed an operation.
    #[error("Index error on {tier}: {message}")]
    Index {
        /// Tier whose collection failed.
        tier: Tier,
        /// What went wrong.
        message: String,
    },

    /// A background worker or blocking task failed to complete.
    #[error("Worker error: {0}")]
    Worker(String),

    /// The engine was constructed outside of a tokio runtime.
    #[error("No tokio runtime available; the memory engine must be opened inside a runtime")]
    NoRuntime,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for HumemError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for HumemError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, HumemError>;
