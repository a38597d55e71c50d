//! Error types for the forecast store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for forecast store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the forecast store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A write would leave a partial forecast hierarchy behind.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// An expected singleton row is absent.
    #[error("Not found: {0}")]
    NotFound(&'static str),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored value could not be decoded.
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}
