//! Error types for trainlog-store

use thiserror::Error;

/// Result type alias using trainlog-store's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trainlog-store operations
#[derive(Error, Debug)]
pub enum Error {
    /// The embedded store could not be opened or migrated; nothing else may run
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A service method was called before `initialize()`
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A record with the same `(user_id, natural_key)` already exists
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote sync failure, recorded per-record rather than surfaced to callers
    #[error("Sync error: {0}")]
    Sync(String),
}
