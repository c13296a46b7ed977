//! Common error types for TXdata

use thiserror::Error;

/// Common result type for TXdata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the workbench crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation conflicts with existing state (duplicate name, assigned definition, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored file failed checksum verification
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
