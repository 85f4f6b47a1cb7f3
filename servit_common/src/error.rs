//! Error types shared across the ServIt operations crates

use thiserror::Error;

/// Unified error type for ServIt operations
#[derive(Debug, Error)]
pub enum ServitError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to serialize or deserialize a document field
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Price value rejected before it reached the price store
    #[error("Invalid price value: {0}")]
    InvalidPrice(String),

    /// A referenced document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied argument rejected before touching the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result alias for ServIt operations
pub type Result<T> = std::result::Result<T, ServitError>;
