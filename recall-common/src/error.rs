//! Common error types for the recall alert pipeline

use thiserror::Error;

/// Common result type for recall pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the pipeline crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// True for missing or malformed configuration
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
