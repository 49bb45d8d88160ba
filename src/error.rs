//! Error types for the promovec crate

use thiserror::Error;

/// Result type for promovec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for promovec operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API error
    #[error("Embedding error: {0}")]
    Embed(String),

    /// Embedding generation error
    #[error("Generation error: {0}")]
    Generate(String),

    /// Bulk load error
    #[error("Load error: {0}")]
    Load(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
