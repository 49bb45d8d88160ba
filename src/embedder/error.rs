//! Error types for the embedder module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for embedding API operations
#[derive(Debug, Error)]
pub enum EmbedError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },

    /// Retry ceiling reached without a successful response
    #[error("Retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last error observed
        message: String,
    },

    /// Response did not match the request shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<EmbedError> for CrateError {
    fn from(err: EmbedError) -> Self {
        CrateError::Embed(err.to_string())
    }
}
