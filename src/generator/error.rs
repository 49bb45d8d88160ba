//! Error types for the generator module

use crate::embedder::EmbedError;
use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for embedding generation
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Embedding API failure after retries
    #[error("Embedding API error: {0}")]
    Embed(#[from] EmbedError),

    /// Source CSV parsing error
    #[error("Input error: {0}")]
    Input(String),

    /// Output file error
    #[error("Output error: {0}")]
    Output(String),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<GenerateError> for CrateError {
    fn from(err: GenerateError) -> Self {
        CrateError::Generate(err.to_string())
    }
}
