//! Error types for the loader module

use crate::error::Error as CrateError;
use crate::store::DbError;
use thiserror::Error;

/// Error type for bulk load operations
#[derive(Debug, Error)]
pub enum LoadError {
    /// Base-record source error
    #[error("Source error: {0}")]
    Source(String),

    /// Embedding file error
    #[error("Embedding file error: {0}")]
    Embeddings(String),

    /// Target store error; always fatal for the load
    #[error("Sink error: {0}")]
    Sink(#[from] DbError),

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reader task failure
    #[error("Reader task error: {0}")]
    Task(String),
}

impl From<LoadError> for CrateError {
    fn from(err: LoadError) -> Self {
        CrateError::Load(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LoadError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(format!("Failed to join reader task: {}", err))
    }
}
