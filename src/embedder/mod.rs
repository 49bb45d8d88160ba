//! Embeddings API boundary
//!
//! This module provides the client for the external embedding-generation
//! API: batched text in, one fixed-dimension vector per input out. The
//! upstream service enforces undocumented rate limits and fails
//! transiently; retry handling lives in the client so callers only ever
//! see terminal errors.

mod client;
pub mod error;

pub use client::OpenAiClient;
pub use error::EmbedError;

use std::future::Future;

/// A batched embedding provider.
///
/// The returned vectors are in input order, one per input text. This is the
/// seam the generator is written against, so tests can substitute a local
/// implementation for the hosted API.
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts, returning one vector per text in order
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, EmbedError>> + Send;

    /// Dimensions of the vectors this client produces
    fn ndims(&self) -> usize;
}
