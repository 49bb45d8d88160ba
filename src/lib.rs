//! # promovec - Embedding Ingestion Pipeline for Promotion Analytics
//!
//! This crate ingests the unified promo-product dataset, derives a
//! fixed-dimension embedding for every record through a rate-limited
//! external API, and bulk-loads the joined rows into a vector-indexed
//! libSQL store, resuming cleanly after any interruption.
//!
//! ## Features
//!
//! - Dual-budget rate scheduling (request count and token weight per
//!   window, plus an in-flight cap)
//! - Batched embedding generation with retry, backoff, and incremental
//!   durable output
//! - Checkpointed, idempotent resume after a crash or manual stop
//! - Streaming, backpressure-aware bulk loading joined by composite key
//! - Cosine-similarity search over the loaded vectors
//! - Async API with Tokio
//! - Structured logging with tracing
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use promovec::config::PipelineConfig;
//! use promovec::embedder::OpenAiClient;
//! use promovec::generator::{CheckpointStore, Generator, OutputFile};
//! use promovec::scheduler::RateScheduler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_env();
//!     let client = OpenAiClient::new(
//!         &config.api_base,
//!         config.require_api_key()?,
//!         &config.model,
//!         promovec::config::EMBEDDING_DIMENSIONS,
//!         config.max_retries,
//!     );
//!     let scheduler = Arc::new(RateScheduler::new(
//!         config.requests_per_window,
//!         config.tokens_per_window,
//!         config.concurrency,
//!         config.window,
//!     ));
//!
//!     let generator = Generator::new(
//!         client,
//!         scheduler,
//!         config.batch_size,
//!         config.concurrency,
//!         config.flush_every,
//!         config.progress_every,
//!     );
//!     let output = OutputFile::new("embeddings.csv");
//!     let checkpoint = CheckpointStore::new("checkpoint.json");
//!     let summary = generator
//!         .run("unified_promo_products.csv".as_ref(), &output, &checkpoint)
//!         .await?;
//!     println!("{} rows embedded", summary.rows_embedded);
//!     Ok(())
//! }
//! ```

pub mod config;
mod error;

// Pipeline modules
pub mod embedder;
pub mod generator;
pub mod loader;
pub mod scheduler;
pub mod store;

pub use error::Error;

/// Re-export of common types for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
