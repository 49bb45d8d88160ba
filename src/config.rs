//! # Pipeline Configuration Module
//!
//! Configuration for the embedding ingestion pipeline: API access, batching,
//! concurrency, rate budgets, retry behavior, and flush cadence.
//!
//! Values come from the environment via [`PipelineConfig::from_env`], with
//! defaults suitable for the hosted embeddings API's published free-tier
//! limits. A builder is provided for programmatic construction in tests and
//! embedding the pipeline in other tools.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Default embeddings API base URL (OpenAI-compatible)
pub const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Default embedding model
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Dimensions of the embedding vectors produced by the default model
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Configuration for the ingestion pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// API credential; required for generation and search, not for loading
    pub api_key: Option<String>,

    /// Base URL of the embeddings API
    pub api_base: String,

    /// Embedding model identifier
    pub model: String,

    /// Path of the libSQL database file
    pub db_path: String,

    /// Number of records per embedding request
    pub batch_size: usize,

    /// Maximum concurrently outstanding embedding requests
    pub concurrency: usize,

    /// Request budget per rate window
    pub requests_per_window: u32,

    /// Token budget per rate window
    pub tokens_per_window: u64,

    /// Length of the rate window
    pub window: Duration,

    /// Maximum retry attempts for transient API failures
    pub max_retries: u32,

    /// Flush the output buffer every this many completed batches
    pub flush_every: usize,

    /// Report progress every this many completed batches
    pub progress_every: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            db_path: "promovec.db".to_string(),
            batch_size: 100,
            concurrency: 5,
            requests_per_window: 3000,
            tokens_per_window: 1_000_000,
            window: Duration::from_secs(60),
            max_retries: 5,
            flush_every: 10,
            progress_every: 50,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Build configuration from the environment.
    ///
    /// Recognized variables: `OPENAI_API_KEY`, `PROMOVEC_API_BASE`,
    /// `PROMOVEC_MODEL`, `PROMOVEC_DB`, `PROMOVEC_BATCH_SIZE`,
    /// `PROMOVEC_CONCURRENCY`, `PROMOVEC_REQUESTS_PER_MINUTE`,
    /// `PROMOVEC_TOKENS_PER_MINUTE`, `PROMOVEC_MAX_RETRIES`,
    /// `PROMOVEC_FLUSH_EVERY`, `PROMOVEC_PROGRESS_EVERY`.
    ///
    /// Malformed numeric values fall back to the default with a warning;
    /// a missing credential is only an error once a component that needs
    /// it asks via [`PipelineConfig::require_api_key`].
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            api_base: std::env::var("PROMOVEC_API_BASE").unwrap_or(defaults.api_base),
            model: std::env::var("PROMOVEC_MODEL").unwrap_or(defaults.model),
            db_path: std::env::var("PROMOVEC_DB").unwrap_or(defaults.db_path),
            batch_size: env_parsed("PROMOVEC_BATCH_SIZE", defaults.batch_size),
            concurrency: env_parsed("PROMOVEC_CONCURRENCY", defaults.concurrency),
            requests_per_window: env_parsed(
                "PROMOVEC_REQUESTS_PER_MINUTE",
                defaults.requests_per_window,
            ),
            tokens_per_window: env_parsed(
                "PROMOVEC_TOKENS_PER_MINUTE",
                defaults.tokens_per_window,
            ),
            window: defaults.window,
            max_retries: env_parsed("PROMOVEC_MAX_RETRIES", defaults.max_retries),
            flush_every: env_parsed("PROMOVEC_FLUSH_EVERY", defaults.flush_every),
            progress_every: env_parsed("PROMOVEC_PROGRESS_EVERY", defaults.progress_every),
        }
    }

    /// Return the API credential or a fatal configuration error
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY environment variable not set".to_string()))
    }
}

fn env_parsed<T: std::str::FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring malformed {}={:?}; using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Set the API credential
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Set the API base URL
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.config.api_base = api_base.into();
        self
    }

    /// Set the embedding model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the database path
    pub fn db_path(mut self, db_path: impl Into<String>) -> Self {
        self.config.db_path = db_path.into();
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the request concurrency
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Set the per-window request budget
    pub fn requests_per_window(mut self, requests: u32) -> Self {
        self.config.requests_per_window = requests;
        self
    }

    /// Set the per-window token budget
    pub fn tokens_per_window(mut self, tokens: u64) -> Self {
        self.config.tokens_per_window = tokens;
        self
    }

    /// Set the rate window length
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Set the retry ceiling
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set the flush interval in batches
    pub fn flush_every(mut self, flush_every: usize) -> Self {
        self.config.flush_every = flush_every;
        self
    }

    /// Set the progress interval in batches
    pub fn progress_every(mut self, progress_every: usize) -> Self {
        self.config.progress_every = progress_every;
        self
    }

    /// Build the configuration
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.window, Duration::from_secs(60));
        assert!(config.api_key.is_none());
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .api_key("test-key")
            .api_base("http://localhost:9999")
            .batch_size(16)
            .concurrency(2)
            .requests_per_window(10)
            .tokens_per_window(1000)
            .max_retries(3)
            .flush_every(2)
            .progress_every(4)
            .build();

        assert_eq!(config.require_api_key().unwrap(), "test-key");
        assert_eq!(config.api_base, "http://localhost:9999");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.requests_per_window, 10);
        assert_eq!(config.tokens_per_window, 1000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.flush_every, 2);
        assert_eq!(config.progress_every, 4);
    }
}
