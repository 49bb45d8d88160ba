//! HTTP client for an OpenAI-compatible embeddings API.
//!
//! Transient failures (HTTP 429, 5xx, transport errors) are retried with
//! exponential backoff and jitter up to a configured ceiling; anything else
//! is surfaced immediately. A 429 `retry-after` header, when present, seeds
//! the backoff delay.

use rand::{thread_rng, Rng};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

use super::error::EmbedError;
use super::EmbeddingClient;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Backoff delay used when a 429 carries no retry-after header
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

/// Cap on any single backoff delay in seconds
const MAX_BACKOFF_SECS: u64 = 60;

/// Client for the `/v1/embeddings` endpoint
#[derive(Clone)]
pub struct OpenAiClient {
    client: ReqwestClient,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiClient {
    /// Create a client against the given API base URL
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        max_retries: u32,
    ) -> Self {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            max_retries,
        }
    }

    /// Issue one embeddings request, retrying transient failures.
    #[instrument(skip(self, texts), fields(texts = texts.len()))]
    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            let retry_reason = match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbeddingsResponse =
                            response.json().await.map_err(EmbedError::Http)?;
                        return self.validate(parsed, texts.len());
                    }

                    let retry_after = response
                        .headers()
                        .get("retry-after")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    let message = response.text().await.unwrap_or_default();
                    error!("API error: {} - {}", status, message);

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        RetryReason {
                            message: format!("{} - {}", status, message),
                            retry_after,
                        }
                    } else {
                        // Client errors other than 429 will not improve with retries.
                        return Err(EmbedError::Api {
                            status_code: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => RetryReason {
                    message: e.to_string(),
                    retry_after: None,
                },
                Err(e) => return Err(EmbedError::Http(e)),
            };

            if attempts > self.max_retries {
                return Err(EmbedError::RetriesExhausted {
                    attempts,
                    message: retry_reason.message,
                });
            }

            let delay = backoff_delay(attempts, retry_reason.retry_after);
            debug!(
                "Transient embedding failure ({}). Retrying after {:?} (attempt {}/{})",
                retry_reason.message, delay, attempts, self.max_retries
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn validate(
        &self,
        response: EmbeddingsResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if response.data.len() != expected {
            return Err(EmbedError::UnexpectedResponse(format!(
                "requested {} embeddings, received {}",
                expected,
                response.data.len()
            )));
        }

        // The API does not guarantee response order; sort by index.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        for entry in &data {
            if entry.embedding.len() != self.dimensions {
                return Err(EmbedError::UnexpectedResponse(format!(
                    "expected {} dimensions, received {}",
                    self.dimensions,
                    entry.embedding.len()
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

struct RetryReason {
    message: String,
    retry_after: Option<u64>,
}

/// Exponential backoff with jitter: `base * 2^(attempt-1)`, ±20%, capped.
fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    let base = retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS).max(1);
    let exp_factor = u64::pow(2, attempt.saturating_sub(1).min(16));
    let mut delay = base.saturating_mul(exp_factor);

    if delay > 1 {
        let jitter_factor = thread_rng().gen_range(0.8..1.2);
        delay = ((delay as f64) * jitter_factor) as u64;
    }

    Duration::from_secs(delay.min(MAX_BACKOFF_SECS))
}

impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.request_embeddings(texts).await
    }

    fn ndims(&self) -> usize {
        self.dimensions
    }
}
