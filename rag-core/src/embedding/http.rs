//! HTTP-backed [`EmbeddingClient`] with exponential-ish retry/backoff.
//!
//! Delay grows as `base_delay_ms * 2^attempt`; retriable statuses are 5xx
//! and network errors, 4xx is never retried.

use super::provider::{EmbeddingClient, EmbeddingMetrics};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`HttpEmbeddingClient`].
#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    /// Base URL of the embeddings endpoint (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Declared output dimensionality, if known.
    pub dimension: Option<usize>,
    /// Maximum attempts per `embed` call, including the first (>= 3).
    pub max_attempts: u32,
    /// Base delay for the backoff curve, in milliseconds.
    pub base_delay_ms: u64,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimension: None,
            max_attempts: 3,
            base_delay_ms: 250,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// Remote embedding API client with retry/backoff.
pub struct HttpEmbeddingClient {
    config: HttpEmbeddingConfig,
    http: reqwest::Client,
    metrics: EmbeddingMetrics,
}

impl HttpEmbeddingClient {
    /// Construct a client from config.
    ///
    /// # Errors
    /// Returns [`Error::EmbeddingUnavailable`] if `api_key` is empty.
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::EmbeddingUnavailable(
                "missing embedding API credentials".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::External(e.into()))?;
        Ok(Self {
            config,
            http,
            metrics: EmbeddingMetrics::default(),
        })
    }

    /// Access the call-outcome counters.
    #[must_use]
    pub fn metrics(&self) -> &EmbeddingMetrics {
        &self.metrics
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::EmbeddingTransient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::EmbeddingTransient(format!("http {status}")));
        }
        if status.is_client_error() {
            return Err(Error::EmbeddingFatal(format!("http {status}")));
        }
        if !status.is_success() {
            return Err(Error::EmbeddingTransient(format!("http {status}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFatal(format!("invalid response body: {e}")))?;

        let mut ordered = vec![Vec::new(); texts.len()];
        for datum in parsed.data {
            if let Some(slot) = ordered.get_mut(datum.index) {
                *slot = datum.embedding;
            }
        }
        Ok(ordered)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.metrics.record_attempt();

        let max_attempts = self.config.max_attempts.max(3);
        let mut last_err = Error::EmbeddingTransient("no attempts made".to_string());

        for attempt in 0..max_attempts {
            if attempt > 0 {
                self.metrics.record_retry();
                let delay_ms = self.config.base_delay_ms * 2u64.pow(attempt - 1);
                tracing::debug!(attempt, delay_ms, "retrying embedding request");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.request_once(texts).await {
                Ok(result) => return Ok(result),
                Err(err @ Error::EmbeddingFatal(_)) => {
                    self.metrics.record_failure();
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "embedding request failed");
                    last_err = err;
                }
            }
        }

        self.metrics.record_failure();
        Err(last_err)
    }

    fn dimension(&self) -> Option<usize> {
        self.config.dimension
    }
}
