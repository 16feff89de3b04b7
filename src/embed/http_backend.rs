//! OpenAI-compatible HTTP embedding backend

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Embedding client for `POST {url}/v1/embeddings` endpoints
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_retries: u32,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth)
                .map_err(|_| Error::Config("Invalid embedding API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/embeddings", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            dimension: config.dimension,
            max_retries: config.max_retries,
        })
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }

    fn retry_backoff(attempt: u32) -> Duration {
        let capped = attempt.min(5);
        Duration::from_millis(500 * (1 << capped))
    }

    fn parse_embeddings(&self, mut parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        parsed.data.sort_by_key(|row| row.index);

        if parsed.data.len() != expected {
            return Err(Error::Embedding(format!(
                "Backend returned {} embeddings for {} inputs",
                parsed.data.len(),
                expected
            )));
        }

        if let Some(mismatch) = parsed.data.iter().find(|row| row.embedding.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model,
                self.dimension,
                mismatch.embedding.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0u32;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: texts,
            };

            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            Error::Embedding(format!("Failed to parse embedding response: {}", e))
                        })?;
                        debug!("Embedded batch of {} texts", texts.len());
                        return self.parse_embeddings(parsed, texts.len());
                    }

                    let body = resp.text().await.unwrap_or_default();
                    if Self::should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!("Embedding request failed ({}), retry {}", status, attempt);
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(Error::Embedding(format!(
                        "Embedding request failed ({}): {}",
                        status, body
                    )));
                }
                Err(err) => {
                    if Self::is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        warn!("Embedding request error ({}), retry {}", err, attempt);
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(Error::Embedding(err.to_string()));
                }
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}
