//! Embedding provider abstraction and batch orchestration.
//!
//! [`EmbeddingProvider`] is the seam to the remote embedding service; the
//! batcher ([`embed_texts`]) partitions input into bounded batches,
//! dispatches them concurrently, and merges results back in input order.
//! A failure on any batch fails the whole call — callers must never see a
//! half-embedded chunk set.
//!
//! The concrete [`OpenAiEmbeddings`] provider calls the OpenAI embeddings
//! API with bounded retries and exponential backoff:
//! - HTTP 429 and 5xx → retry (1s, 2s, 4s, ... capped at 32s)
//! - other 4xx → fail immediately
//! - network errors → retry

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;
use crate::models::Passage;

/// A remote service that turns texts into fixed-length vectors.
///
/// Implementations must preserve input order and length: `output[i]` is
/// the embedding of `texts[i]`, and `output.len() == texts.len()`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed one batch of texts. Raises on provider error.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed an ordered list of texts in batches of at most `batch_size`.
///
/// Batches are dispatched concurrently; the merged output preserves input
/// order regardless of completion order. If any batch fails, the whole
/// call fails with an [`PipelineError::EmbeddingFailure`] naming the
/// offending input range and no vectors are returned.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, PipelineError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batch_size.max(1);

    let batches = texts.chunks(batch_size).enumerate().map(|(i, batch)| {
        let start = i * batch_size;
        let end = start + batch.len();
        async move {
            let vectors = provider
                .embed_batch(batch)
                .await
                .map_err(|source| PipelineError::EmbeddingFailure { start, end, source })?;
            if vectors.len() != batch.len() {
                return Err(PipelineError::EmbeddingFailure {
                    start,
                    end,
                    source: anyhow::anyhow!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    ),
                });
            }
            debug!(start, end, "embedded batch");
            Ok(vectors)
        }
    });

    let results = try_join_all(batches).await?;
    Ok(results.into_iter().flatten().collect())
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, PipelineError> {
    let vectors = embed_texts(provider, &[text.to_string()], 1).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::EmbeddingFailure {
            start: 0,
            end: 1,
            source: anyhow::anyhow!("empty embedding response"),
        })
}

/// Attach embeddings to a list of passages, preserving every other field.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    mut passages: Vec<Passage>,
    batch_size: usize,
) -> Result<Vec<Passage>, PipelineError> {
    if passages.is_empty() {
        return Ok(passages);
    }

    let texts: Vec<String> = passages.iter().map(|p| p.content.clone()).collect();
    let vectors = embed_texts(provider, &texts, batch_size).await?;

    for (passage, vector) in passages.iter_mut().zip(vectors) {
        passage.embedding = Some(vector);
    }
    Ok(passages)
}

// ============ OpenAI Provider ============

/// Embedding provider backed by the OpenAI embeddings API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/v1/embeddings", self.api_base))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json, texts.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
    }
}

/// Parse the embeddings API response, restoring input order via the
/// per-item `index` field.
fn parse_embeddings_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing data array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    if indexed.len() != expected {
        bail!(
            "embeddings response has {} items, expected {}",
            indexed.len(),
            expected
        );
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
