//! Vector index client.
//!
//! [`VectorIndex`] is the seam to the similarity-search service; the
//! concrete [`QdrantIndex`] talks to Qdrant's REST API over reqwest. The
//! collection is shared infrastructure: every write and delete is scoped
//! by `document_id`, so concurrent writers touching other documents are
//! tolerated by construction.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::VectorConfig;
use crate::error::PipelineError;
use crate::models::{Passage, RetrievalHit};

/// Scope of a similarity search.
///
/// Modeled as a sum type rather than a nullable parameter so both code
/// paths stay explicit and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFilter {
    /// Search across all documents.
    All,
    /// Restrict hits to one document's points.
    Document(i64),
}

/// Best-effort collection statistics.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_points: u64,
    pub vector_size: u64,
    pub distance: String,
}

/// The vector store seam used by both pipelines.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently create the named collection (cosine distance, fixed
    /// dimensionality). Called once at startup, not per request.
    async fn ensure_collection(&self) -> Result<(), PipelineError>;

    /// Write one point per passage and return the fresh point ids in
    /// input order. Every passage must already carry an embedding.
    async fn upsert(
        &self,
        document_id: i64,
        passages: &[Passage],
    ) -> Result<Vec<String>, PipelineError>;

    /// Nearest-neighbor search, descending by score. `score_threshold` is
    /// an inclusive lower bound; an empty result is a valid outcome.
    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: SearchFilter,
    ) -> Result<Vec<RetrievalHit>, PipelineError>;

    /// Remove every point belonging to a document. Deleting an absent
    /// document's points is a no-op success.
    async fn delete_by_document(&self, document_id: i64) -> Result<(), PipelineError>;

    /// Distinct document ids currently present in the collection.
    /// Used by maintenance cleanup to find orphaned points.
    async fn document_ids(&self) -> Result<Vec<i64>, PipelineError>;

    /// Collection statistics; returns zeros on provider error since this
    /// is diagnostic only.
    async fn stats(&self) -> IndexStats;
}

/// Builds the Qdrant payload filter for a [`SearchFilter`].
pub(crate) fn filter_json(filter: SearchFilter) -> Option<serde_json::Value> {
    match filter {
        SearchFilter::All => None,
        SearchFilter::Document(id) => Some(document_filter(id)),
    }
}

fn document_filter(document_id: i64) -> serde_json::Value {
    json!({
        "must": [{ "key": "document_id", "match": { "value": document_id } }]
    })
}

/// Vector index backed by a Qdrant collection, spoken to over REST.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    vector_size: usize,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig, vector_size: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            vector_size,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn collection_exists(&self) -> Result<bool, PipelineError> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await
            .map_err(|e| PipelineError::IndexWriteFailure(e.to_string()))?;

        Ok(resp.status().is_success())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<(), PipelineError> {
        if self.collection_exists().await? {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });

        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::IndexWriteFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::IndexWriteFailure(format!(
                "create collection failed ({}): {}",
                status, text
            )));
        }

        info!(collection = %self.collection, size = self.vector_size, "created collection");
        Ok(())
    }

    async fn upsert(
        &self,
        document_id: i64,
        passages: &[Passage],
    ) -> Result<Vec<String>, PipelineError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let mut point_ids = Vec::with_capacity(passages.len());
        let mut points = Vec::with_capacity(passages.len());

        for passage in passages {
            let embedding = passage.embedding.as_ref().ok_or_else(|| {
                PipelineError::IndexWriteFailure(format!(
                    "passage {} has no embedding",
                    passage.index
                ))
            })?;

            let point_id = Uuid::new_v4().to_string();
            points.push(json!({
                "id": point_id,
                "vector": embedding,
                "payload": {
                    "document_id": document_id,
                    "chunk_index": passage.index,
                    "content": passage.content,
                    "word_count": passage.word_count,
                }
            }));
            point_ids.push(point_id);
        }

        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", self.collection),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| PipelineError::IndexWriteFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::IndexWriteFailure(format!(
                "upsert failed ({}): {}",
                status, text
            )));
        }

        info!(document_id, points = point_ids.len(), "stored points");
        Ok(point_ids)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: SearchFilter,
    ) -> Result<Vec<RetrievalHit>, PipelineError> {
        let mut body = json!({
            "vector": query_vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        if let Some(f) = filter_json(filter) {
            body["filter"] = f;
        }

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::SearchFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::SearchFailure(format!(
                "search failed ({}): {}",
                status, text
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::SearchFailure(e.to_string()))?;

        let results = json
            .get("result")
            .and_then(|r| r.as_array())
            .ok_or_else(|| PipelineError::SearchFailure("missing result array".to_string()))?;

        let mut hits = Vec::with_capacity(results.len());
        for item in results {
            let payload = item.get("payload").cloned().unwrap_or(json!({}));
            hits.push(RetrievalHit {
                point_id: item
                    .get("id")
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .unwrap_or_default(),
                score: item.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
                document_id: payload
                    .get("document_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                chunk_index: payload
                    .get("chunk_index")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                content: payload
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                word_count: payload
                    .get("word_count")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
            });
        }

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    async fn delete_by_document(&self, document_id: i64) -> Result<(), PipelineError> {
        let body = json!({ "filter": document_filter(document_id) });

        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete?wait=true", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::IndexWriteFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::IndexWriteFailure(format!(
                "delete failed ({}): {}",
                status, text
            )));
        }

        info!(document_id, "deleted points");
        Ok(())
    }

    async fn document_ids(&self) -> Result<Vec<i64>, PipelineError> {
        let mut ids = std::collections::HashSet::new();
        let mut offset: Option<serde_json::Value> = None;

        loop {
            let mut body = json!({
                "limit": 1000,
                "with_payload": ["document_id"],
                "with_vector": false,
            });
            if let Some(ref off) = offset {
                body["offset"] = off.clone();
            }

            let resp = self
                .request(
                    reqwest::Method::POST,
                    &format!("/collections/{}/points/scroll", self.collection),
                )
                .json(&body)
                .send()
                .await
                .map_err(|e| PipelineError::SearchFailure(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(PipelineError::SearchFailure(format!(
                    "scroll failed ({}): {}",
                    status, text
                )));
            }

            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| PipelineError::SearchFailure(e.to_string()))?;

            let result = json.get("result").cloned().unwrap_or(json!({}));
            if let Some(points) = result.get("points").and_then(|p| p.as_array()) {
                for point in points {
                    if let Some(id) = point
                        .get("payload")
                        .and_then(|p| p.get("document_id"))
                        .and_then(|v| v.as_i64())
                    {
                        ids.insert(id);
                    }
                }
            }

            match result.get("next_page_offset") {
                Some(off) if !off.is_null() => offset = Some(off.clone()),
                _ => break,
            }
        }

        Ok(ids.into_iter().collect())
    }

    async fn stats(&self) -> IndexStats {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await;

        let json: serde_json::Value = match resp {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(j) => j,
                Err(e) => {
                    error!("failed to read collection stats: {}", e);
                    return IndexStats::default();
                }
            },
            Ok(r) => {
                error!("failed to get collection stats: HTTP {}", r.status());
                return IndexStats::default();
            }
            Err(e) => {
                error!("failed to get collection stats: {}", e);
                return IndexStats::default();
            }
        };

        let result = json.get("result").cloned().unwrap_or(json!({}));
        IndexStats {
            total_points: result
                .get("points_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            vector_size: result
                .pointer("/config/params/vectors/size")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            distance: result
                .pointer("/config/params/vectors/distance")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        }
    }
}
