//! Retrieval pipeline: embed the question, search, enrich, answer, format.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::PipelineError;
use crate::format::ResponseFormatter;
use crate::llm::AnswerGenerator;
use crate::models::{DocumentSummary, EnrichedHit, QueryResponse, RetrievalHit};
use crate::store::DocumentRepository;
use crate::vector::{SearchFilter, VectorIndex};

/// Returned verbatim when retrieval finds nothing; the language model is
/// never invoked in that case.
pub const NO_RESULTS_ANSWER: &str = "I couldn't find any relevant information in the uploaded \
documents to answer your question. Please try rephrasing your question or upload more relevant \
documents.";

const NO_SUMMARY_CONTENT: &str = "No content available for summary";

pub struct QueryPipeline {
    repo: Arc<dyn DocumentRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    generator: AnswerGenerator,
    formatter: ResponseFormatter,
    retrieval: RetrievalConfig,
}

impl QueryPipeline {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: AnswerGenerator,
        retrieval: RetrievalConfig,
    ) -> Self {
        let formatter = ResponseFormatter::new(retrieval.max_source_chars);
        Self {
            repo,
            embedder,
            index,
            generator,
            formatter,
            retrieval,
        }
    }

    /// Answer a question against the indexed corpus.
    ///
    /// `limit` and `score_threshold` override the configured defaults when
    /// given. A blank question is rejected before any network traffic.
    pub async fn answer(
        &self,
        question: &str,
        filter: SearchFilter,
        limit: Option<usize>,
        score_threshold: Option<f32>,
    ) -> Result<QueryResponse, PipelineError> {
        let started = Instant::now();

        if question.trim().is_empty() {
            return Err(PipelineError::BadRequest(
                "question must not be empty".to_string(),
            ));
        }

        let limit = limit.unwrap_or(self.retrieval.max_results);
        let threshold = score_threshold.unwrap_or(self.retrieval.score_threshold);

        let query_vector = embed_query(self.embedder.as_ref(), question).await?;
        let hits = self
            .index
            .search(&query_vector, limit, threshold, filter)
            .await?;

        info!(hits = hits.len(), limit, threshold, "retrieval complete");

        if hits.is_empty() {
            return Ok(self.formatter.format_response(
                question,
                NO_RESULTS_ANSWER,
                &[],
                elapsed_ms(started),
            ));
        }

        let enriched = self.enrich(hits).await?;
        let answer = self.generator.generate_answer(question, &enriched).await?;

        Ok(self
            .formatter
            .format_response(question, &answer, &enriched, elapsed_ms(started)))
    }

    /// Summarize one completed document from its highest-ranked chunks.
    pub async fn summarize_document(
        &self,
        document_id: i64,
    ) -> Result<DocumentSummary, PipelineError> {
        let doc = self
            .repo
            .get_document(document_id)
            .await
            .map_err(PipelineError::Storage)?
            .ok_or_else(|| {
                PipelineError::BadRequest(format!("document {} not found", document_id))
            })?;

        // A generic probe vector stands in for a real topical query; with
        // the threshold at zero this just selects representative chunks.
        let query_vector = embed_query(self.embedder.as_ref(), "summary overview").await?;
        let hits = self
            .index
            .search(
                &query_vector,
                self.retrieval.summary_chunks,
                0.0,
                SearchFilter::Document(document_id),
            )
            .await?;

        if hits.is_empty() {
            return Ok(DocumentSummary {
                document_id,
                filename: doc.original_filename,
                summary: NO_SUMMARY_CONTENT.to_string(),
                chunks_used: 0,
            });
        }

        let text: Vec<String> = hits.iter().map(|h| h.content.clone()).collect();
        let summary = self
            .generator
            .summarize(&text.join("\n\n"), self.retrieval.summary_max_words)
            .await;

        Ok(DocumentSummary {
            document_id,
            filename: doc.original_filename,
            summary,
            chunks_used: hits.len(),
        })
    }

    /// Attach each hit's document metadata, fetching every document row at
    /// most once per call. A hit whose document has disappeared keeps its
    /// content with placeholder metadata rather than failing the query.
    async fn enrich(&self, hits: Vec<RetrievalHit>) -> Result<Vec<EnrichedHit>, PipelineError> {
        let mut cache: HashMap<i64, Option<(String, String)>> = HashMap::new();
        let mut enriched = Vec::with_capacity(hits.len());

        for hit in hits {
            if !cache.contains_key(&hit.document_id) {
                let meta = self
                    .repo
                    .get_document(hit.document_id)
                    .await
                    .map_err(PipelineError::Storage)?
                    .map(|d| (d.original_filename, d.file_type));
                cache.insert(hit.document_id, meta);
            }

            let (document_filename, document_type) = cache
                .get(&hit.document_id)
                .and_then(|m| m.clone())
                .unwrap_or_else(|| ("Unknown".to_string(), "Unknown".to_string()));

            enriched.push(EnrichedHit {
                hit,
                document_filename,
                document_type,
            });
        }

        Ok(enriched)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
