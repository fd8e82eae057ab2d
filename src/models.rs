//! Core data models that flow through the ingestion and retrieval pipeline.

use serde::Serialize;

/// Lifecycle state of a document.
///
/// Transitions are monotone along the pipeline (`uploaded → processing →
/// completed|failed`); only an explicit reprocess request moves a document
/// backward to `uploaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<DocumentStatus> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document and its lifecycle state.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub original_filename: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: DocumentStatus,
    pub user_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields needed to create a document row at upload time.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub original_filename: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub user_id: Option<i64>,
}

/// A persisted chunk row. `vector_id` is a foreign key into the vector
/// store's point space; vectors are never stored relationally.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
}

/// Chunk fields the ingestion pipeline persists after indexing.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
}

/// Pipeline-internal passage: produced by the chunker, enriched with an
/// embedding by the batcher, consumed by the vector index. Never persisted
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub index: usize,
    pub content: String,
    pub word_count: usize,
    pub embedding: Option<Vec<f32>>,
}

/// A raw hit from the vector index, prior to metadata enrichment.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub point_id: String,
    pub score: f32,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub word_count: i64,
}

/// A retrieval hit enriched with its owning document's metadata.
#[derive(Debug, Clone)]
pub struct EnrichedHit {
    pub hit: RetrievalHit,
    pub document_filename: String,
    pub document_type: String,
}

/// One formatted source attached to a query response.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub score: f64,
    pub filename: String,
    pub file_type: String,
}

/// The caller-facing result of a query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub processing_time_ms: u64,
}

/// The caller-facing result of a document summary request.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document_id: i64,
    pub filename: String,
    pub summary: String,
    pub chunks_used: usize,
}
