//! Typed errors for the ingestion and retrieval pipelines.
//!
//! Each pipeline stage reports its own failure variant so callers can tell
//! a caller mistake ([`PipelineError::BadRequest`]) from a provider outage,
//! and the ingestion pipeline can decide whether vector-store writes need
//! to be rolled back before a document is marked `failed`.

use thiserror::Error;

/// Failure taxonomy shared by the ingestion and retrieval pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller error: empty question, unknown document, invalid transition.
    /// Surfaced directly, never retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The document's file type has no extraction path.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// Text extraction itself failed (unreadable file, corrupt PDF).
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Extraction succeeded but produced no chunkable text.
    #[error("no text content extracted from document {0}")]
    NoContent(i64),

    /// The embedding provider failed on one batch. The whole call fails;
    /// `start..end` names the offending input range.
    #[error("embedding failed for texts {start}..{end}: {source}")]
    EmbeddingFailure {
        start: usize,
        end: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A vector-store write did not complete. No point ids from the failed
    /// call may be persisted relationally.
    #[error("vector index write failed: {0}")]
    IndexWriteFailure(String),

    /// A vector-store search failed.
    #[error("vector search failed: {0}")]
    SearchFailure(String),

    /// The language-model provider failed while generating an answer.
    #[error("answer generation failed: {0}")]
    GenerationFailure(String),

    /// Relational store failure.
    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl PipelineError {
    /// True for failures the caller caused, as opposed to provider outages.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PipelineError::BadRequest(_) | PipelineError::UnsupportedType(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_failure_names_batch_range() {
        let err = PipelineError::EmbeddingFailure {
            start: 100,
            end: 200,
            source: anyhow::anyhow!("boom"),
        };
        let msg = err.to_string();
        assert!(msg.contains("100..200"), "got: {}", msg);
    }

    #[test]
    fn caller_errors_are_distinguished() {
        assert!(PipelineError::BadRequest("x".into()).is_caller_error());
        assert!(!PipelineError::IndexWriteFailure("x".into()).is_caller_error());
    }
}
