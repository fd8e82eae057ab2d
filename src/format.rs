//! Response formatting.
//!
//! Normalizes generator output and shapes retrieved sources for the caller:
//! outward-facing source content is truncated (never the pipeline data),
//! sources are re-sorted by descending score even if upstream ordering
//! regresses, and scores are rounded to three decimals. Formatting is
//! infallible by construction — a pipeline failure is mapped to a degraded
//! but well-shaped response via [`ResponseFormatter::format_error_response`].

use crate::models::{EnrichedHit, QueryResponse, SourceRef};

/// Fixed answer used when the generator produced nothing usable.
pub const NO_ANSWER_FALLBACK: &str =
    "I couldn't generate an answer based on the available information.";

pub struct ResponseFormatter {
    max_source_content_chars: usize,
}

impl ResponseFormatter {
    pub fn new(max_source_content_chars: usize) -> Self {
        Self {
            max_source_content_chars,
        }
    }

    /// Assemble the final query response.
    pub fn format_response(
        &self,
        question: &str,
        answer: &str,
        chunks: &[EnrichedHit],
        processing_time_ms: u64,
    ) -> QueryResponse {
        QueryResponse {
            question: question.to_string(),
            answer: format_answer(answer),
            sources: self.format_sources(chunks),
            processing_time_ms,
        }
    }

    /// Shape a pipeline failure into a well-formed response.
    pub fn format_error_response(
        &self,
        question: &str,
        error_message: &str,
        processing_time_ms: u64,
    ) -> QueryResponse {
        QueryResponse {
            question: question.to_string(),
            answer: format!(
                "I encountered an error while processing your question: {}",
                error_message
            ),
            sources: Vec::new(),
            processing_time_ms,
        }
    }

    fn format_sources(&self, chunks: &[EnrichedHit]) -> Vec<SourceRef> {
        let mut sources: Vec<SourceRef> = chunks
            .iter()
            .map(|c| SourceRef {
                document_id: c.hit.document_id,
                chunk_index: c.hit.chunk_index,
                content: truncate_chars(&c.hit.content, self.max_source_content_chars),
                score: round3(c.hit.score as f64),
                filename: c.document_filename.clone(),
                file_type: c.document_type.clone(),
            })
            .collect();

        // Highest score first, even if upstream ordering regresses.
        sources.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sources
    }
}

/// Collapse whitespace runs, trim, and guarantee terminal punctuation.
pub fn format_answer(answer: &str) -> String {
    let collapsed: String = answer.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return NO_ANSWER_FALLBACK.to_string();
    }

    if collapsed.ends_with(['.', '!', '?']) {
        collapsed
    } else {
        format!("{}.", collapsed)
    }
}

/// Truncate to at most `max` characters, appending an ellipsis marker.
/// Operates on char boundaries so multibyte text never splits mid-glyph.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{}...", truncated)
}

fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}
