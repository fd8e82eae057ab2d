//! Language-model provider and answer generation.
//!
//! [`LlmProvider`] is the seam to the completion service; [`AnswerGenerator`]
//! turns a question plus retrieved context into an answer, and separately
//! summarizes arbitrary text. Summaries are best-effort: a provider failure
//! there returns a fixed fallback instead of aborting the caller.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::models::EnrichedHit;

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based \
on provided document context.\n\nRules:\n1. Only use information from the provided context\n\
2. If the context doesn't contain enough information, say so\n3. Be concise but comprehensive\n\
4. Cite specific parts of the context when possible\n5. If asked about something not in the \
context, politely decline";

/// Fallback returned when summarization fails; summaries never abort the caller.
pub const SUMMARY_FALLBACK: &str = "Summary generation failed.";

/// A remote completion service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}

/// Wraps an [`LlmProvider`] with the prompt construction for answering and
/// summarizing.
pub struct AnswerGenerator {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            provider,
            max_tokens,
            temperature,
        }
    }

    /// Generate an answer grounded in the retrieved context chunks.
    pub async fn generate_answer(
        &self,
        question: &str,
        context_chunks: &[EnrichedHit],
    ) -> Result<String, PipelineError> {
        let context = build_context(context_chunks);
        let prompt = format!(
            "Based on the following context, please answer the question.\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
            context, question
        );

        let answer = self
            .provider
            .complete(ANSWER_SYSTEM_PROMPT, &prompt, self.max_tokens, self.temperature)
            .await
            .map_err(|e| PipelineError::GenerationFailure(e.to_string()))?;

        info!(chars = answer.len(), "generated answer");
        Ok(answer)
    }

    /// Summarize text within a word budget. Best-effort: provider failure
    /// yields [`SUMMARY_FALLBACK`] rather than an error.
    pub async fn summarize(&self, text: &str, max_length_words: usize) -> String {
        let system = format!(
            "You are a helpful assistant that creates concise summaries. Keep summaries under {} words.",
            max_length_words
        );
        let user = format!(
            "Please provide a concise summary of the following text:\n\n{}",
            text
        );

        match self
            .provider
            .complete(&system, &user, (max_length_words * 2) as u32, 0.1)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!("failed to generate summary: {}", e);
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

/// Number each chunk's content under a `[Context N]` label.
fn build_context(chunks: &[EnrichedHit]) -> String {
    if chunks.is_empty() {
        return "No relevant context found.".to_string();
    }

    let mut parts = Vec::with_capacity(chunks.len() * 3);
    for (i, chunk) in chunks.iter().enumerate() {
        parts.push(format!("[Context {}]", i + 1));
        parts.push(chunk.hit.content.clone());
        parts.push(String::new());
    }
    parts.join("\n")
}

// ============ OpenAI Provider ============

/// Completion provider backed by the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
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
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiChat {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, text);
        }

        let json: serde_json::Value = resp.json().await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("invalid completion response: missing content"))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievalHit;

    fn hit(content: &str) -> EnrichedHit {
        EnrichedHit {
            hit: RetrievalHit {
                point_id: "p".into(),
                score: 0.9,
                document_id: 1,
                chunk_index: 0,
                content: content.into(),
                word_count: 2,
            },
            document_filename: "doc.txt".into(),
            document_type: ".txt".into(),
        }
    }

    #[test]
    fn context_is_numbered_in_order() {
        let ctx = build_context(&[hit("first chunk"), hit("second chunk")]);
        let first = ctx.find("[Context 1]").unwrap();
        let second = ctx.find("[Context 2]").unwrap();
        assert!(first < second);
        assert!(ctx.contains("first chunk"));
        assert!(ctx.contains("second chunk"));
    }

    #[test]
    fn empty_context_is_explicit() {
        assert_eq!(build_context(&[]), "No relevant context found.");
    }
}
