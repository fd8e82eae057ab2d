//! Ingestion pipeline: extract → chunk → embed → index → persist.
//!
//! Drives a document through its lifecycle (`uploaded → processing →
//! completed|failed`). All heavy work happens in memory before the single
//! chunk-row transaction, so a failure before persistence leaves no
//! relational residue; if persistence itself fails, the vector points
//! written in the previous step are rolled back before the document is
//! marked `failed`, keeping relational chunk count equal to vector point
//! count at all times.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, IngestConfig};
use crate::embedding::{embed_chunks, EmbeddingProvider};
use crate::error::PipelineError;
use crate::extract;
use crate::models::{Document, DocumentStatus, NewChunk, NewDocument};
use crate::store::DocumentRepository;
use crate::vector::VectorIndex;

/// Drives documents through their lifecycle. The embedding provider is
/// passed into [`IngestPipeline::process_document`] rather than held here:
/// registration, reprocess resets, and deletion never embed anything, so
/// those callers need no provider credentials.
pub struct IngestPipeline {
    repo: Arc<dyn DocumentRepository>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            repo,
            index,
            chunking,
            batch_size,
        }
    }

    /// Register an uploaded file as a document with status `uploaded`.
    ///
    /// Applies the configured acceptance gate (extension allow-list and
    /// maximum byte size), then copies the file into `upload_dir` under a
    /// fresh uuid name. The document row points at the copy, so deleting
    /// the document never touches the caller's original.
    pub async fn register_upload(
        &self,
        source: &Path,
        ingest: &IngestConfig,
        upload_dir: &Path,
        user_id: Option<i64>,
    ) -> Result<Document, PipelineError> {
        let file_type = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        if !ingest.allowed_extensions.contains(&file_type) {
            return Err(PipelineError::UnsupportedType(file_type));
        }

        let metadata = std::fs::metadata(source)
            .map_err(|e| PipelineError::BadRequest(format!("{}: {}", source.display(), e)))?;
        if metadata.len() > ingest.max_file_bytes {
            return Err(PipelineError::BadRequest(format!(
                "file is {} bytes, limit is {}",
                metadata.len(),
                ingest.max_file_bytes
            )));
        }

        let original_filename = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        std::fs::create_dir_all(upload_dir)
            .map_err(|e| PipelineError::Storage(anyhow::Error::new(e)))?;
        let stored = upload_dir.join(format!("{}{}", uuid::Uuid::new_v4(), file_type));
        std::fs::copy(source, &stored)
            .map_err(|e| PipelineError::Storage(anyhow::Error::new(e)))?;

        let doc = self
            .repo
            .create_document(NewDocument {
                original_filename,
                file_path: stored.to_string_lossy().to_string(),
                file_type,
                file_size: metadata.len() as i64,
                user_id,
            })
            .await
            .map_err(PipelineError::Storage)?;

        info!(document_id = doc.id, filename = %doc.original_filename, "registered upload");
        Ok(doc)
    }

    /// Run the full ingestion pipeline for one document.
    ///
    /// Only a document in status `uploaded` or `failed` is eligible; the
    /// check-and-set is atomic, so concurrent calls for the same document
    /// cannot both begin processing.
    pub async fn process_document(
        &self,
        embedder: &dyn EmbeddingProvider,
        document_id: i64,
    ) -> Result<usize, PipelineError> {
        let doc = self
            .repo
            .get_document(document_id)
            .await
            .map_err(PipelineError::Storage)?
            .ok_or_else(|| {
                PipelineError::BadRequest(format!("document {} not found", document_id))
            })?;

        let won = self
            .repo
            .try_begin_processing(document_id)
            .await
            .map_err(PipelineError::Storage)?;
        if !won {
            return Err(PipelineError::BadRequest(format!(
                "document {} is not eligible for processing (status: {})",
                document_id, doc.status
            )));
        }

        info!(document_id, filename = %doc.original_filename, "starting processing");

        match self.run_stages(embedder, &doc).await {
            Ok(chunk_count) => {
                self.repo
                    .update_status(document_id, DocumentStatus::Completed)
                    .await
                    .map_err(PipelineError::Storage)?;
                info!(document_id, chunks = chunk_count, "processing completed");
                Ok(chunk_count)
            }
            Err(e) => {
                error!(document_id, error = %e, "processing failed");
                if let Err(status_err) = self
                    .repo
                    .update_status(document_id, DocumentStatus::Failed)
                    .await
                {
                    error!(document_id, error = %status_err, "failed to record failed status");
                }
                Err(e)
            }
        }
    }

    /// The in-memory stages plus the final persistence commit.
    async fn run_stages(
        &self,
        embedder: &dyn EmbeddingProvider,
        doc: &Document,
    ) -> Result<usize, PipelineError> {
        // Step 1: extract raw text by file type.
        let text = extract::extract_text(Path::new(&doc.file_path), &doc.file_type)?;

        // Step 2: chunk.
        let passages = chunk_text(&text, self.chunking.size, self.chunking.overlap);
        if passages.is_empty() {
            return Err(PipelineError::NoContent(doc.id));
        }

        // Step 3: embed all chunks in one batched call.
        let passages = embed_chunks(embedder, passages, self.batch_size).await?;

        // Step 4: write points to the vector index.
        let vector_ids = self.index.upsert(doc.id, &passages).await?;

        // Step 5: persist chunk rows in one transaction, pairing each
        // chunk index with its point id.
        let new_chunks: Vec<NewChunk> = passages
            .iter()
            .zip(&vector_ids)
            .map(|(p, vid)| NewChunk {
                chunk_index: p.index as i64,
                content: p.content.clone(),
                vector_id: vid.clone(),
            })
            .collect();

        if let Err(e) = self.repo.insert_chunks(doc.id, &new_chunks).await {
            // Persistence failed after the vector write: roll the points
            // back so chunk rows and points stay in lockstep.
            warn!(document_id = doc.id, "rolling back vector points after persistence failure");
            if let Err(del_err) = self.index.delete_by_document(doc.id).await {
                error!(document_id = doc.id, error = %del_err, "vector rollback failed");
            }
            return Err(PipelineError::Storage(e));
        }

        Ok(new_chunks.len())
    }

    /// Reset a document to `uploaded` so ingestion can run again.
    ///
    /// Existing chunks — relational and vector — are deleted first, so the
    /// re-run cannot produce duplicate indices. Rejected while an ingestion
    /// is in flight.
    pub async fn reprocess(&self, document_id: i64) -> Result<(), PipelineError> {
        let doc = self
            .repo
            .get_document(document_id)
            .await
            .map_err(PipelineError::Storage)?
            .ok_or_else(|| {
                PipelineError::BadRequest(format!("document {} not found", document_id))
            })?;

        if doc.status == DocumentStatus::Processing {
            return Err(PipelineError::BadRequest(format!(
                "document {} is currently processing",
                document_id
            )));
        }

        self.index.delete_by_document(document_id).await?;
        self.repo
            .delete_chunks(document_id)
            .await
            .map_err(PipelineError::Storage)?;
        self.repo
            .update_status(document_id, DocumentStatus::Uploaded)
            .await
            .map_err(PipelineError::Storage)?;

        info!(document_id, "reset for reprocessing");
        Ok(())
    }

    /// Delete a document and everything that hangs off it.
    ///
    /// Order matters: vector points first (a failure there aborts the whole
    /// deletion), then the source file, then the relational row cascading
    /// to chunk rows.
    pub async fn delete_document(&self, document_id: i64) -> Result<(), PipelineError> {
        let doc = self
            .repo
            .get_document(document_id)
            .await
            .map_err(PipelineError::Storage)?
            .ok_or_else(|| {
                PipelineError::BadRequest(format!("document {} not found", document_id))
            })?;

        self.index.delete_by_document(document_id).await?;

        let path = Path::new(&doc.file_path);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(document_id, error = %e, "could not remove source file");
            }
        }

        self.repo
            .delete_document_cascade(document_id)
            .await
            .map_err(PipelineError::Storage)?;

        info!(document_id, "deleted document");
        Ok(())
    }
}
