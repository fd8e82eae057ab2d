//! Relational store repository.
//!
//! [`DocumentRepository`] is the narrow seam the pipelines use to read and
//! write document metadata, lifecycle status, and chunk rows. The SQLite
//! implementation keeps the one transactional requirement honest: the
//! `uploaded|failed → processing` check-and-set is a single conditional
//! UPDATE, so two concurrent ingestion requests for the same document can
//! never both win.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{Chunk, Document, DocumentStatus, NewChunk, NewDocument};

/// Per-status document counts for the stats surface.
#[derive(Debug, Clone, Default)]
pub struct StatusCounts {
    pub total: i64,
    pub uploaded: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Create a document row with status `uploaded`; returns the new row.
    async fn create_document(&self, new: NewDocument) -> Result<Document>;

    async fn get_document(&self, id: i64) -> Result<Option<Document>>;

    /// List documents newest first, optionally restricted to one status.
    async fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Document>>;

    async fn update_status(&self, id: i64, status: DocumentStatus) -> Result<()>;

    /// Atomic check-and-set: move the document to `processing` only if its
    /// current status is `uploaded` or `failed`. Returns whether this call
    /// won the transition.
    async fn try_begin_processing(&self, id: i64) -> Result<bool>;

    /// Insert all chunk rows for a document in a single transaction.
    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<()>;

    /// All chunk rows for a document, ordered by chunk index.
    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<Chunk>>;

    /// Delete a document's chunk rows (used before reprocessing).
    async fn delete_chunks(&self, document_id: i64) -> Result<()>;

    /// Delete the document row and, cascading, its chunk rows.
    async fn delete_document_cascade(&self, id: i64) -> Result<()>;

    /// Chunks whose owning document no longer exists.
    async fn count_orphan_chunks(&self) -> Result<i64>;

    /// Remove orphaned chunk rows; returns how many were deleted.
    async fn delete_orphan_chunks(&self) -> Result<i64>;

    async fn status_counts(&self) -> Result<StatusCounts>;

    async fn count_chunks(&self) -> Result<i64>;

    /// Ids of every document row. Used by maintenance cleanup to spot
    /// vector points whose document is gone.
    async fn all_document_ids(&self) -> Result<Vec<i64>>;
}

/// SQLite-backed repository.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let status_str: String = row.get("status");
    let status = DocumentStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown document status: {}", status_str))?;

    Ok(Document {
        id: row.get("id"),
        original_filename: row.get("original_filename"),
        file_path: row.get("file_path"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        status,
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl DocumentRepository for SqliteRepository {
    async fn create_document(&self, new: NewDocument) -> Result<Document> {
        let now = chrono::Utc::now().timestamp();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents
                (original_filename, file_path, file_type, file_size, status, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'uploaded', ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new.original_filename)
        .bind(&new.file_path)
        .bind(&new.file_type)
        .bind(new.file_size)
        .bind(new.user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Document {
            id,
            original_filename: new.original_filename,
            file_path: new.file_path,
            file_type: new.file_type,
            file_size: new.file_size,
            status: DocumentStatus::Uploaded,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM documents WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM documents ORDER BY created_at DESC LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_document).collect()
    }

    async fn update_status(&self, id: i64, status: DocumentStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_begin_processing(&self, id: i64) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        // A single conditional UPDATE is atomic: of two concurrent callers,
        // only one can see rows_affected == 1.
        let result = sqlx::query(
            r#"
            UPDATE documents SET status = 'processing', updated_at = ?
            WHERE id = ? AND status IN ('uploaded', 'failed')
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, content, vector_id) VALUES (?, ?, ?, ?)",
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.vector_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(|row| Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                vector_id: row.get("vector_id"),
            })
            .collect())
    }

    async fn delete_chunks(&self, document_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_document_cascade(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Explicit delete rather than relying on the FK pragma being set
        // for every connection.
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_orphan_chunks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks c LEFT JOIN documents d ON d.id = c.document_id WHERE d.id IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn delete_orphan_chunks(&self) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM chunks WHERE document_id NOT IN (SELECT id FROM documents)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM documents GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = StatusCounts::default();
        for row in &rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.total += n;
            match status.as_str() {
                "uploaded" => counts.uploaded = n,
                "processing" => counts.processing = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                _ => {}
            }
        }
        Ok(counts)
    }

    async fn count_chunks(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn all_document_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
