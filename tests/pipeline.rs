//! End-to-end pipeline tests over stub providers.
//!
//! The embedding, vector index, and completion seams are replaced with
//! in-memory stubs so the full ingest and query flows run without any
//! network services. The SQLite store is real.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use docquery::config::{ChunkingConfig, IngestConfig, RetrievalConfig};
use docquery::db;
use docquery::embedding::EmbeddingProvider;
use docquery::error::PipelineError;
use docquery::ingest::IngestPipeline;
use docquery::llm::{AnswerGenerator, LlmProvider};
use docquery::migrate;
use docquery::models::{DocumentStatus, NewChunk, Passage, RetrievalHit};
use docquery::query::{QueryPipeline, NO_RESULTS_ANSWER};
use docquery::store::{DocumentRepository, SqliteRepository};
use docquery::vector::{IndexStats, SearchFilter, VectorIndex};

const DIMS: usize = 8;

/// Deterministic embedder: byte-histogram vectors, so similar texts get
/// similar (always non-negative cosine) vectors. Can be told to fail from
/// a given batch onward.
struct StubEmbedder {
    calls: AtomicUsize,
    fail_from_batch: Option<usize>,
}

impl StubEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_batch: None,
        }
    }

    fn failing_from(batch: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_batch: Some(batch),
        }
    }
}

fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for b in text.bytes() {
        v[(b as usize) % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fail_from) = self.fail_from_batch {
            if call >= fail_from {
                anyhow::bail!("stub embedder failure on batch {}", call);
            }
        }
        Ok(texts.iter().map(|t| embed(t)).collect())
    }
}

struct StoredPoint {
    document_id: i64,
    chunk_index: i64,
    content: String,
    word_count: i64,
    vector: Vec<f32>,
}

/// In-memory vector index with real cosine scoring.
#[derive(Default)]
struct StubIndex {
    points: Mutex<HashMap<String, StoredPoint>>,
    next_id: AtomicUsize,
    searches: AtomicUsize,
}

impl StubIndex {
    fn point_count(&self) -> usize {
        self.points.lock().unwrap().len()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorIndex for StubIndex {
    async fn ensure_collection(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn upsert(
        &self,
        document_id: i64,
        passages: &[Passage],
    ) -> Result<Vec<String>, PipelineError> {
        let mut points = self.points.lock().unwrap();
        let mut ids = Vec::with_capacity(passages.len());
        for p in passages {
            let vector = p
                .embedding
                .clone()
                .ok_or_else(|| PipelineError::IndexWriteFailure("missing embedding".into()))?;
            let id = format!("point-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            points.insert(
                id.clone(),
                StoredPoint {
                    document_id,
                    chunk_index: p.index as i64,
                    content: p.content.clone(),
                    word_count: p.word_count as i64,
                    vector,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: SearchFilter,
    ) -> Result<Vec<RetrievalHit>, PipelineError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let points = self.points.lock().unwrap();
        let mut hits: Vec<RetrievalHit> = points
            .iter()
            .filter(|(_, p)| match filter {
                SearchFilter::All => true,
                SearchFilter::Document(id) => p.document_id == id,
            })
            .map(|(id, p)| RetrievalHit {
                point_id: id.clone(),
                score: cosine(query_vector, &p.vector),
                document_id: p.document_id,
                chunk_index: p.chunk_index,
                content: p.content.clone(),
                word_count: p.word_count,
            })
            .filter(|h| h.score >= score_threshold)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_document(&self, document_id: i64) -> Result<(), PipelineError> {
        self.points
            .lock()
            .unwrap()
            .retain(|_, p| p.document_id != document_id);
        Ok(())
    }

    async fn document_ids(&self) -> Result<Vec<i64>, PipelineError> {
        let points = self.points.lock().unwrap();
        let mut ids: Vec<i64> = points.values().map(|p| p.document_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn stats(&self) -> IndexStats {
        IndexStats {
            total_points: self.point_count() as u64,
            vector_size: DIMS as u64,
            distance: "Cosine".to_string(),
        }
    }
}

/// Completion stub that counts calls and echoes a fixed answer.
struct StubLlm {
    calls: Arc<AtomicUsize>,
    reply: String,
}

#[async_trait]
impl LlmProvider for StubLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct TestEnv {
    _tmp: TempDir,
    upload_dir: PathBuf,
    files_dir: PathBuf,
    repo: Arc<dyn DocumentRepository>,
    index: Arc<StubIndex>,
    ingest_cfg: IngestConfig,
}

impl TestEnv {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("data/docquery.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();

        let upload_dir = tmp.path().join("uploads");
        let files_dir = tmp.path().join("files");
        fs::create_dir_all(&files_dir).unwrap();

        Self {
            upload_dir,
            files_dir,
            repo: Arc::new(SqliteRepository::new(pool)),
            index: Arc::new(StubIndex::default()),
            ingest_cfg: IngestConfig::default(),
            _tmp: tmp,
        }
    }

    fn write_words(&self, name: &str, count: usize) -> PathBuf {
        let words: Vec<String> = (0..count).map(|i| format!("w{}", i)).collect();
        let path = self.files_dir.join(name);
        fs::write(&path, words.join(" ")).unwrap();
        path
    }

    fn pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(
            Arc::clone(&self.repo),
            self.index.clone(),
            ChunkingConfig {
                size: 500,
                overlap: 50,
            },
            100,
        )
    }

    fn query_pipeline(&self, reply: &str) -> (QueryPipeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let llm = Arc::new(StubLlm {
            calls: calls.clone(),
            reply: reply.to_string(),
        });
        let generator = AnswerGenerator::new(llm, 1000, 0.1);
        let pipeline = QueryPipeline::new(
            Arc::clone(&self.repo),
            Arc::new(StubEmbedder::new()),
            self.index.clone(),
            generator,
            RetrievalConfig::default(),
        );
        (pipeline, calls)
    }

    async fn ingest_file(&self, name: &str, word_count: usize) -> i64 {
        let path = self.write_words(name, word_count);
        let pipeline = self.pipeline();
        let doc = pipeline
            .register_upload(&path, &self.ingest_cfg, &self.upload_dir, None)
            .await
            .unwrap();
        pipeline
            .process_document(&StubEmbedder::new(), doc.id)
            .await
            .unwrap();
        doc.id
    }
}

#[tokio::test]
async fn ingest_chunks_embeds_and_completes() {
    let env = TestEnv::new().await;
    let path = env.write_words("report.txt", 1200);

    let pipeline = env.pipeline();
    let doc = pipeline
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, Some(7))
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Uploaded);
    assert_eq!(doc.user_id, Some(7));
    // The stored copy lives in the upload dir, not at the caller's path.
    assert!(doc.file_path.starts_with(env.upload_dir.to_str().unwrap()));

    let chunks = pipeline
        .process_document(&StubEmbedder::new(), doc.id)
        .await
        .unwrap();
    assert_eq!(chunks, 3); // 1200 words / (500, overlap 50)

    let doc = env.repo.get_document(doc.id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);

    let rows = env.repo.chunks_for_document(doc.id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(env.index.point_count(), 3);

    // Chunk rows and vector points are paired one-to-one.
    for row in &rows {
        assert!(env
            .index
            .points
            .lock()
            .unwrap()
            .contains_key(&row.vector_id));
    }
}

#[tokio::test]
async fn rejected_extension_never_creates_a_document() {
    let env = TestEnv::new().await;
    let path = env.files_dir.join("notes.docx");
    fs::write(&path, "hello").unwrap();

    let err = env
        .pipeline()
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedType(_)));
    assert!(env
        .repo
        .list_documents(None, 0, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn embedding_failure_marks_failed_and_persists_nothing() {
    let env = TestEnv::new().await;
    let path = env.write_words("big.txt", 1200);

    let pipeline = env.pipeline();
    let doc = pipeline
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, None)
        .await
        .unwrap();

    let err = pipeline
        .process_document(&StubEmbedder::failing_from(0), doc.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmbeddingFailure { .. }));

    let doc = env.repo.get_document(doc.id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    assert!(env.repo.chunks_for_document(doc.id).await.unwrap().is_empty());
    assert_eq!(env.index.point_count(), 0);
}

#[tokio::test]
async fn failed_document_can_be_retried() {
    let env = TestEnv::new().await;
    let path = env.write_words("retry.txt", 600);

    let pipeline = env.pipeline();
    let doc = pipeline
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, None)
        .await
        .unwrap();
    pipeline
        .process_document(&StubEmbedder::failing_from(0), doc.id)
        .await
        .unwrap_err();

    // failed is an eligible starting state, so a healthy run succeeds.
    let chunks = pipeline
        .process_document(&StubEmbedder::new(), doc.id)
        .await
        .unwrap();
    assert_eq!(chunks, 2);
    let doc = env.repo.get_document(doc.id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
}

#[tokio::test]
async fn concurrent_processing_admits_exactly_one() {
    let env = TestEnv::new().await;
    let path = env.write_words("contended.txt", 300);

    let pipeline = Arc::new(env.pipeline());
    let doc = pipeline
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, None)
        .await
        .unwrap();

    let a = {
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move { p.process_document(&StubEmbedder::new(), doc.id).await })
    };
    let b = {
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move { p.process_document(&StubEmbedder::new(), doc.id).await })
    };

    let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
    let wins = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one concurrent run may win: {:?} {:?}", ra, rb);

    let doc = env.repo.get_document(doc.id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert_eq!(env.repo.chunks_for_document(doc.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn persistence_failure_rolls_back_vector_points() {
    let env = TestEnv::new().await;
    let path = env.write_words("conflict.txt", 300);

    let pipeline = env.pipeline();
    let doc = pipeline
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, None)
        .await
        .unwrap();

    // A pre-existing row at chunk_index 0 makes the final insert violate
    // the (document_id, chunk_index) uniqueness constraint.
    env.repo
        .insert_chunks(
            doc.id,
            &[NewChunk {
                chunk_index: 0,
                content: "stale".into(),
                vector_id: "stale-point".into(),
            }],
        )
        .await
        .unwrap();

    let err = pipeline
        .process_document(&StubEmbedder::new(), doc.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));

    let doc = env.repo.get_document(doc.id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
    // The points written before the failed insert were rolled back.
    assert_eq!(env.index.point_count(), 0);
}

#[tokio::test]
async fn reprocess_clears_chunks_and_resets_status() {
    let env = TestEnv::new().await;
    let id = env.ingest_file("doc.txt", 600).await;
    assert_eq!(env.index.point_count(), 2);

    env.pipeline().reprocess(id).await.unwrap();

    let doc = env.repo.get_document(id).await.unwrap().unwrap();
    assert_eq!(doc.status, DocumentStatus::Uploaded);
    assert!(env.repo.chunks_for_document(id).await.unwrap().is_empty());
    assert_eq!(env.index.point_count(), 0);

    // A second run reindexes cleanly.
    let chunks = env
        .pipeline()
        .process_document(&StubEmbedder::new(), id)
        .await
        .unwrap();
    assert_eq!(chunks, 2);
}

#[tokio::test]
async fn delete_removes_row_chunks_points_and_file() {
    let env = TestEnv::new().await;
    let id = env.ingest_file("gone.txt", 300).await;

    let stored = PathBuf::from(
        env.repo
            .get_document(id)
            .await
            .unwrap()
            .unwrap()
            .file_path,
    );
    assert!(stored.exists());

    env.pipeline().delete_document(id).await.unwrap();

    assert!(env.repo.get_document(id).await.unwrap().is_none());
    assert!(env.repo.chunks_for_document(id).await.unwrap().is_empty());
    assert_eq!(env.index.point_count(), 0);
    assert!(!stored.exists());
}

#[tokio::test]
async fn blank_question_is_rejected_before_any_provider_call() {
    let env = TestEnv::new().await;
    env.ingest_file("corpus.txt", 300).await;

    let embedder = Arc::new(StubEmbedder::new());
    let llm_calls = Arc::new(AtomicUsize::new(0));
    let llm = Arc::new(StubLlm {
        calls: llm_calls.clone(),
        reply: "unused".to_string(),
    });
    let pipeline = QueryPipeline::new(
        Arc::clone(&env.repo),
        embedder.clone(),
        env.index.clone(),
        AnswerGenerator::new(llm, 1000, 0.1),
        RetrievalConfig::default(),
    );

    let err = pipeline
        .answer("  \t ", SearchFilter::All, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::BadRequest(_)));

    // The rejection happens before any embedding, search, or generation.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(env.index.searches.load(Ordering::SeqCst), 0);
    assert_eq!(llm_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_with_no_hits_returns_canned_answer_without_llm() {
    let env = TestEnv::new().await;
    let (pipeline, llm_calls) = env.query_pipeline("should never be used");

    let response = pipeline
        .answer("what is in the corpus?", SearchFilter::All, None, None)
        .await
        .unwrap();

    assert_eq!(response.answer, NO_RESULTS_ANSWER);
    assert!(response.sources.is_empty());
    assert_eq!(llm_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_returns_formatted_answer_with_sources() {
    let env = TestEnv::new().await;
    env.ingest_file("facts.txt", 300).await;

    let (pipeline, llm_calls) = env.query_pipeline("The revenue was 42 million dollars");
    let response = pipeline
        .answer("what was the revenue", SearchFilter::All, None, Some(0.0))
        .await
        .unwrap();

    // Terminal punctuation is appended when the model omits it.
    assert_eq!(response.answer, "The revenue was 42 million dollars.");
    assert_eq!(llm_calls.load(Ordering::SeqCst), 1);
    assert!(!response.sources.is_empty());
    assert_eq!(response.sources[0].filename, "facts.txt");
}

#[tokio::test]
async fn document_filter_restricts_retrieval() {
    let env = TestEnv::new().await;
    let first = env.ingest_file("first.txt", 300).await;
    let second = env.ingest_file("second.txt", 300).await;

    let (pipeline, _) = env.query_pipeline("answer");
    let response = pipeline
        .answer("anything", SearchFilter::Document(first), None, Some(0.0))
        .await
        .unwrap();

    assert!(!response.sources.is_empty());
    for s in &response.sources {
        assert_eq!(s.document_id, first);
        assert_ne!(s.document_id, second);
    }
}

#[tokio::test]
async fn summary_of_unindexed_document_reports_no_content() {
    let env = TestEnv::new().await;
    let path = env.write_words("pending.txt", 100);
    let doc = env
        .pipeline()
        .register_upload(&path, &env.ingest_cfg, &env.upload_dir, None)
        .await
        .unwrap();

    let (pipeline, llm_calls) = env.query_pipeline("unused");
    let summary = pipeline.summarize_document(doc.id).await.unwrap();

    assert_eq!(summary.summary, "No content available for summary");
    assert_eq!(summary.chunks_used, 0);
    assert_eq!(llm_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn summary_uses_top_chunks() {
    let env = TestEnv::new().await;
    let id = env.ingest_file("long.txt", 1200).await;

    let (pipeline, llm_calls) = env.query_pipeline("A concise summary");
    let summary = pipeline.summarize_document(id).await.unwrap();

    assert_eq!(summary.summary, "A concise summary");
    assert_eq!(summary.chunks_used, 3);
    assert_eq!(summary.filename, "long.txt");
    assert_eq!(llm_calls.load(Ordering::SeqCst), 1);
}
