//! # docquery CLI (`docq`)
//!
//! The `docq` binary drives the document pipeline end to end: register
//! uploads, run ingestion, ask questions against the indexed corpus, and
//! perform maintenance.
//!
//! ## Usage
//!
//! ```bash
//! docq --config ./config/docquery.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docq init` | Create the SQLite database and the vector collection |
//! | `docq add <file>` | Register a PDF or text file as an uploaded document |
//! | `docq process <id>` | Run ingestion: extract, chunk, embed, index |
//! | `docq reprocess <id>` | Clear a document's chunks and reset it for ingestion |
//! | `docq delete <id>` | Delete a document, its chunks, and its vector points |
//! | `docq query "<question>"` | Answer a question from the indexed documents |
//! | `docq summary <id>` | Summarize one document |
//! | `docq list` | List documents and their status |
//! | `docq stats` | Show store and index statistics |
//! | `docq cleanup` | Remove orphaned chunk rows and vector points |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use docquery::config::{self, Config};
use docquery::embedding::OpenAiEmbeddings;
use docquery::format::ResponseFormatter;
use docquery::ingest::IngestPipeline;
use docquery::llm::{AnswerGenerator, OpenAiChat};
use docquery::models::DocumentStatus;
use docquery::query::QueryPipeline;
use docquery::store::{DocumentRepository, SqliteRepository};
use docquery::vector::{QdrantIndex, SearchFilter, VectorIndex};
use docquery::{db, migrate, stats};

/// docquery CLI — document ingestion and retrieval-augmented question
/// answering.
#[derive(Parser)]
#[command(
    name = "docq",
    about = "docquery — document ingestion and retrieval-augmented question answering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docquery.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the vector collection.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Register a file as an uploaded document.
    ///
    /// The file is validated against the configured extension allow-list
    /// and size limit, then copied into the upload directory. Processing
    /// is a separate step (`docq process`).
    Add {
        /// Path to the PDF or text file.
        file: PathBuf,

        /// Owner id to record on the document.
        #[arg(long)]
        user: Option<i64>,
    },

    /// Run the ingestion pipeline for one document.
    ///
    /// Extracts text, chunks it, embeds the chunks, writes vector points,
    /// and persists chunk rows. Only documents in status `uploaded` or
    /// `failed` are eligible.
    Process {
        /// Document id.
        id: i64,
    },

    /// Clear a document's chunks and reset it for ingestion.
    Reprocess {
        /// Document id.
        id: i64,
    },

    /// Delete a document, its chunks, its vector points, and its stored file.
    Delete {
        /// Document id.
        id: i64,
    },

    /// Answer a question from the indexed documents.
    Query {
        /// The question to answer.
        question: String,

        /// Restrict retrieval to one document.
        #[arg(long)]
        document: Option<i64>,

        /// Maximum number of chunks to retrieve.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity score for a chunk to count as relevant.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Summarize one document from its most representative chunks.
    Summary {
        /// Document id.
        id: i64,
    },

    /// List documents and their status.
    List {
        /// Only show documents in this status
        /// (uploaded, processing, completed, failed).
        #[arg(long)]
        status: Option<String>,

        /// Number of documents to skip.
        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Maximum number of documents to show.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Show store and index statistics.
    Stats,

    /// Remove orphaned chunk rows and vector points.
    Cleanup,
}

/// Everything the pipelines need, built from config. The OpenAI embedder
/// is built separately ([`App::embedder`]) because only commands that
/// embed need credentials or a live collection.
struct App {
    repo: Arc<dyn DocumentRepository>,
    index: Arc<dyn VectorIndex>,
}

impl App {
    async fn build(cfg: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(&cfg.storage.db_path).await?;
        let repo: Arc<dyn DocumentRepository> = Arc::new(SqliteRepository::new(pool));
        let index: Arc<dyn VectorIndex> =
            Arc::new(QdrantIndex::new(&cfg.vector, cfg.embedding.dims)?);
        Ok(Self { repo, index })
    }

    async fn embedder(&self, cfg: &Config) -> anyhow::Result<Arc<OpenAiEmbeddings>> {
        let embedder = Arc::new(OpenAiEmbeddings::new(&cfg.embedding)?);
        self.index.ensure_collection().await?;
        Ok(embedder)
    }

    fn ingest(&self, cfg: &Config) -> IngestPipeline {
        IngestPipeline::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.index),
            cfg.chunking,
            cfg.embedding.batch_size,
        )
    }

    async fn query(&self, cfg: &Config) -> anyhow::Result<QueryPipeline> {
        let embedder = self.embedder(cfg).await?;
        let llm = Arc::new(OpenAiChat::new(&cfg.llm)?);
        let generator = AnswerGenerator::new(llm, cfg.llm.max_tokens, cfg.llm.temperature);
        Ok(QueryPipeline::new(
            Arc::clone(&self.repo),
            embedder,
            Arc::clone(&self.index),
            generator,
            cfg.retrieval.clone(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.storage.db_path).await?;
            migrate::run_migrations(&pool).await?;
            let index = QdrantIndex::new(&cfg.vector, cfg.embedding.dims)?;
            index.ensure_collection().await?;
            println!("Database and vector collection initialized.");
        }
        Commands::Add { file, user } => {
            let app = App::build(&cfg).await?;
            let doc = app
                .ingest(&cfg)
                .register_upload(&file, &cfg.ingest, &cfg.storage.upload_dir, user)
                .await?;
            println!(
                "Registered document {} ({}, {} bytes). Run `docq process {}` to index it.",
                doc.id, doc.original_filename, doc.file_size, doc.id
            );
        }
        Commands::Process { id } => {
            let app = App::build(&cfg).await?;
            let embedder = app.embedder(&cfg).await?;
            let chunks = app
                .ingest(&cfg)
                .process_document(embedder.as_ref(), id)
                .await?;
            println!("Document {} processed: {} chunk(s) indexed.", id, chunks);
        }
        Commands::Reprocess { id } => {
            let app = App::build(&cfg).await?;
            app.ingest(&cfg).reprocess(id).await?;
            println!(
                "Document {} reset. Run `docq process {}` to index it again.",
                id, id
            );
        }
        Commands::Delete { id } => {
            let app = App::build(&cfg).await?;
            app.ingest(&cfg).delete_document(id).await?;
            println!("Document {} deleted.", id);
        }
        Commands::Query {
            question,
            document,
            limit,
            threshold,
        } => {
            let app = App::build(&cfg).await?;
            let filter = match document {
                Some(id) => SearchFilter::Document(id),
                None => SearchFilter::All,
            };
            let started = std::time::Instant::now();
            let response = match app
                .query(&cfg)
                .await?
                .answer(&question, filter, limit, threshold)
                .await
            {
                Ok(r) => r,
                // Caller mistakes surface as errors; provider outages still
                // produce a well-shaped response.
                Err(e) if e.is_caller_error() => return Err(e.into()),
                Err(e) => ResponseFormatter::new(cfg.retrieval.max_source_chars)
                    .format_error_response(
                        &question,
                        &e.to_string(),
                        started.elapsed().as_millis() as u64,
                    ),
            };

            println!("{}", response.answer);
            if !response.sources.is_empty() {
                println!();
                println!("Sources:");
                for s in &response.sources {
                    println!(
                        "  [{} — chunk {}] {} (score {:.3})",
                        s.filename, s.chunk_index, s.content, s.score
                    );
                }
            }
            println!();
            println!("({} ms)", response.processing_time_ms);
        }
        Commands::Summary { id } => {
            let app = App::build(&cfg).await?;
            let summary = app.query(&cfg).await?.summarize_document(id).await?;
            println!("{} — {}", summary.document_id, summary.filename);
            println!();
            println!("{}", summary.summary);
            println!();
            println!("(based on {} chunk(s))", summary.chunks_used);
        }
        Commands::List {
            status,
            offset,
            limit,
        } => {
            let status = status
                .as_deref()
                .map(|s| {
                    DocumentStatus::parse(s)
                        .ok_or_else(|| anyhow::anyhow!("unknown status: {}", s))
                })
                .transpose()?;
            let pool = db::connect(&cfg.storage.db_path).await?;
            let repo = SqliteRepository::new(pool);
            let docs = repo.list_documents(status, offset, limit).await?;
            if docs.is_empty() {
                println!("No documents.");
            } else {
                println!(
                    "{:>6}  {:<12} {:<8} {:>10}  {}",
                    "ID", "STATUS", "TYPE", "SIZE", "FILENAME"
                );
                for d in &docs {
                    println!(
                        "{:>6}  {:<12} {:<8} {:>10}  {}",
                        d.id,
                        d.status.as_str(),
                        d.file_type,
                        d.file_size,
                        d.original_filename
                    );
                }
            }
        }
        Commands::Stats => {
            let app = App::build(&cfg).await?;
            stats::run_stats(app.repo.as_ref(), app.index.as_ref(), &cfg.storage.db_path)
                .await?;
        }
        Commands::Cleanup => {
            let app = App::build(&cfg).await?;
            stats::run_cleanup(app.repo.as_ref(), app.index.as_ref()).await?;
        }
    }

    Ok(())
}
