//! # docquery
//!
//! A document ingestion and retrieval-augmented question answering pipeline.
//!
//! docquery ingests PDF and text files, chunks them into overlapping
//! word windows, embeds the chunks, indexes them in Qdrant, and answers
//! questions by retrieving the most relevant chunks and handing them to a
//! language model with source attribution.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ Uploads  │──▶│ Pipeline                 │──▶│  SQLite  │
//! │ PDF/TXT  │   │ Extract+Chunk+Embed      │   │ docs/    │
//! └──────────┘   └────────────┬─────────────┘   │ chunks   │
//!                             │                 └────┬─────┘
//!                             ▼                      │
//!                       ┌──────────┐                 │
//!                       │  Qdrant  │◀────────────────┘
//!                       └────┬─────┘
//!                            ▼
//!                  ┌──────────────────┐
//!                  │ Query: retrieve  │
//!                  │ + LLM answer     │
//!                  └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docq init                       # create database and collection
//! docq add report.pdf             # register an upload
//! docq process 1                  # extract, chunk, embed, index
//! docq query "What was Q3 revenue?"
//! docq summary 1                  # summarize one document
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`extract`] | PDF and plain-text extraction |
//! | [`chunk`] | Word-window text chunking |
//! | [`embedding`] | Embedding provider abstraction and batching |
//! | [`vector`] | Vector index client (Qdrant) |
//! | [`llm`] | Completion provider and answer generation |
//! | [`format`] | Response formatting |
//! | [`store`] | Document and chunk repository |
//! | [`ingest`] | Ingestion pipeline and document lifecycle |
//! | [`query`] | Retrieval pipeline |
//! | [`stats`] | Statistics and maintenance cleanup |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod format;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod query;
pub mod stats;
pub mod store;
pub mod vector;
