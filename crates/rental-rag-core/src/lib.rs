//! # Rental RAG Core
//!
//! Shared, WASM-safe logic for Rental RAG: data models, chunking, the
//! vector index abstraction, retrieval, grounded generation, and the
//! query-to-answer orchestrator.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Embedding and completion capabilities are consumed
//! through the [`embedding::EmbeddingProvider`] and
//! [`generate::CompletionProvider`] traits; concrete HTTP backends live in
//! the `rental-rag` application crate.
//!
//! ## Data flow
//!
//! ```text
//! build time:  Document ─▶ Chunker ─▶ EmbeddingProvider ─▶ VectorIndex
//! query time:  query ─▶ EmbeddingProvider ─▶ VectorIndex ─▶ Retriever
//!                    ─▶ Generator ─▶ RagEngine ─▶ caller
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod rag;
pub mod search;
pub mod store;
