//! # Rental RAG
//!
//! Customer-service answers for a rental business, grounded in the text
//! of its own website.
//!
//! Scraped pages are chunked, embedded, and stored in a SQLite-backed
//! vector index. A question is embedded, the closest chunks are retrieved,
//! and a language model is asked to answer from those chunks only, citing
//! their URLs. Answers are delivered whole or as a stream of fragments.
//!
//! The pipeline itself lives in `rental_rag_core`; this crate supplies the
//! concrete index, providers, corpus loader, HTTP server, and CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Corpus    │──▶│  Chunk+Embed │──▶│ SQLite index │
//! │ json/md/txt │   │  (core)      │   │  (vectors)   │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐         ┌─────────────┐
//!                 │   CLI    │         │ HTTP + SSE  │
//!                 │  (rag)   │         │   (axum)    │
//!                 └──────────┘         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                               # create the index
//! rag ingest --path ./data/pages         # index scraped pages
//! rag ask "Do you rent lenses?" --stream
//! rag serve                              # start the chat API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | Scraped-page loader |
//! | [`embedding`] | OpenAI-compatible and Ollama embedding providers |
//! | [`llm`] | OpenAI-compatible and extractive completion providers |
//! | [`sqlite_index`] | SQLite-backed vector index |
//! | [`engine`] | Builds the pipeline from configuration |
//! | [`server`] | HTTP chat server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`ingest`], [`ask`], [`search`], [`stats`] | CLI commands |

pub mod ask;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_index;
pub mod stats;
