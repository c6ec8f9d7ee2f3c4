//! Wiring the configured index and providers into a [`RagEngine`].
//!
//! Both the CLI and the HTTP server go through [`open_engine`], so they
//! always see the same index file, providers, and pipeline settings.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use rental_rag_core::models::IngestReport;
use rental_rag_core::rag::RagEngine;

use crate::config::{Config, CorpusConfig};
use crate::corpus::{load_corpus, CorpusLoad};
use crate::embedding::create_provider;
use crate::llm::create_llm;
use crate::sqlite_index::SqliteIndex;

/// Open the SQLite index and build the engine described by `config`.
pub async fn open_engine(config: &Config) -> Result<RagEngine> {
    let index = SqliteIndex::open(config).await?;
    let embedder = create_provider(&config.embedding)?;
    let llm = create_llm(&config.llm)?;
    let engine = RagEngine::new(Arc::new(index), embedder, llm, config.engine_config())
        .context("Invalid pipeline configuration")?;
    Ok(engine)
}

/// Walk and parse the corpus on the blocking thread pool.
pub async fn read_corpus(corpus: &CorpusConfig) -> Result<CorpusLoad> {
    let settings = corpus.clone();
    tokio::task::spawn_blocking(move || load_corpus(&settings))
        .await
        .context("Corpus loader panicked")?
}

/// Load the corpus at `corpus.root` and ingest it.
///
/// Files that could not be loaded are merged into the returned report's
/// failures alongside documents the indexer rejected.
pub async fn ingest_corpus(engine: &RagEngine, corpus: &CorpusConfig) -> Result<IngestReport> {
    let load = read_corpus(corpus).await?;
    info!(
        root = %corpus.root.display(),
        documents = load.documents.len(),
        unreadable = load.failures.len(),
        "loaded corpus"
    );

    let mut report = engine.ingest(&load.documents).await?;
    let mut failures = load.failures;
    failures.append(&mut report.failures);
    report.failures = failures;
    Ok(report)
}
