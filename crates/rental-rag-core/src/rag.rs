//! End-to-end query-to-answer orchestration.
//!
//! [`RagEngine`] composes a [`Retriever`], a [`Generator`], and an
//! [`Indexer`] over one injected [`VectorIndex`]. It is the entry point the
//! HTTP server and the CLI call into.
//!
//! | Method | Flow |
//! |--------|------|
//! | [`answer`](RagEngine::answer) | validate → retrieve → generate |
//! | [`answer_stream`](RagEngine::answer_stream) | validate → retrieve → generate_stream |
//! | [`retrieve`](RagEngine::retrieve) | validate → retrieve |
//! | [`ingest`](RagEngine::ingest) | chunk → embed → replace_source |
//!
//! The engine holds no per-query state: concurrent calls share only the
//! index and the providers, and never wait on each other.

use std::sync::Arc;

use tracing::info;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generate::{AnswerStream, CompletionProvider, Generator, GeneratorConfig};
use crate::ingest::{Indexer, DEFAULT_BATCH_SIZE};
use crate::models::{AnswerResult, ChunkConfig, Document, IndexStats, IngestReport, RetrievalResult};
use crate::search::{RetrievalParams, Retriever};
use crate::store::VectorIndex;

/// Everything the engine needs besides its injected dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalParams,
    pub generation: GeneratorConfig,
    pub embed_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            retrieval: RetrievalParams::default(),
            generation: GeneratorConfig::default(),
            embed_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// The retrieval-augmented answering pipeline.
pub struct RagEngine {
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    generator: Generator,
    indexer: Indexer,
    chunking: ChunkConfig,
}

impl RagEngine {
    /// Wire the pipeline together.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] if any part of `config` is invalid.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn CompletionProvider>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.chunking.validate()?;
        let retriever = Retriever::new(index.clone(), embedder.clone(), config.retrieval)?;
        let generator = Generator::new(llm, config.generation)?;
        let indexer =
            Indexer::new(index.clone(), embedder).with_batch_size(config.embed_batch_size);
        Ok(Self {
            index,
            retriever,
            generator,
            indexer,
            chunking: config.chunking,
        })
    }

    /// Answer `query` in one piece.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] for a blank query or `k == Some(0)`.
    /// - [`RagError::UpstreamUnavailable`] if a provider fails twice.
    /// - [`RagError::ContextTooLarge`] if even the bare prompt is too large.
    pub async fn answer(&self, query: &str, k: Option<usize>) -> Result<AnswerResult> {
        let retrieval = self.retrieve(query, k).await?;
        let answer = self.generator.generate(query.trim(), &retrieval).await?;
        info!(
            retrieved = retrieval.len(),
            sources = answer.sources.len(),
            "answered query"
        );
        Ok(answer)
    }

    /// Answer `query` as a stream of token events ending in
    /// [`StreamEvent::Done`](crate::models::StreamEvent::Done).
    ///
    /// Each call returns a fresh, independent stream. Dropping it early
    /// cancels the upstream completion.
    ///
    /// # Errors
    ///
    /// Same as [`answer`](Self::answer), for failures before the first
    /// event.
    pub async fn answer_stream(&self, query: &str, k: Option<usize>) -> Result<AnswerStream> {
        let retrieval = self.retrieve(query, k).await?;
        let stream = self.generator.generate_stream(query.trim(), &retrieval).await?;
        info!(retrieved = retrieval.len(), "streaming answer");
        Ok(stream)
    }

    /// Retrieval only, for inspection tools.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidArgument`] for a blank query or `k == Some(0)`.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidArgument(
                "query must not be empty".to_string(),
            ));
        }
        self.retriever.retrieve(query, k).await
    }

    /// Ingest documents with the configured chunking.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        self.indexer.ingest(documents, self.chunking).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await
    }
}
