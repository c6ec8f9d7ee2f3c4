//! Build-time ingestion: chunk, embed, and store documents.
//!
//! # Algorithm
//!
//! 1. Validate the [`ChunkConfig`] before touching anything.
//! 2. For each source, in input order (when several documents share a
//!    source only the last one is ingested):
//!    - chunk it ([`chunk_document`]);
//!    - reject it if it has no tokens;
//!    - embed the chunk texts in batches of `batch_size`
//!      (one immediate retry per batch), rejecting non-finite vectors;
//!    - swap the source's entries in the index with
//!      [`VectorIndex::replace_source`], so no stale chunk survives.
//! 3. Collect per-document failures instead of aborting the run.
//!
//! A failure of the index backend itself aborts the run with an error,
//! since no further document could be stored either.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::chunk::{chunk_document, entry_id};
use crate::embedding::EmbeddingProvider;
use crate::error::{retry_once, RagError, Result};
use crate::models::{Chunk, ChunkConfig, Document, DocumentFailure, IndexedEntry, IngestReport};
use crate::store::VectorIndex;

/// Default number of texts per `embed_batch` call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Chunks, embeds, and stores documents in a [`VectorIndex`].
pub struct Indexer {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl Indexer {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the embedding batch size (values below 1 are treated as 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ingest `documents`, replacing any previous entries of their sources.
    ///
    /// # Errors
    ///
    /// - [`RagError::Configuration`] if `config` is invalid (nothing is
    ///   ingested).
    /// - [`RagError::Index`] if the index backend fails.
    ///
    /// Embedding failures and empty documents are reported in
    /// [`IngestReport::failures`] and do not stop the run.
    pub async fn ingest(&self, documents: &[Document], config: ChunkConfig) -> Result<IngestReport> {
        config.validate()?;

        let last_seen: HashMap<&str, usize> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (doc.source(), i))
            .collect();

        let mut report = IngestReport::default();
        for (i, doc) in documents.iter().enumerate() {
            if last_seen.get(doc.source()) != Some(&i) {
                debug!(source = doc.source(), "skipping document superseded by a later one");
                continue;
            }
            match self.ingest_one(doc, config).await {
                Ok(count) => {
                    report.documents_ingested += 1;
                    report.chunks_created += count;
                    info!(source = doc.source(), chunks = count, "ingested document");
                }
                Err(e @ RagError::Index { .. }) => return Err(e),
                Err(e) => {
                    error!(source = doc.source(), error = %e, "failed to ingest document");
                    report.failures.push(DocumentFailure {
                        source: doc.source().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            documents = report.documents_ingested,
            chunks = report.chunks_created,
            failures = report.failures.len(),
            "ingestion complete"
        );
        Ok(report)
    }

    async fn ingest_one(&self, doc: &Document, config: ChunkConfig) -> Result<usize> {
        let chunks: Vec<Chunk> = chunk_document(doc, config)?.collect();
        if chunks.iter().all(|c| c.token_count == 0) {
            return Err(RagError::InvalidArgument("no indexable text".to_string()));
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded =
                retry_once("embed batch", || self.embedder.embed_batch(&texts)).await?;
            if embedded.len() != texts.len() {
                return Err(RagError::upstream(
                    self.embedder.model_name(),
                    format!("expected {} vectors, got {}", texts.len(), embedded.len()),
                ));
            }
            if embedded.iter().flatten().any(|x| !x.is_finite()) {
                return Err(RagError::upstream(
                    self.embedder.model_name(),
                    "embedding contains a non-finite value",
                ));
            }
            vectors.extend(embedded);
        }

        let ingested_at = Utc::now().timestamp();
        let entries: Vec<IndexedEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedEntry {
                id: entry_id(&chunk.source, chunk.sequence_index),
                chunk,
                vector,
                ingested_at,
            })
            .collect();

        let removed = self.index.replace_source(doc.source(), &entries).await?;
        if removed > 0 {
            debug!(source = doc.source(), removed, "replaced previous entries");
        }
        Ok(entries.len())
    }
}
