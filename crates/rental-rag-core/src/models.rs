//! Core data models that flow through ingestion and query.
//!
//! Records are explicit and validated at construction: a [`Document`]
//! must carry a source, a [`ChunkConfig`] must have `overlap < max`.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A scraped page: raw text plus its origin URL and title.
///
/// Immutable once chunked and never persisted itself; only its chunks are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    source: String,
    title: String,
    text: String,
}

impl Document {
    /// Build a document. Fails if `source` is blank.
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "document source must not be empty".to_string(),
            ));
        }
        Ok(Self {
            source,
            title: title.into(),
            text: text.into(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Chunk window configuration, in whitespace tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
        }
    }
}

impl ChunkConfig {
    /// Build a validated config.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        let config = Self {
            max_tokens,
            overlap_tokens,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check `max_tokens > 0` and `overlap_tokens < max_tokens`.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(RagError::Configuration(
                "max_tokens must be > 0".to_string(),
            ));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(RagError::Configuration(format!(
                "overlap_tokens ({}) must be < max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows.
    pub fn stride(&self) -> usize {
        self.max_tokens - self.overlap_tokens
    }
}

/// A contiguous token window of a [`Document`].
///
/// Chunks are the unit of storage and retrieval. They are created once at
/// ingestion time, never mutated, and replaced wholesale when their source
/// is re-ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Window tokens joined by a single space.
    pub text: String,
    /// Origin URL, inherited from the document.
    pub source: String,
    pub title: String,
    /// Position among the chunks of the same document, starting at 0.
    pub sequence_index: usize,
    pub token_count: usize,
    /// SHA-256 of `text`, hex encoded.
    pub content_hash: String,
}

/// A chunk plus its embedding and stable identifier, as owned by a
/// vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEntry {
    pub id: String,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Unix timestamp (seconds) of the ingestion that produced this entry.
    pub ingested_at: i64,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Ranked retrieval output: descending score, at most `k` items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    items: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Wrap already-ranked items.
    pub fn new(items: Vec<ScoredChunk>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ScoredChunk] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Distinct `source` values of `chunks`, preserving first-seen order.
pub fn distinct_sources<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for chunk in chunks {
        if !seen.iter().any(|s| s == &chunk.source) {
            seen.push(chunk.source.clone());
        }
    }
    seen
}

/// Final result of a complete-mode query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub response: String,
    /// Distinct sources present in the context block, first-seen order.
    pub sources: Vec<String>,
}

/// One item of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text fragment, in the order the model produced it.
    Token { content: String },
    /// Terminal sentinel carrying the cited sources.
    Done { sources: Vec<String> },
}

/// A document the indexer could not ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub source: String,
    pub reason: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Documents whose chunks are now live in the index.
    pub documents_ingested: usize,
    pub chunks_created: usize,
    pub failures: Vec<DocumentFailure>,
}

/// Point-in-time snapshot of a vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub entry_count: usize,
    pub collection: String,
    /// Number of distinct sources with live entries.
    pub source_count: usize,
    /// Latest ingestion time (RFC 3339), if anything is indexed.
    pub last_ingested_at: Option<String>,
}
