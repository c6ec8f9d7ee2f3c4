//! Query-time retrieval.
//!
//! The [`Retriever`] embeds a query with the injected
//! [`EmbeddingProvider`] and asks the injected [`VectorIndex`] for the
//! nearest chunks. It holds no per-query state and takes no locks of its
//! own, so any number of queries can run through one instance at once.
//!
//! # Algorithm
//!
//! 1. Reject `k == 0` (before any network call).
//! 2. Embed the query text (one immediate retry on upstream failure).
//! 3. `search(query_vec, k)` on the index: at most `k` hits, descending score.
//! 4. If a `min_score` threshold is configured, drop hits with
//!    `score < min_score`. Order is never changed.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{retry_once, RagError, Result};
use crate::models::RetrievalResult;
use crate::store::VectorIndex;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Default number of results when the caller does not pass `k`.
    pub top_k: usize,
    /// Optional strict `score >= min_score` cut applied after ranking.
    pub min_score: Option<f32>,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
        }
    }
}

impl RetrievalParams {
    /// Check `top_k >= 1`.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::Configuration(
                "retrieval top_k must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Turns a user query into a ranked [`RetrievalResult`].
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    params: RetrievalParams,
}

impl Retriever {
    /// Build a retriever over an injected index and embedding provider.
    ///
    /// # Errors
    ///
    /// [`RagError::Configuration`] if `params.top_k == 0`.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        params: RetrievalParams,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            index,
            embedder,
            params,
        })
    }

    /// Retrieve up to `k` chunks (default: the configured `top_k`).
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if `k == Some(0)`.
    /// - [`RagError::UpstreamUnavailable`] if embedding fails twice.
    /// - [`RagError::Index`] if the index search fails.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let k = k.unwrap_or(self.params.top_k);
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be > 0".to_string()));
        }

        let query_vec = retry_once("embed query", || self.embedder.embed(query)).await?;
        let hits = self.index.search(&query_vec, k).await?;
        let ranked = hits.len();

        let hits = match self.params.min_score {
            Some(min) => hits.into_iter().filter(|h| h.score >= min).collect(),
            None => hits,
        };

        debug!(k, ranked, kept = hits.len(), "retrieved chunks");
        Ok(RetrievalResult::new(hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::entry_id;
    use crate::embedding::HashingEmbedder;
    use crate::models::{Chunk, IndexedEntry};
    use crate::store::memory::InMemoryIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(embedder: &HashingEmbedder, source: &str, text: &str) -> IndexedEntry {
        IndexedEntry {
            id: entry_id(source, 0),
            chunk: Chunk {
                text: text.to_string(),
                source: source.to_string(),
                title: String::new(),
                sequence_index: 0,
                token_count: text.split_whitespace().count(),
                content_hash: String::new(),
            },
            vector: embedder.embed_sync(text),
            ingested_at: 0,
        }
    }

    async fn seeded() -> (Arc<InMemoryIndex>, Arc<HashingEmbedder>) {
        let embedder = Arc::new(HashingEmbedder::new(256));
        let index = Arc::new(InMemoryIndex::new("test"));
        index
            .upsert(&[
                entry(&embedder, "https://example.com/cameras", "We rent Sony A7S III cameras."),
                entry(
                    &embedder,
                    "https://example.com/returns",
                    "Late returns incur a fee of one day's rental.",
                ),
                entry(
                    &embedder,
                    "https://example.com/lenses",
                    "Our lenses include primes and zooms for every mount.",
                ),
            ])
            .await
            .unwrap();
        (index, embedder)
    }

    #[tokio::test]
    async fn test_retrieve_ranks_relevant_chunk_first() {
        let (index, embedder) = seeded().await;
        let retriever = Retriever::new(index, embedder, RetrievalParams::default()).unwrap();
        let result = retriever
            .retrieve("What cameras do you rent?", Some(1))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.items()[0].chunk.source, "https://example.com/cameras");
    }

    #[tokio::test]
    async fn test_retrieve_bounds_and_order() {
        let (index, embedder) = seeded().await;
        let retriever = Retriever::new(index, embedder, RetrievalParams::default()).unwrap();
        let result = retriever.retrieve("lens rental", Some(10)).await.unwrap();
        assert_eq!(result.len(), 3);
        for pair in result.items().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_retrieve_zero_k_rejected() {
        let (index, embedder) = seeded().await;
        let retriever = Retriever::new(index, embedder, RetrievalParams::default()).unwrap();
        let err = retriever.retrieve("anything", Some(0)).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_retrieve_empty_index() {
        let retriever = Retriever::new(
            Arc::new(InMemoryIndex::new("empty")),
            Arc::new(HashingEmbedder::new(64)),
            RetrievalParams::default(),
        )
        .unwrap();
        let result = retriever.retrieve("anything", Some(5)).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_min_score_filters_without_reranking() {
        let (index, embedder) = seeded().await;
        let unfiltered = Retriever::new(index.clone(), embedder.clone(), RetrievalParams::default())
            .unwrap()
            .retrieve("What cameras do you rent?", Some(3))
            .await
            .unwrap();
        let min = unfiltered.items()[0].score;
        let retriever = Retriever::new(
            index,
            embedder,
            RetrievalParams {
                top_k: 3,
                min_score: Some(min),
            },
        )
        .unwrap();
        let filtered = retriever.retrieve("What cameras do you rent?", None).await.unwrap();
        assert!(!filtered.is_empty());
        assert!(filtered.items().iter().all(|h| h.score >= min));
        assert_eq!(filtered.items()[0], unfiltered.items()[0]);
    }

    #[tokio::test]
    async fn test_retrieve_deterministic() {
        let (index, embedder) = seeded().await;
        let retriever = Retriever::new(index, embedder, RetrievalParams::default()).unwrap();
        let a = retriever.retrieve("primes and zooms", Some(3)).await.unwrap();
        let b = retriever.retrieve("primes and zooms", Some(3)).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_top_k_config_rejected() {
        let err = Retriever::new(
            Arc::new(InMemoryIndex::default()),
            Arc::new(HashingEmbedder::new(8)),
            RetrievalParams {
                top_k: 0,
                min_score: None,
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    struct FlakyEmbedder {
        calls: AtomicUsize,
        fail_times: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_times {
                Err(RagError::upstream("flaky", "connection reset"))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_retried_once_then_surfaced() {
        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            fail_times: 1,
        });
        let retriever = Retriever::new(
            Arc::new(InMemoryIndex::default()),
            embedder.clone(),
            RetrievalParams::default(),
        )
        .unwrap();
        assert!(retriever.retrieve("q", None).await.is_ok());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let embedder = Arc::new(FlakyEmbedder {
            calls: AtomicUsize::new(0),
            fail_times: 5,
        });
        let retriever = Retriever::new(
            Arc::new(InMemoryIndex::default()),
            embedder.clone(),
            RetrievalParams::default(),
        )
        .unwrap();
        let err = retriever.retrieve("q", None).await.unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }
}
