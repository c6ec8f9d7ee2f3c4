//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only contract the rest of the core has
//! with storage, enabling pluggable backends (SQLite in the app crate,
//! [`memory::InMemoryIndex`] for tests and WASM targets).
//!
//! Implementations must be `Send + Sync`; ingestion and search may run
//! concurrently and a search must never observe a half-written entry.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Insert or replace entries by id |
//! | [`replace_source`](VectorIndex::replace_source) | Atomically swap all entries of one source |
//! | [`search`](VectorIndex::search) | Top-k cosine similarity search |
//! | [`stats`](VectorIndex::stats) | Point-in-time entry count and collection name |
//! | [`clear`](VectorIndex::clear) | Remove every entry |
//!
//! # Invariant
//!
//! No two live entries share a `(source, sequence_index)` pair. Ingestion
//! goes through [`replace_source`](VectorIndex::replace_source), which
//! removes every previous entry of the source before the new ones become
//! visible.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{IndexStats, IndexedEntry, ScoredChunk};

/// Storage backend supporting upsert and k-nearest-neighbour search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace entries, keyed by id.
    ///
    /// Re-upserting an id replaces its vector, text, and metadata as one
    /// unit. An existing entry holding the same `(source, sequence_index)`
    /// under a different id is replaced too.
    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()>;

    /// Remove every entry of `source` and insert `entries` in one atomic
    /// step. Returns the number of entries removed.
    async fn replace_source(&self, source: &str, entries: &[IndexedEntry]) -> Result<usize>;

    /// Return at most `k` entries ranked by descending cosine similarity.
    ///
    /// An empty index yields an empty vector, not an error.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Snapshot of the index size.
    async fn stats(&self) -> Result<IndexStats>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;
}

/// Sort scored chunks by descending score, ties broken by source then
/// sequence index so ranking is reproducible, and keep the first `k`.
///
/// A NaN score ranks below every real score.
pub fn rank_top_k(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    fn key(score: f32) -> f32 {
        if score.is_nan() {
            f32::NEG_INFINITY
        } else {
            score
        }
    }

    hits.sort_by(|a, b| {
        key(b.score)
            .total_cmp(&key(a.score))
            .then_with(|| a.chunk.source.cmp(&b.chunk.source))
            .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
    });
    hits.truncate(k);
    hits
}

/// Format a Unix timestamp as RFC 3339 (UTC, seconds precision).
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn hit(source: &str, idx: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            id: format!("{}#{}", source, idx),
            chunk: Chunk {
                text: String::new(),
                source: source.to_string(),
                title: String::new(),
                sequence_index: idx,
                token_count: 0,
                content_hash: String::new(),
            },
            score,
        }
    }

    #[test]
    fn test_rank_top_k_orders_and_truncates() {
        let hits = vec![hit("a", 0, 0.1), hit("b", 0, 0.9), hit("c", 0, 0.5)];
        let ranked = rank_top_k(hits, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.source, "b");
        assert_eq!(ranked[1].chunk.source, "c");
    }

    #[test]
    fn test_rank_top_k_ties_are_stable() {
        let hits = vec![hit("b", 1, 0.5), hit("a", 0, 0.5), hit("b", 0, 0.5)];
        let ranked = rank_top_k(hits, 10);
        let keys: Vec<(String, usize)> = ranked
            .iter()
            .map(|h| (h.chunk.source.clone(), h.chunk.sequence_index))
            .collect();
        assert_eq!(
            keys,
            vec![("a".into(), 0), ("b".into(), 0), ("b".into(), 1)]
        );
    }

    #[test]
    fn test_rank_top_k_nan_scores_rank_last() {
        let hits: Vec<ScoredChunk> = (0..64)
            .map(|i| {
                let score = if i % 3 == 0 { f32::NAN } else { i as f32 / 64.0 };
                hit("s", i, score)
            })
            .collect();
        let ranked = rank_top_k(hits, 64);
        assert_eq!(ranked.len(), 64);
        assert_eq!(ranked[0].chunk.sequence_index, 62);
        let real = ranked.iter().take_while(|h| !h.score.is_nan()).count();
        assert_eq!(real, 42);
        assert!(ranked[real..].iter().all(|h| h.score.is_nan()));
        assert!(ranked[..real].windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
