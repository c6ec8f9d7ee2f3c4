//! In-memory [`VectorIndex`] implementation for testing and WASM targets.
//!
//! Entries live in a `HashMap` behind one `std::sync::RwLock`. Every write
//! (including a whole-source replacement) happens under a single write
//! guard, so readers see either the old or the new state, never a mix.
//! Search is brute-force cosine similarity over all stored vectors.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{IndexStats, IndexedEntry, ScoredChunk};

use super::{format_ts_iso, rank_top_k, VectorIndex};

/// In-memory vector index.
pub struct InMemoryIndex {
    collection: String,
    entries: RwLock<HashMap<String, IndexedEntry>>,
}

impl InMemoryIndex {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, IndexedEntry>>> {
        self.entries
            .read()
            .map_err(|_| RagError::index("memory", "index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, IndexedEntry>>> {
        self.entries
            .write()
            .map_err(|_| RagError::index("memory", "index lock poisoned"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new("default")
    }
}

fn insert_entry(map: &mut HashMap<String, IndexedEntry>, entry: &IndexedEntry) {
    map.retain(|id, e| {
        id == &entry.id
            || e.chunk.source != entry.chunk.source
            || e.chunk.sequence_index != entry.chunk.sequence_index
    });
    map.insert(entry.id.clone(), entry.clone());
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()> {
        let mut map = self.write()?;
        for entry in entries {
            insert_entry(&mut map, entry);
        }
        Ok(())
    }

    async fn replace_source(&self, source: &str, entries: &[IndexedEntry]) -> Result<usize> {
        let mut map = self.write()?;
        let before = map.len();
        map.retain(|_, e| e.chunk.source != source);
        let removed = before - map.len();
        for entry in entries {
            insert_entry(&mut map, entry);
        }
        Ok(removed)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let map = self.read()?;
        let hits: Vec<ScoredChunk> = map
            .values()
            .map(|e| ScoredChunk {
                id: e.id.clone(),
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        Ok(rank_top_k(hits, k))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let map = self.read()?;
        let sources: HashSet<&str> = map.values().map(|e| e.chunk.source.as_str()).collect();
        let last = map.values().map(|e| e.ingested_at).max();
        Ok(IndexStats {
            entry_count: map.len(),
            collection: self.collection.clone(),
            source_count: sources.len(),
            last_ingested_at: last.map(format_ts_iso),
        })
    }

    async fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::entry_id;
    use crate::models::Chunk;

    fn entry(source: &str, idx: usize, text: &str, vector: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: entry_id(source, idx),
            chunk: Chunk {
                text: text.to_string(),
                source: source.to_string(),
                title: String::new(),
                sequence_index: idx,
                token_count: text.split_whitespace().count(),
                content_hash: String::new(),
            },
            vector,
            ingested_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_empty_index_search_is_empty() {
        let index = InMemoryIndex::new("test");
        let hits = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.collection, "test");
        assert!(stats.last_ingested_at.is_none());
    }

    #[tokio::test]
    async fn test_search_ranks_descending_and_bounds_k() {
        let index = InMemoryIndex::new("test");
        index
            .upsert(&[
                entry("a", 0, "x", vec![1.0, 0.0]),
                entry("b", 0, "y", vec![0.7, 0.7]),
                entry("c", 0, "z", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source, "a");
        assert_eq!(hits[1].chunk.source, "b");
        assert!(hits[0].score >= hits[1].score);

        let all = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_same_id_replaces() {
        let index = InMemoryIndex::new("test");
        index.upsert(&[entry("a", 0, "old", vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[entry("a", 0, "new", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.stats().await.unwrap().entry_count, 1);
        let hits = index.search(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn test_upsert_different_id_same_position_replaces() {
        let index = InMemoryIndex::new("test");
        let mut first = entry("a", 0, "old", vec![1.0, 0.0]);
        first.id = "legacy-id".to_string();
        index.upsert(&[first]).await.unwrap();
        index.upsert(&[entry("a", 0, "new", vec![1.0, 0.0])]).await.unwrap();
        let hits = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn test_replace_source_removes_stale_entries() {
        let index = InMemoryIndex::new("test");
        index
            .replace_source(
                "a",
                &[
                    entry("a", 0, "one", vec![1.0, 0.0]),
                    entry("a", 1, "two", vec![1.0, 0.1]),
                    entry("a", 2, "three", vec![1.0, 0.2]),
                ],
            )
            .await
            .unwrap();
        index.upsert(&[entry("b", 0, "other", vec![0.0, 1.0])]).await.unwrap();

        let removed = index
            .replace_source("a", &[entry("a", 0, "fresh", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(removed, 3);

        let hits = index.search(&[1.0, 0.0], 10).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert!(texts.contains(&"fresh"));
        assert!(texts.contains(&"other"));
        assert!(!texts.contains(&"two"));
        assert!(!texts.contains(&"three"));
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.source_count, 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let index = InMemoryIndex::new("test");
        index.upsert(&[entry("a", 0, "x", vec![1.0])]).await.unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.stats().await.unwrap().entry_count, 0);
    }
}
