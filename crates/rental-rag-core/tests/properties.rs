//! Property tests for chunking and index ranking.

use proptest::prelude::*;
use rental_rag_core::chunk::{
    chunk_document, entry_id, expected_chunk_count, reassemble_tokens, tokenize,
};
use rental_rag_core::models::{Chunk, ChunkConfig, Document, IndexedEntry};
use rental_rag_core::store::memory::InMemoryIndex;
use rental_rag_core::store::VectorIndex;

/// Whitespace-separated words with irregular spacing.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(("[a-zA-Z0-9'.,é]{1,8}", "[ \t\n]{1,3}"), 0..120).prop_map(
        |parts| {
            parts
                .into_iter()
                .map(|(word, gap)| format!("{}{}", word, gap))
                .collect()
        },
    )
}

/// A valid `(max_tokens, overlap_tokens)` pair.
fn arb_config() -> impl Strategy<Value = ChunkConfig> {
    (1usize..40)
        .prop_flat_map(|max| (Just(max), 0..max))
        .prop_map(|(max, overlap)| ChunkConfig {
            max_tokens: max,
            overlap_tokens: overlap,
        })
}

fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-6 {
            return None;
        }
        for x in &mut v {
            *x /= norm;
        }
        Some(v)
    })
}

mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunk_count_follows_window_law(text in arb_text(), config in arb_config()) {
            let doc = Document::new("https://example.com/p", "P", text.clone()).unwrap();
            let chunks: Vec<Chunk> = chunk_document(&doc, config).unwrap().collect();
            let len = tokenize(&text).len();

            let expected = if len <= config.max_tokens {
                1
            } else {
                (len - config.overlap_tokens).div_ceil(config.max_tokens - config.overlap_tokens)
            };
            prop_assert_eq!(chunks.len(), expected);
            prop_assert_eq!(expected_chunk_count(len, config), expected);
        }

        #[test]
        fn chunks_reassemble_to_original_tokens(text in arb_text(), config in arb_config()) {
            let doc = Document::new("https://example.com/p", "P", text.clone()).unwrap();
            let chunks: Vec<Chunk> = chunk_document(&doc, config).unwrap().collect();
            let original: Vec<String> = tokenize(&text).into_iter().map(str::to_string).collect();
            prop_assert_eq!(reassemble_tokens(&chunks, config.overlap_tokens), original);
        }

        #[test]
        fn chunks_respect_bounds_and_overlap(text in arb_text(), config in arb_config()) {
            let doc = Document::new("https://example.com/p", "P", text).unwrap();
            let chunks: Vec<Chunk> = chunk_document(&doc, config).unwrap().collect();
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.sequence_index, i);
                prop_assert!(chunk.token_count <= config.max_tokens);
                prop_assert_eq!(chunk.token_count, tokenize(&chunk.text).len());
            }
            for pair in chunks.windows(2) {
                let prev = tokenize(&pair[0].text);
                let next = tokenize(&pair[1].text);
                let ov = config.overlap_tokens;
                prop_assert_eq!(&prev[prev.len() - ov..], &next[..ov]);
            }
        }

        #[test]
        fn chunking_is_restartable(text in arb_text(), config in arb_config()) {
            let doc = Document::new("https://example.com/p", "P", text).unwrap();
            let iter = chunk_document(&doc, config).unwrap();
            let first: Vec<Chunk> = iter.clone().collect();
            let second: Vec<Chunk> = iter.collect();
            let third: Vec<Chunk> = chunk_document(&doc, config).unwrap().collect();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&first, &third);
        }
    }
}

mod prop_index_ranking {
    use super::*;

    const DIM: usize = 8;

    fn entry(source: String, idx: usize, vector: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: entry_id(&source, idx),
            chunk: Chunk {
                text: format!("chunk {}", idx),
                source,
                title: String::new(),
                sequence_index: idx,
                token_count: 2,
                content_hash: String::new(),
            },
            vector,
            ingested_at: 0,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn search_is_descending_and_bounded(
            vectors in proptest::collection::vec(arb_normalized_embedding(DIM), 0..30),
            query in arb_normalized_embedding(DIM),
            k in 1usize..40,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let hits = rt.block_on(async {
                let index = InMemoryIndex::new("prop");
                let entries: Vec<IndexedEntry> = vectors
                    .iter()
                    .enumerate()
                    .map(|(i, v)| entry(format!("https://example.com/{}", i % 5), i, v.clone()))
                    .collect();
                index.upsert(&entries).await.unwrap();
                index.search(&query, k).await.unwrap()
            });

            prop_assert_eq!(hits.len(), k.min(vectors.len()));
            for pair in hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for hit in &hits {
                prop_assert!((-1.0..=1.0).contains(&hit.score));
            }
        }

        #[test]
        fn replace_source_leaves_no_duplicate_positions(
            first in 1usize..10,
            second in 1usize..10,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let stats = rt.block_on(async {
                let index = InMemoryIndex::new("prop");
                let src = "https://example.com/page".to_string();
                let make = |n: usize| -> Vec<IndexedEntry> {
                    (0..n).map(|i| entry(src.clone(), i, vec![1.0; DIM])).collect()
                };
                index.replace_source(&src, &make(first)).await.unwrap();
                index.replace_source(&src, &make(second)).await.unwrap();
                index.stats().await.unwrap()
            });
            prop_assert_eq!(stats.entry_count, second);
            prop_assert_eq!(stats.source_count, 1);
        }
    }
}
