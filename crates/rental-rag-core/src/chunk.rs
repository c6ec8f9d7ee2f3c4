//! Overlapping token-window chunker.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `max_tokens` tokens,
//! where consecutive chunks share exactly `overlap_tokens` tokens.
//!
//! A token is a maximal run of non-whitespace characters, so a chunk
//! boundary never falls inside a word. Each chunk's text is its tokens
//! joined by a single space.
//!
//! # Algorithm
//!
//! 1. Tokenize the document body on Unicode whitespace.
//! 2. The first window starts at token 0.
//! 3. Each following window starts `max_tokens - overlap_tokens` tokens
//!    after the previous one.
//! 4. Stop after the first window that reaches the last token. The final
//!    window may be shorter than `max_tokens` (no padding).
//! 5. A document of at most `max_tokens` tokens (including an empty one)
//!    yields exactly one chunk.
//!
//! For `L` tokens the chunk count is `ceil((L - overlap) / (max - overlap))`
//! when `L > max`, and `1` otherwise.
//!
//! # Example
//!
//! ```rust
//! use rental_rag_core::chunk::chunk_document;
//! use rental_rag_core::models::{ChunkConfig, Document};
//!
//! let doc = Document::new("https://example.com/a", "A", "one two three four five").unwrap();
//! let chunks: Vec<_> = chunk_document(&doc, ChunkConfig::new(3, 1).unwrap())
//!     .unwrap()
//!     .collect();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "one two three");
//! assert_eq!(chunks[1].text, "three four five");
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Chunk, ChunkConfig, Document};

/// Lazy, finite sequence of chunks for one document.
///
/// Cloning the iterator (or calling [`chunk_document`] again) restarts the
/// sequence and yields identical chunks.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    doc: &'a Document,
    tokens: Vec<&'a str>,
    config: ChunkConfig,
    next_start: usize,
    next_index: usize,
    done: bool,
}

/// Chunk `doc` with `config`.
///
/// # Errors
///
/// [`RagError::Configuration`](crate::error::RagError::Configuration) if
/// `overlap_tokens >= max_tokens` or `max_tokens == 0`.
pub fn chunk_document(doc: &Document, config: ChunkConfig) -> Result<Chunks<'_>> {
    config.validate()?;
    Ok(Chunks {
        doc,
        tokens: tokenize(doc.text()),
        config,
        next_start: 0,
        next_index: 0,
        done: false,
    })
}

/// Split text into whitespace-delimited tokens.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Number of whitespace tokens in `text`.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Expected chunk count for `token_len` tokens under `config`.
pub fn expected_chunk_count(token_len: usize, config: ChunkConfig) -> usize {
    if token_len <= config.max_tokens {
        return 1;
    }
    let stride = config.stride();
    (token_len - config.overlap_tokens).div_ceil(stride)
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.config.max_tokens).min(self.tokens.len());
        let window = &self.tokens[start..end];

        let chunk = make_chunk(self.doc, self.next_index, window);

        if end >= self.tokens.len() {
            self.done = true;
        } else {
            self.next_start = start + self.config.stride();
            self.next_index += 1;
        }
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.tokens.len() - self.next_start;
        let n = expected_chunk_count(remaining, self.config);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Stable entry identifier for the chunk at `sequence_index` of `source`.
///
/// UUID v5 over `"{source}#{sequence_index}"`, so re-ingesting a source
/// addresses the same ids.
pub fn entry_id(source: &str, sequence_index: usize) -> String {
    let name = format!("{}#{}", source, sequence_index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Rebuild the token sequence of a document from its ordered chunks by
/// dropping each chunk's leading overlap.
pub fn reassemble_tokens(chunks: &[Chunk], overlap_tokens: usize) -> Vec<String> {
    let mut tokens = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap_tokens };
        tokens.extend(chunk.text.split_whitespace().skip(skip).map(str::to_string));
    }
    tokens
}

fn make_chunk(doc: &Document, index: usize, window: &[&str]) -> Chunk {
    let text = window.join(" ");
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    Chunk {
        text,
        source: doc.source().to_string(),
        title: doc.title().to_string(),
        sequence_index: index,
        token_count: window.len(),
        content_hash,
    }
}
