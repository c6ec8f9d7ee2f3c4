//! SQLite-backed [`VectorIndex`].
//!
//! Entries live in one `entries` table (see [`crate::migrate`]), with the
//! embedding stored as a little-endian `f32` BLOB. Search is brute-force
//! cosine similarity over every stored vector, which is fast enough for a
//! single business website.
//!
//! Writes run inside one transaction each. With WAL journaling a
//! concurrent search reads the last committed snapshot, so it sees either
//! all of a source's old entries or all of its new ones.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use rental_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use rental_rag_core::error::{RagError, Result};
use rental_rag_core::models::{Chunk, IndexStats, IndexedEntry, ScoredChunk};
use rental_rag_core::store::{format_ts_iso, rank_top_k, VectorIndex};

use crate::config::Config;
use crate::{db, migrate};

/// Vector index persisted in a SQLite file.
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
}

fn sql_err(e: sqlx::Error) -> RagError {
    RagError::index("sqlite", e.to_string())
}

impl SqliteIndex {
    /// Wrap an already-migrated pool.
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Open the configured index file, creating the schema if needed.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        Self::open_path(&config.index.path, &config.index.collection).await
    }

    pub async fn open_path(path: &Path, collection: &str) -> anyhow::Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool, collection))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Per-source entry counts, largest first.
    pub async fn source_breakdown(&self) -> Result<Vec<SourceSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT source, MAX(title) AS title, COUNT(*) AS chunks, MAX(ingested_at) AS last
            FROM entries
            GROUP BY source
            ORDER BY chunks DESC, source ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sql_err)?;

        rows.iter()
            .map(|row| -> Result<SourceSummary> {
                let chunks: i64 = row.try_get("chunks").map_err(sql_err)?;
                Ok(SourceSummary {
                    source: row.try_get("source").map_err(sql_err)?,
                    title: row.try_get("title").map_err(sql_err)?,
                    chunk_count: chunks as usize,
                    last_ingested_at: row.try_get("last").map_err(sql_err)?,
                })
            })
            .collect()
    }
}

/// Live entries for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub title: String,
    pub chunk_count: usize,
    /// Unix seconds.
    pub last_ingested_at: i64,
}

async fn insert_entry(conn: &mut SqliteConnection, entry: &IndexedEntry) -> Result<()> {
    // OR REPLACE also evicts a row holding the same (source, sequence_index)
    // under another id.
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO entries
            (id, source, title, sequence_index, token_count, text, content_hash, embedding, ingested_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.chunk.source)
    .bind(&entry.chunk.title)
    .bind(entry.chunk.sequence_index as i64)
    .bind(entry.chunk.token_count as i64)
    .bind(&entry.chunk.text)
    .bind(&entry.chunk.content_hash)
    .bind(vec_to_blob(&entry.vector))
    .bind(entry.ingested_at)
    .execute(&mut *conn)
    .await
    .map_err(sql_err)?;
    Ok(())
}

fn row_to_scored(row: &SqliteRow, query: &[f32]) -> Result<ScoredChunk> {
    let blob: Vec<u8> = row.try_get("embedding").map_err(sql_err)?;
    let sequence_index: i64 = row.try_get("sequence_index").map_err(sql_err)?;
    let token_count: i64 = row.try_get("token_count").map_err(sql_err)?;
    Ok(ScoredChunk {
        id: row.try_get("id").map_err(sql_err)?,
        chunk: Chunk {
            text: row.try_get("text").map_err(sql_err)?,
            source: row.try_get("source").map_err(sql_err)?,
            title: row.try_get("title").map_err(sql_err)?,
            sequence_index: sequence_index as usize,
            token_count: token_count as usize,
            content_hash: row.try_get("content_hash").map_err(sql_err)?,
        },
        score: cosine_similarity(query, &blob_to_vec(&blob)),
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(sql_err)?;
        for entry in entries {
            insert_entry(&mut tx, entry).await?;
        }
        tx.commit().await.map_err(sql_err)
    }

    async fn replace_source(&self, source: &str, entries: &[IndexedEntry]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(sql_err)?;
        let removed = sqlx::query("DELETE FROM entries WHERE source = ?")
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(sql_err)?
            .rows_affected();
        for entry in entries {
            insert_entry(&mut tx, entry).await?;
        }
        tx.commit().await.map_err(sql_err)?;
        Ok(removed as usize)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, source, title, sequence_index, token_count, text, content_hash, embedding \
             FROM entries",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sql_err)?;

        let hits = rows
            .iter()
            .map(|row| row_to_scored(row, query))
            .collect::<Result<Vec<_>>>()?;
        Ok(rank_top_k(hits, k))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n, COUNT(DISTINCT source) AS sources, MAX(ingested_at) AS last \
             FROM entries",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(sql_err)?;

        let n: i64 = row.try_get("n").map_err(sql_err)?;
        let sources: i64 = row.try_get("sources").map_err(sql_err)?;
        let last: Option<i64> = row.try_get("last").map_err(sql_err)?;
        Ok(IndexStats {
            entry_count: n as usize,
            collection: self.collection.clone(),
            source_count: sources as usize,
            last_ingested_at: last.map(format_ts_iso),
        })
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM entries")
            .execute(&self.pool)
            .await
            .map_err(sql_err)?;
        Ok(())
    }
}
