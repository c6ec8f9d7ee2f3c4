//! Index statistics overview.
//!
//! Summarises what is indexed: entry and source counts, file size, and a
//! per-source breakdown. Used by `rag stats` to confirm that an ingest
//! landed.

use anyhow::Result;

use rental_rag_core::store::VectorIndex;

use crate::config::Config;
use crate::sqlite_index::SqliteIndex;

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(config).await?;
    let stats = index.stats().await?;
    let sources = index.source_breakdown().await?;

    let db_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Rental RAG Index Stats");
    println!("======================");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", stats.collection);
    println!(
        "  Embeddings:  {}",
        config
            .embedding
            .model
            .as_deref()
            .unwrap_or(&config.embedding.provider)
    );
    println!();
    println!("  Entries:     {}", stats.entry_count);
    println!("  Sources:     {}", stats.source_count);
    println!(
        "  Last ingest: {}",
        stats.last_ingested_at.as_deref().unwrap_or("never")
    );

    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<56} {:>7}   {}", "SOURCE", "CHUNKS", "INGESTED");
        println!("  {}", "-".repeat(80));

        for s in &sources {
            println!(
                "  {:<56} {:>7}   {}",
                truncate(&s.source, 56),
                s.chunk_count,
                format_ts_relative(s.last_ingested_at)
            );
        }
    }

    println!();

    index.close().await;
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", kept)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_short(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_short(ts)
    }
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
