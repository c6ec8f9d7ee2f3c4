//! `rag ingest`: load the scraped corpus and refresh the index.
//!
//! Each document's previous entries are replaced in one step, so running
//! the command twice over the same pages leaves the index unchanged.

use anyhow::Result;
use std::path::Path;

use rental_rag_core::chunk::{expected_chunk_count, tokenize};
use rental_rag_core::models::DocumentFailure;

use crate::config::Config;
use crate::corpus::corpus_settings;
use crate::engine::{ingest_corpus, open_engine, read_corpus};

pub async fn run_ingest(config: &Config, path: Option<&Path>, dry_run: bool) -> Result<()> {
    let corpus = corpus_settings(config, path)?;

    if dry_run {
        let load = read_corpus(&corpus).await?;
        let chunking = config.engine_config().chunking;
        let estimated: usize = load
            .documents
            .iter()
            .map(|doc| expected_chunk_count(tokenize(doc.text()).len(), chunking))
            .sum();
        println!("ingest {} (dry-run)", corpus.root.display());
        println!("  documents found: {}", load.documents.len());
        println!("  estimated chunks: {}", estimated);
        print_failures(&load.failures);
        return Ok(());
    }

    let engine = open_engine(config).await?;
    let report = ingest_corpus(&engine, &corpus).await?;

    println!("ingest {}", corpus.root.display());
    println!("  documents ingested: {}", report.documents_ingested);
    println!("  chunks created: {}", report.chunks_created);
    print_failures(&report.failures);
    println!("ok");
    Ok(())
}

fn print_failures(failures: &[DocumentFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("  failed: {}", failures.len());
    for f in failures {
        println!("    {}: {}", f.source, f.reason);
    }
}
