//! Scraped-page corpus loader.
//!
//! Walks `corpus.root` and turns every matching file into [`Document`]s:
//!
//! | Extension | Contents |
//! |-----------|----------|
//! | `.json` | one `{ "url", "title", "content" }` object, or an array of them |
//! | `.jsonl` | one such object per line |
//! | `.txt`, `.md` | page text; source is `base_url/<relative path>`, title the first non-empty line |
//!
//! A file that cannot be read or parsed becomes a [`DocumentFailure`] and
//! the walk continues. Inside a `.json` array or a `.jsonl` file each
//! record stands alone: a bad one is reported as `<file>:<n>` and the
//! rest of the file still loads. Results are sorted by source for a stable order.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

use rental_rag_core::models::{Document, DocumentFailure};

use crate::config::{Config, CorpusConfig};

/// Documents and per-file failures found under a corpus root.
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub failures: Vec<DocumentFailure>,
}

/// A scraped page as written by the crawler.
#[derive(Debug, Deserialize)]
struct PageRecord {
    #[serde(alias = "source")]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(alias = "text")]
    content: String,
}

/// Resolve the corpus settings, letting `path` override the configured root.
pub fn corpus_settings(config: &Config, path: Option<&Path>) -> Result<CorpusConfig> {
    match (config.corpus.clone(), path) {
        (Some(mut corpus), Some(root)) => {
            corpus.root = root.to_path_buf();
            Ok(corpus)
        }
        (Some(corpus), None) => Ok(corpus),
        (None, Some(root)) => Ok(CorpusConfig::at(root)),
        (None, None) => bail!("No corpus configured: add a [corpus] section or pass --path"),
    }
}

/// Load every page under the corpus root.
///
/// # Errors
///
/// Fails only if the root is missing or a glob is invalid; per-file
/// problems are returned in [`CorpusLoad::failures`].
pub fn load_corpus(corpus: &CorpusConfig) -> Result<CorpusLoad> {
    let root = &corpus.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&corpus.include_globs)?;
    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut load = CorpusLoad::default();

    for entry in WalkDir::new(root).follow_links(corpus.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                load.failures.push(failure(
                    e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                    e.to_string(),
                ));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        if let Err(reason) = read_file(path, &rel_str, &corpus.base_url, &mut load) {
            load.failures.push(failure(rel_str, reason));
        }
    }

    load.documents.sort_by(|a, b| a.source().cmp(b.source()));
    Ok(load)
}

fn failure(source: impl Into<String>, reason: impl Into<String>) -> DocumentFailure {
    DocumentFailure {
        source: source.into(),
        reason: reason.into(),
    }
}

/// Parse one file into `load`. Bad records inside a `.json` array or a
/// `.jsonl` file are recorded as `<file>:<n>` failures; `Err` means the
/// whole file was unusable.
fn read_file(
    path: &Path,
    relative: &str,
    base_url: &str,
    load: &mut CorpusLoad,
) -> std::result::Result<(), String> {
    let body = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "json" => parse_json(&body, relative, load),
        "jsonl" => {
            parse_jsonl(&body, relative, load);
            Ok(())
        }
        _ => {
            load.documents.push(text_document(&body, relative, base_url)?);
            Ok(())
        }
    }
}

fn record_to_document(value: serde_json::Value) -> std::result::Result<Document, String> {
    let record: PageRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Document::new(record.url, record.title.trim(), record.content).map_err(|e| e.to_string())
}

fn push_record(
    load: &mut CorpusLoad,
    relative: &str,
    n: usize,
    parsed: std::result::Result<Document, String>,
) {
    match parsed {
        Ok(doc) => load.documents.push(doc),
        Err(reason) => load
            .failures
            .push(failure(format!("{}:{}", relative, n), reason)),
    }
}

fn parse_json(
    body: &str,
    relative: &str,
    load: &mut CorpusLoad,
) -> std::result::Result<(), String> {
    match serde_json::from_str::<serde_json::Value>(body).map_err(|e| e.to_string())? {
        serde_json::Value::Array(records) => {
            for (i, value) in records.into_iter().enumerate() {
                push_record(load, relative, i + 1, record_to_document(value));
            }
        }
        value => load.documents.push(record_to_document(value)?),
    }
    Ok(())
}

fn parse_jsonl(body: &str, relative: &str, load: &mut CorpusLoad) {
    for (n, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<serde_json::Value>(line)
            .map_err(|e| e.to_string())
            .and_then(record_to_document);
        push_record(load, relative, n + 1, parsed);
    }
}

fn text_document(
    body: &str,
    relative: &str,
    base_url: &str,
) -> std::result::Result<Document, String> {
    let title = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .unwrap_or_default();
    let source = format!("{}/{}", base_url.trim_end_matches('/'), relative);
    Document::new(source, title, body).map_err(|e| e.to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
