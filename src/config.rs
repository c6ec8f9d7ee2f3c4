//! TOML configuration.
//!
//! Every section has serde defaults, so a minimal file only needs the
//! settings that differ. [`load_config`] parses and validates the file and
//! fails on the first violation.
//!
//! ```toml
//! [index]
//! path = "./data/rag.sqlite"
//!
//! [embedding]
//! provider = "hashing"
//! dims = 256
//!
//! [llm]
//! provider = "extractive"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use rental_rag_core::generate::GeneratorConfig;
use rental_rag_core::models::ChunkConfig;
use rental_rag_core::prompt::PromptTemplate;
use rental_rag_core::rag::EngineConfig;
use rental_rag_core::search::RetrievalParams;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus: Option<CorpusConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/rag.sqlite")
}
fn default_collection() -> String {
    "rental_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Required for remote providers; `hashing` defaults to 256.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama or an OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            temperature: default_temperature(),
            max_tokens: default_llm_max_tokens(),
            max_context_tokens: default_max_context_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_provider() -> String {
    "extractive".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_max_tokens() -> u32 {
    500
}
fn default_max_context_tokens() -> usize {
    6000
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_business_name")]
    pub business_name: String,
    #[serde(default = "default_contact")]
    pub contact: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            business_name: default_business_name(),
            contact: default_contact(),
        }
    }
}

fn default_business_name() -> String {
    PromptTemplate::default().business_name
}
fn default_contact() -> String {
    PromptTemplate::default().contact
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Where scraped pages live on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Prefix for the source URL of `.txt` / `.md` pages.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl CorpusConfig {
    /// Default settings rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            base_url: default_base_url(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.json".to_string(),
        "**/*.jsonl".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}
fn default_base_url() -> String {
    "https://example.com".to_string()
}

impl Config {
    /// Core engine settings derived from this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunking: ChunkConfig {
                max_tokens: self.chunking.max_tokens,
                overlap_tokens: self.chunking.overlap_tokens,
            },
            retrieval: RetrievalParams {
                top_k: self.retrieval.top_k,
                min_score: self.retrieval.min_score,
            },
            generation: GeneratorConfig {
                max_context_tokens: self.llm.max_context_tokens,
                template: PromptTemplate {
                    business_name: self.prompt.business_name.clone(),
                    contact: self.prompt.contact.clone(),
                },
            },
            embed_batch_size: self.embedding.batch_size,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!(
            "chunking.overlap_tokens ({}) must be < chunking.max_tokens ({})",
            config.chunking.overlap_tokens,
            config.chunking.max_tokens
        );
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if let Some(min) = config.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "hashing" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or hashing.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.provider != "hashing" {
        if config.embedding.dims.is_none() {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // LLM
    match config.llm.provider.as_str() {
        "openai" | "extractive" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be openai or extractive.",
            other
        ),
    }
    if config.llm.max_context_tokens == 0 {
        bail!("llm.max_context_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
