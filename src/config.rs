//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! documented in `config/docqa.example.toml`. [`load_config`] parses and
//! validates in one step; nothing downstream re-checks these values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docqa_core::chunk::ChunkingParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            files_dir: default_files_dir(),
        }
    }
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("./data/files")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_document_chunk_size")]
    pub document_chunk_size: usize,
    #[serde(default = "default_document_overlap")]
    pub document_overlap: usize,
    #[serde(default = "default_adhoc_chunk_size")]
    pub adhoc_chunk_size: usize,
    #[serde(default = "default_adhoc_overlap")]
    pub adhoc_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            document_chunk_size: default_document_chunk_size(),
            document_overlap: default_document_overlap(),
            adhoc_chunk_size: default_adhoc_chunk_size(),
            adhoc_overlap: default_adhoc_overlap(),
        }
    }
}

fn default_document_chunk_size() -> usize {
    ChunkingParams::DOCUMENT.chunk_size
}
fn default_document_overlap() -> usize {
    ChunkingParams::DOCUMENT.overlap
}
fn default_adhoc_chunk_size() -> usize {
    ChunkingParams::ADHOC.chunk_size
}
fn default_adhoc_overlap() -> usize {
    ChunkingParams::ADHOC.overlap
}

impl ChunkingConfig {
    pub fn document(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.document_chunk_size,
            overlap: self.document_overlap,
        }
    }

    pub fn adhoc(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.adhoc_chunk_size,
            overlap: self.adhoc_overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    docqa_core::query::DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Embedding requests in flight per document.
    #[serde(default = "default_embed_concurrency")]
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            url: default_ollama_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_embed_concurrency(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_embed_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            url: default_ollama_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_model() -> String {
    "llama3.2:3b".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Documents ingested at the same time by the worker.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            max_attempts: default_max_attempts(),
            stale_after_secs: default_stale_after_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl IngestionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_worker_concurrency() -> usize {
    2
}
fn default_max_attempts() -> u32 {
    3
}
fn default_stale_after_secs() -> i64 {
    1800
}
fn default_poll_interval_secs() -> u64 {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    for (name, params) in [("document", chunking.document()), ("adhoc", chunking.adhoc())] {
        if params.chunk_size == 0 {
            anyhow::bail!("chunking.{name}_chunk_size must be > 0");
        }
        if params.overlap >= params.chunk_size {
            anyhow::bail!(
                "chunking.{name}_overlap must be smaller than chunking.{name}_chunk_size"
            );
        }
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "ollama" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or disabled.",
            other
        ),
    }
    if config.embedding.concurrency < 1 {
        anyhow::bail!("embedding.concurrency must be >= 1");
    }

    for (section, connect, total) in [
        (
            "embedding",
            config.embedding.connect_timeout_secs,
            config.embedding.timeout_secs,
        ),
        (
            "generation",
            config.generation.connect_timeout_secs,
            config.generation.timeout_secs,
        ),
    ] {
        if connect == 0 || total == 0 {
            anyhow::bail!("{section}.connect_timeout_secs and {section}.timeout_secs must be > 0");
        }
    }

    let ingestion = &config.ingestion;
    if ingestion.worker_concurrency < 1 {
        anyhow::bail!("ingestion.worker_concurrency must be >= 1");
    }
    if ingestion.max_attempts < 1 {
        anyhow::bail!("ingestion.max_attempts must be >= 1");
    }
    if ingestion.stale_after_secs < 1 || ingestion.poll_interval_secs < 1 {
        anyhow::bail!("ingestion.stale_after_secs and ingestion.poll_interval_secs must be >= 1");
    }

    Ok(())
}
