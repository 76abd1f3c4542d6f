use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Declared dimensionality. Must agree with the model table when set.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
    #[serde(default)]
    pub show_download_progress: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dims: None,
            batch_size: default_batch_size(),
            load_timeout_secs: default_load_timeout_secs(),
            show_download_progress: false,
        }
    }
}

fn default_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_load_timeout_secs() -> u64 {
    300
}

impl EmbeddingConfig {
    /// Dimensionality of the configured model, from the model table.
    pub fn model_dims(&self) -> Result<usize> {
        known_model_dims(&self.model).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown embedding model: '{}'. Supported models: {}",
                self.model,
                KNOWN_MODELS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }
}

/// Supported models and their output dimensionality.
pub const KNOWN_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("nomic-embed-text-v1.5", 768),
    ("multilingual-e5-small", 384),
];

pub fn known_model_dims(model: &str) -> Option<usize> {
    KNOWN_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, dims)| *dims)
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,
    #[serde(default = "default_max_chunks_per_source_type")]
    pub max_chunks_per_source_type: usize,
    #[serde(default = "default_min_chunk_length")]
    pub min_chunk_length: usize,
    #[serde(default = "default_min_slack_message_length")]
    pub min_slack_message_length: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            candidate_k: default_candidate_k(),
            max_context_chunks: default_max_context_chunks(),
            max_chunks_per_source_type: default_max_chunks_per_source_type(),
            min_chunk_length: default_min_chunk_length(),
            min_slack_message_length: default_min_slack_message_length(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    100
}
fn default_candidate_k() -> usize {
    30
}
fn default_max_context_chunks() -> usize {
    10
}
fn default_max_chunks_per_source_type() -> usize {
    4
}
fn default_min_chunk_length() -> usize {
    10
}
fn default_min_slack_message_length() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_lines_per_chunk")]
    pub lines_per_chunk: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lines_per_chunk: default_lines_per_chunk(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            source_type: default_source_type(),
        }
    }
}

fn default_lines_per_chunk() -> usize {
    20
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}
fn default_source_type() -> String {
    "file".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Dimensionality is a property of the model, not something we discover at runtime
    let model_dims = config.embedding.model_dims()?;
    if let Some(dims) = config.embedding.dims {
        if dims != model_dims {
            bail!(
                "embedding.dims = {} does not match model '{}' ({} dims)",
                dims,
                config.embedding.model,
                model_dims
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.load_timeout_secs == 0 {
        bail!("embedding.load_timeout_secs must be > 0");
    }

    if config.retrieval.default_top_k == 0 {
        bail!("retrieval.default_top_k must be >= 1");
    }
    if config.retrieval.max_top_k < config.retrieval.default_top_k {
        bail!("retrieval.max_top_k must be >= retrieval.default_top_k");
    }
    if config.retrieval.candidate_k == 0 {
        bail!("retrieval.candidate_k must be >= 1");
    }

    if config.ingest.lines_per_chunk == 0 {
        bail!("ingest.lines_per_chunk must be > 0");
    }

    Ok(())
}
