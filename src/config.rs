//! TOML configuration.
//!
//! Every section is optional and falls back to the defaults below, so an
//! empty file is a valid configuration. [`load_config`] parses, applies the
//! `ASKDOC_ADMIN_TOKEN` override, and validates.

use anyhow::{bail, Context, Result};
use askdoc_core::chunk::ChunkOptions;
use askdoc_core::compose::{AnswerMode, ComposerSettings, RetrievalPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `server.admin_token`.
pub const ADMIN_TOKEN_ENV: &str = "ASKDOC_ADMIN_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret for the admin endpoints. Admin access is refused
    /// entirely while unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            admin_token: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5002".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_knowledge_base")]
    pub knowledge_base: PathBuf,
    #[serde(default = "default_upload_log")]
    pub upload_log: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            knowledge_base: default_knowledge_base(),
            upload_log: default_upload_log(),
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_knowledge_base() -> PathBuf {
    PathBuf::from("./data/knowledge_base.json")
}
fn default_upload_log() -> PathBuf {
    PathBuf::from("./data/upload_logs.json")
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default)]
    pub overlap: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: 0,
            min_words: default_min_words(),
        }
    }
}

fn default_chunk_size() -> usize {
    250
}
fn default_min_words() -> usize {
    31
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            size: self.size,
            overlap: self.overlap,
            min_words: self.min_words,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_single_threshold")]
    pub single_threshold: f32,
    #[serde(default = "default_multi_threshold")]
    pub multi_threshold: f32,
    #[serde(default = "default_multi_top_k")]
    pub multi_top_k: usize,
    /// `0` disables per-source diversification.
    #[serde(default = "default_max_per_source")]
    pub max_per_source: usize,
    #[serde(default = "default_multi_chunk_keywords")]
    pub multi_chunk_keywords: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            single_threshold: default_single_threshold(),
            multi_threshold: default_multi_threshold(),
            multi_top_k: default_multi_top_k(),
            max_per_source: default_max_per_source(),
            multi_chunk_keywords: default_multi_chunk_keywords(),
        }
    }
}

fn default_single_threshold() -> f32 {
    0.35
}
fn default_multi_threshold() -> f32 {
    0.25
}
fn default_multi_top_k() -> usize {
    3
}
fn default_max_per_source() -> usize {
    3
}
fn default_multi_chunk_keywords() -> Vec<String> {
    RetrievalPolicy::default().multi_chunk_keywords
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default)]
    pub mode: AnswerMode,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            mode: AnswerMode::Extractive,
            organization: default_organization(),
            max_sentences: default_max_sentences(),
        }
    }
}

fn default_organization() -> String {
    "the company".to_string()
}
fn default_max_sentences() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Deadline for one provider call.
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub primary: Option<GeneratorConfig>,
    #[serde(default)]
    pub fallback: Option<GeneratorConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_generation_timeout_secs(),
            primary: None,
            fallback: None,
        }
    }
}

fn default_generation_timeout_secs() -> u64 {
    15
}

/// One generation backend.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// `"ollama"` or `"openai"`.
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Config {
    /// Defaults for every section, as if loaded from an empty file.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn composer_settings(&self) -> ComposerSettings {
        ComposerSettings {
            retrieval: RetrievalPolicy {
                single_threshold: self.retrieval.single_threshold,
                multi_threshold: self.retrieval.multi_threshold,
                multi_top_k: self.retrieval.multi_top_k,
                max_per_source: match self.retrieval.max_per_source {
                    0 => None,
                    n => Some(n),
                },
                multi_chunk_keywords: self
                    .retrieval
                    .multi_chunk_keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .collect(),
            },
            mode: self.answer.mode,
            organization: self.answer.organization.clone(),
            max_sentences: self.answer.max_sentences,
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 {
            bail!("chunking.size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.size {
            bail!("chunking.overlap must be < chunking.size");
        }

        for (name, value) in [
            ("retrieval.single_threshold", self.retrieval.single_threshold),
            ("retrieval.multi_threshold", self.retrieval.multi_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                bail!("{} must be in [-1.0, 1.0]", name);
            }
        }
        if self.retrieval.multi_top_k == 0 {
            bail!("retrieval.multi_top_k must be >= 1");
        }

        if self.upload.max_bytes == 0 {
            bail!("upload.max_bytes must be > 0");
        }
        if self.answer.max_sentences == 0 {
            bail!("answer.max_sentences must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if matches!(self.embedding.dims, None | Some(0)) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        for (name, generator) in [
            ("generation.primary", &self.generation.primary),
            ("generation.fallback", &self.generation.fallback),
        ] {
            if let Some(g) = generator {
                match g.provider.as_str() {
                    "ollama" | "openai" => {}
                    other => bail!(
                        "Unknown {} provider: '{}'. Must be ollama or openai.",
                        name,
                        other
                    ),
                }
            }
        }

        if self.answer.mode == AnswerMode::Generative && self.generation.primary.is_none() {
            bail!("answer.mode = \"generative\" requires a [generation.primary] section");
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be > 0");
        }

        Ok(())
    }
}

/// Parse a config from TOML text, apply the environment override, validate.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;

    if let Ok(token) = std::env::var(ADMIN_TOKEN_ENV) {
        if !token.is_empty() {
            config.server.admin_token = Some(token);
        }
    }

    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
