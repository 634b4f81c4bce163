//! Configuration parsing and validation.
//!
//! Agent Catalog is configured via a TOML file (default: `./agentc.toml`).
//! Every section is optional; a missing file means all defaults.
//!
//! # Example
//!
//! ```toml
//! [catalog]
//! path = ".agent-catalog"
//! source_dirs = ["tools", "prompts"]
//! max_errs = 10
//!
//! [embedding]
//! provider = "local"
//! model = "sentence-transformers/all-MiniLM-L12-v2"
//!
//! [remote]
//! db_path = "./data/catalog.sqlite"
//! bucket = "travel_agent"
//!
//! [refiner]
//! enabled = true
//! no_more_than_k = 3
//!
//! [activity]
//! log_path = ".agent-activity/activity.jsonl"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use agent_catalog_core::embedding::DEFAULT_EMBEDDING_MODEL;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub refiner: RefinerConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Directory holding `tool-catalog.json` and `prompt-catalog.json`.
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<PathBuf>,
    /// Error budget for extraction and embedding; `<= 0` is unbounded.
    #[serde(default = "default_max_errs")]
    pub max_errs: i64,
    #[serde(default = "default_max_description_words")]
    pub max_description_words: usize,
    #[serde(default = "default_unwanted_patterns")]
    pub unwanted_patterns: Vec<String>,
    #[serde(default = "default_ignore_file_names")]
    pub ignore_file_names: Vec<String>,
    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            source_dirs: default_source_dirs(),
            max_errs: default_max_errs(),
            max_description_words: default_max_description_words(),
            unwanted_patterns: default_unwanted_patterns(),
            ignore_file_names: default_ignore_file_names(),
            project: default_project(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(".agent-catalog")
}
fn default_source_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}
fn default_max_errs() -> i64 {
    10
}
fn default_max_description_words() -> usize {
    256
}
fn default_unwanted_patterns() -> Vec<String> {
    vec![
        ".git".to_string(),
        "**/.git/**".to_string(),
        "**/__pycache__/**".to_string(),
        "*.lock".to_string(),
        "*.toml".to_string(),
        "*.md".to_string(),
    ]
}
fn default_ignore_file_names() -> Vec<String> {
    vec![".gitignore".to_string()]
}
fn default_project() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, or `local`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
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
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Model name recorded in catalogs built with this configuration.
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string())
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Remote catalog store. The SQLite file stands in for a shared document
/// database; every collection is namespaced by `bucket`.
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Timeout for vector queries against the store.
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bucket() -> String {
    "agent_catalog".to_string()
}
fn default_query_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RefinerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub no_more_than_k: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ActivityConfig {
    /// Append activity records as JSON lines to this file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Also write activity records to the remote store.
    #[serde(default)]
    pub remote: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    /// Environment variables captured into the secrets provider at startup.
    #[serde(default = "default_secret_env")]
    pub from_env: Vec<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            from_env: default_secret_env(),
        }
    }
}

fn default_secret_env() -> Vec<String> {
    vec!["OPENAI_API_KEY".to_string()]
}

impl Config {
    /// Path of the local catalog file for `kind`.
    pub fn catalog_file(&self, kind: agent_catalog_core::models::CatalogKind) -> PathBuf {
        self.catalog.path.join(kind.file_name())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.catalog.source_dirs.is_empty() {
        bail!("catalog.source_dirs must list at least one directory");
    }
    if config.catalog.max_description_words == 0 {
        bail!("catalog.max_description_words must be > 0");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            // Ollama reports the width with each vector; OpenAI needs it up front.
            if config.embedding.provider == "openai" && config.embedding.dims.is_none() {
                bail!("embedding.dims must be specified when provider is 'openai'");
            }
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0");
            }
        }
        "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }

    if let Some(remote) = &config.remote {
        if remote.bucket.is_empty()
            || !remote
                .bucket
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!(
                "remote.bucket must be non-empty and contain only letters, digits, and '_': '{}'",
                remote.bucket
            );
        }
        if remote.timeout_secs == 0 {
            bail!("remote.timeout_secs must be > 0");
        }
    }

    if config.refiner.no_more_than_k == Some(0) {
        bail!("refiner.no_more_than_k must be > 0 when set");
    }

    Ok(())
}
