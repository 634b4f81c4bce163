//! Embedding model implementations.
//!
//! Concrete [`EmbeddingModel`]s selected by `[embedding] provider`:
//! - **[`OpenAiModel`]** calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaModel`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalModel`]** runs a sentence-transformer locally via fastembed; no
//!   network calls after the first model download.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama models use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use agent_catalog_core::embedding::EmbeddingModel;
use agent_catalog_core::CatalogError;

use crate::config::EmbeddingConfig;
use crate::secrets::SecretsProvider;

const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

fn embedding_error(model: &str, e: anyhow::Error) -> CatalogError {
    CatalogError::Embedding {
        name: model.to_string(),
        message: format!("{:#}", e),
    }
}

fn first_vector(model: &str, mut vectors: Vec<Vec<f32>>) -> agent_catalog_core::Result<Vec<f32>> {
    if vectors.is_empty() {
        return Err(embedding_error(model, anyhow!("empty embedding response")));
    }
    Ok(vectors.swap_remove(0))
}

/// Reject a vector whose width differs from the configured `embedding.dims`.
fn check_dims(
    model: &str,
    expected: Option<usize>,
    vector: Vec<f32>,
) -> agent_catalog_core::Result<Vec<f32>> {
    match expected {
        Some(dims) if dims != vector.len() => Err(embedding_error(
            model,
            anyhow!("expected {} dimensions, got {}", dims, vector.len()),
        )),
        _ => Ok(vector),
    }
}

/// POST `body` to `url`, retrying 429/5xx and network errors with backoff.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", label)))
}

// ============ OpenAI ============

pub struct OpenAiModel {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiModel {
    /// Requires `embedding.model`, `embedding.dims`, and an `OPENAI_API_KEY` secret.
    pub fn new(config: &EmbeddingConfig, secrets: &SecretsProvider) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = secrets
            .get(OPENAI_API_KEY)
            .ok_or_else(|| anyhow!("{} is not set", OPENAI_API_KEY))?
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }

}

#[async_trait]
impl EmbeddingModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn encode(&self, text: &str) -> agent_catalog_core::Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = post_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(|e| embedding_error(&self.model, e))?;
        let vectors = parse_openai_response(&json).map_err(|e| embedding_error(&self.model, e))?;
        check_dims(&self.model, Some(self.dims), first_vector(&self.model, vectors)?)
    }
}

/// Extract the `data[].embedding` arrays, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push((index, vec));
    }

    embeddings.sort_by_key(|(index, _)| *index);
    Ok(embeddings.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaModel {
    model: String,
    dims: Option<usize>,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims: config.dims,
            url,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn encode(&self, text: &str) -> agent_catalog_core::Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = post_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(|e| embedding_error(&self.model, e))?;
        let vectors = parse_ollama_response(&json).map_err(|e| embedding_error(&self.model, e))?;
        check_dims(&self.model, self.dims, first_vector(&self.model, vectors)?)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Local (fastembed) ============

/// Dimensionality of the known local models.
pub fn local_model_dims(name: &str) -> Option<usize> {
    match normalize_local_name(name).as_str() {
        "all-minilm-l6-v2" | "all-minilm-l12-v2" | "bge-small-en-v1.5" => Some(384),
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => Some(768),
        "bge-large-en-v1.5" => Some(1024),
        _ => None,
    }
}

/// `sentence-transformers/all-MiniLM-L12-v2` → `all-minilm-l12-v2`.
fn normalize_local_name(name: &str) -> String {
    let short = name.rsplit('/').next().unwrap_or(name);
    short.to_lowercase()
}

#[cfg(feature = "local-embeddings")]
fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match normalize_local_name(name).as_str() {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, all-minilm-l12-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             bge-large-en-v1.5, nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ),
    }
}

/// A sentence-transformer run in-process.
///
/// The model is loaded on the first `encode` and reused afterwards.
#[cfg(feature = "local-embeddings")]
pub struct LocalModel {
    name: String,
    model: fastembed::EmbeddingModel,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let name = config.model_name();
        let model = to_fastembed_model(&name)?;
        Ok(Self {
            name,
            model,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingModel for LocalModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn encode(&self, text: &str) -> agent_catalog_core::Result<Vec<f32>> {
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let text = text.to_string();

        let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = loaded
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let embedder = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(embedder);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| anyhow!("local embedding model not loaded"))?;
            embedder
                .embed(vec![text], None)
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await
        .map_err(|e| embedding_error(&self.name, e.into()))?
        .map_err(|e| embedding_error(&self.name, e))?;

        first_vector(&self.name, vectors)
    }
}

/// Build the embedding model named by `config`.
///
/// | `provider` | Model |
/// |------------|-------|
/// | `"openai"` | [`OpenAiModel`] |
/// | `"ollama"` | [`OllamaModel`] |
/// | `"local"` | `LocalModel` (requires the `local-embeddings` feature) |
pub fn create_model(
    config: &EmbeddingConfig,
    secrets: &SecretsProvider,
) -> Result<Arc<dyn EmbeddingModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiModel::new(config, secrets)?)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalModel::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Vector width for `config`, used to name remote embedding fields.
pub fn model_dims(config: &EmbeddingConfig) -> Option<usize> {
    config
        .dims
        .or_else(|| local_model_dims(&config.model_name()))
}
