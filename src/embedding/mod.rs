//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashingEmbedder`]**: deterministic feature-hashing bag of words; fully offline.
//! - **`LocalEmbedder`**: fastembed in-process inference (`local-embeddings` feature).
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the config:
//!
//! ```rust
//! # use onboard_harness::config::EmbeddingConfig;
//! # use onboard_harness::embedding::create_embedder;
//! let config = EmbeddingConfig { provider: "hashing".into(), ..Default::default() };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "hashing-256");
//! ```
//!
//! # Failures
//!
//! Requests are not retried. Connection failures, timeouts and error
//! statuses surface as [`HarnessError::Service`] so the caller can treat
//! them as fatal for the current turn.

mod hashing;
#[cfg(feature = "local-embeddings")]
mod local;

pub use hashing::HashingEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{HarnessError, Result};

const SERVICE: &str = "embedding";

/// Turns text into fixed-width vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| HarnessError::InvalidResponse {
            service: SERVICE,
            message: "empty embedding response".to_string(),
        })
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hashing"` | [`HashingEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires the `local-embeddings` feature) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dims))),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => Err(HarnessError::config(
            "Local embedding provider requires --features local-embeddings",
        )),
        other => Err(HarnessError::config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires Ollama to be running with the model
/// pulled (e.g. `ollama pull llama3.2`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarnessError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/api/embed", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| HarnessError::from_http(SERVICE, &endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(HarnessError::Service {
                service: SERVICE,
                message: format!("Ollama API error {}: {}", status, body_text),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HarnessError::from_http(SERVICE, &endpoint, e))?;
        let vectors = parse_ollama_response(&json)?;

        if vectors.len() != texts.len() {
            return Err(HarnessError::InvalidResponse {
                service: SERVICE,
                message: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            });
        }
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let invalid = |message: &str| HarnessError::InvalidResponse {
        service: SERVICE,
        message: message.to_string(),
    };

    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let values = embedding
            .as_array()
            .ok_or_else(|| invalid("embedding is not an array"))?;
        let mut vec = Vec::with_capacity(values.len());
        for v in values {
            let f = v
                .as_f64()
                .ok_or_else(|| invalid("embedding value is not a number"))?;
            vec.push(f as f32);
        }
        result.push(vec);
    }

    Ok(result)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero-norm vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
