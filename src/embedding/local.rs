//! In-process embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that no network calls are made. Inference runs on the blocking pool.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{HarnessError, Result};

const SERVICE: &str = "embedding";

pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config_to_fastembed_model(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            model,
            engine: Arc::new(Mutex::new(None)),
        })
    }
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => Err(HarnessError::config(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ))),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let engine = Arc::clone(&self.engine);
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = engine
                .lock()
                .map_err(|_| HarnessError::Aborted("local embedding engine poisoned".into()))?;
            if guard.is_none() {
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| HarnessError::Service {
                    service: SERVICE,
                    message: format!("failed to initialize local embedding model: {}", e),
                })?;
                *guard = Some(loaded);
            }
            let Some(engine) = guard.as_mut() else {
                return Err(HarnessError::Aborted("local embedding engine missing".into()));
            };
            engine.embed(texts, None).map_err(|e| HarnessError::Service {
                service: SERVICE,
                message: format!("local embedding failed: {}", e),
            })
        })
        .await
        .map_err(|e| HarnessError::Aborted(format!("embedding task failed: {}", e)))?
    }
}
