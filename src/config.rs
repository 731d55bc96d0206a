//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or [`Config::minimal`])
//! describes the stock developer-onboarding agent backed by a local Ollama.
//!
//! ```toml
//! [agent]
//! name = "Bot"
//! base_path = "docs/rag"
//! folder = "dev_onboarding"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! k = 2
//! display_chars = 500
//!
//! [embedding]
//! provider = "ollama"
//! model = "llama3.2"
//!
//! [model]
//! provider = "ollama"
//! model = "llama3.2"
//!
//! [conversation]
//! max_tokens = 2000
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::HarnessError;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub model: ModelConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// Display name printed before streamed answers.
    pub name: String,
    /// Directory holding one folder per agent.
    pub base_path: PathBuf,
    /// Agent folder containing `system_prompt.md` and `knowledge/`.
    pub folder: String,
    /// Individual files added to the knowledge base.
    pub extra_files: Vec<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Bot".to_string(),
            base_path: PathBuf::from("docs/rag"),
            folder: "dev_onboarding".to_string(),
            extra_files: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned per `retrieve_context` call.
    pub k: usize,
    /// Per-chunk truncation in tool output.
    pub display_chars: usize,
    pub include_globs: Vec<String>,
    /// Texts per embedding request while building the index.
    pub batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 2,
            display_chars: 500,
            include_globs: vec!["**/*.md".to_string()],
            batch_size: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `hashing` or `local`.
    pub provider: String,
    pub model: String,
    pub url: String,
    /// Vector width for the `hashing` provider.
    pub dims: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            url: default_ollama_url(),
            dims: 256,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Only `ollama` is supported.
    pub provider: String,
    pub model: String,
    pub url: String,
    pub temperature: f32,
    /// Longest wait for a connection, the response headers or the next
    /// streamed chunk. A reply that keeps streaming is not cut off.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            url: default_ollama_url(),
            temperature: 0.7,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    /// Token budget for the history sent to the model.
    pub max_tokens: usize,
    /// Upper bound on model calls within one user turn.
    pub max_model_calls: usize,
    pub quit_tokens: Vec<String>,
    /// Returned when the model finishes a turn without any text.
    pub fallback_answer: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            max_model_calls: 25,
            quit_tokens: vec!["exit".to_string(), "quit".to_string()],
            fallback_answer: "I don't have that information.".to_string(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

impl Config {
    /// Defaults for every section, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.agent.base_path.join(&self.agent.folder)
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.agent_dir().join("knowledge")
    }

    pub fn system_prompt_path(&self) -> PathBuf {
        self.agent_dir().join("system_prompt.md")
    }

    /// Contents of `system_prompt.md`, or the stock prompt when the file is absent.
    pub fn system_prompt(&self) -> Result<String> {
        let path = self.system_prompt_path();
        if !path.exists() {
            return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
        }
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read system prompt: {}", path.display()))
    }

    pub fn is_quit_token(&self, input: &str) -> bool {
        let input = input.trim().to_lowercase();
        self.conversation
            .quit_tokens
            .iter()
            .any(|t| t.to_lowercase() == input)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        let fail = |msg: String| Err(HarnessError::config(msg));

        if self.chunking.chunk_size == 0 {
            return fail("chunking.chunk_size must be > 0".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return fail(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }

        if self.retrieval.k == 0 {
            return fail("retrieval.k must be >= 1".into());
        }
        if self.retrieval.display_chars == 0 {
            return fail("retrieval.display_chars must be >= 1".into());
        }
        if self.retrieval.batch_size == 0 {
            return fail("retrieval.batch_size must be >= 1".into());
        }
        if self.retrieval.include_globs.is_empty() {
            return fail("retrieval.include_globs must not be empty".into());
        }

        match self.embedding.provider.as_str() {
            "ollama" | "local" => {}
            "hashing" => {
                if self.embedding.dims == 0 {
                    return fail("embedding.dims must be > 0 for the hashing provider".into());
                }
            }
            other => {
                return fail(format!(
                    "Unknown embedding provider: '{}'. Must be ollama, hashing, or local.",
                    other
                ))
            }
        }

        if self.model.provider != "ollama" {
            return fail(format!(
                "Unknown model provider: '{}'. Must be ollama.",
                self.model.provider
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return fail("model.temperature must be in [0.0, 2.0]".into());
        }

        if self.conversation.max_tokens == 0 {
            return fail("conversation.max_tokens must be > 0".into());
        }
        if self.conversation.max_model_calls == 0 {
            return fail("conversation.max_model_calls must be >= 1".into());
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
