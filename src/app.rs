//! Wiring from a [`Config`] to a ready-to-use agent.
//!
//! ```text
//! Config ─▶ Embedder ─▶ RetrievalPipeline ─▶ ToolRegistry ─┐
//!        └─▶ ChatModel + system prompt ──────────────────────┴─▶ Conversation
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::conversation::Conversation;
use crate::embedding::create_embedder;
use crate::llm::{create_chat_model, ChatModel};
use crate::retrieval::RetrievalPipeline;
use crate::tools::ToolRegistry;

pub struct App {
    pub config: Config,
    pub pipeline: Arc<RetrievalPipeline>,
    pub tools: Arc<ToolRegistry>,
}

impl App {
    /// Load the knowledge base and register the built-in tools.
    ///
    /// The index is not built here; see [`RetrievalPipeline::build_index`].
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let embedder = create_embedder(&config.embedding)?;
        let pipeline = RetrievalPipeline::from_config(&config, embedder).with_context(|| {
            format!(
                "Failed to load knowledge base from {}",
                config.knowledge_dir().display()
            )
        })?;
        let pipeline = Arc::new(pipeline);
        let tools = Arc::new(ToolRegistry::with_retrieval(
            Arc::clone(&pipeline),
            &config.retrieval,
        ));

        tracing::info!(
            agent = %config.agent.name,
            documents = pipeline.documents().len(),
            chunks = pipeline.chunks().len(),
            tools = tools.len(),
            "agent loaded"
        );

        Ok(Self {
            config,
            pipeline,
            tools,
        })
    }

    /// Conversation backed by the configured completion service.
    pub fn conversation(&self) -> Result<Arc<Conversation>> {
        let model: Arc<dyn ChatModel> = Arc::new(create_chat_model(&self.config.model)?);
        self.conversation_with(model)
    }

    /// Conversation backed by the given model.
    pub fn conversation_with(&self, model: Arc<dyn ChatModel>) -> Result<Arc<Conversation>> {
        let system_prompt = self.config.system_prompt()?;
        Ok(Arc::new(Conversation::new(
            model,
            Arc::clone(&self.tools),
            system_prompt,
            self.config.conversation.clone(),
        )))
    }
}
