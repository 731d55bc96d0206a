//! Tools the model may call during a conversation turn.
//!
//! A [`Tool`] declares a name, a description and a JSON Schema for its
//! arguments; the [`ToolRegistry`] hands those declarations to the
//! completion service and dispatches the invocations it asks for.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────────────┐ ┌───────────────┐  │
//! │  │ retrieve_context │ │ custom (Rust) │  │
//! │  └──────────────────┘ └───────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     execute_all() → one tool message per call
//! ```
//!
//! # Failure isolation
//!
//! [`ToolRegistry::execute_all`] never fails. Unknown names, malformed
//! arguments, tool errors and panics are all reported back to the model as
//! a tool-result message starting with `"Error: "`, so the conversation
//! keeps going and the model can recover.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::models::{Message, ToolCall, ToolSpec};
use crate::retrieval::RetrievalPipeline;

/// Output of [`RetrieveContextTool`] when the search comes back empty.
pub const NO_RESULTS: &str = "No relevant information found in the knowledge base.";

/// A named capability the model can invoke.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use onboard_harness::tools::Tool;
///
/// pub struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Repeat the input back" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": { "text": { "type": "string" } },
///             "required": ["text"]
///         })
///     }
///
///     async fn execute(&self, params: Value) -> Result<String> {
///         Ok(params["text"].as_str().unwrap_or_default().to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"retrieve_context"`).
    fn name(&self) -> &str;

    /// Tells the model when to use the tool.
    fn description(&self) -> &str;

    /// JSON Schema object for the arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value) -> Result<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Dispatch table keyed by tool name, in registration order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with the built-in `retrieve_context` tool.
    pub fn with_retrieval(pipeline: Arc<RetrievalPipeline>, config: &RetrievalConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RetrieveContextTool::new(pipeline, config)));
        registry
    }

    /// Register a tool. Lookups return the first tool registered under a name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Declarations handed to the completion service.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run every invocation and return one tool message per call, in the
    /// order the calls were requested.
    ///
    /// Each invocation runs on its own task: they proceed concurrently and
    /// run to completion even if the caller stops waiting.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<Message> {
        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let tool = self.find(&call.name);
                let call = call.clone();
                tokio::spawn(async move { invoke(tool, &call).await })
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (call, handle) in calls.iter().zip(handles) {
            let content = match handle.await {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!(tool = %call.name, error = %e, "tool task failed");
                    format!("Error: tool '{}' failed unexpectedly", call.name)
                }
            };
            results.push(Message::tool_result(call, content));
        }
        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn invoke(tool: Option<Arc<dyn Tool>>, call: &ToolCall) -> String {
    let Some(tool) = tool else {
        tracing::warn!(tool = %call.name, "model requested an unknown tool");
        return format!("Error: unknown tool '{}'", call.name);
    };

    if !call.arguments.is_object() {
        return format!(
            "Error: invalid arguments for '{}': expected a JSON object",
            call.name
        );
    }

    match tool.execute(call.arguments.clone()).await {
        Ok(output) => {
            tracing::debug!(tool = %call.name, bytes = output.len(), "tool finished");
            output
        }
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "tool failed");
            format!("Error: {:#}", e)
        }
    }
}

// ============ retrieve_context ============

/// Searches the knowledge base and formats the top hits for the model.
pub struct RetrieveContextTool {
    pipeline: Arc<RetrievalPipeline>,
    k: usize,
    display_chars: usize,
}

impl RetrieveContextTool {
    pub fn new(pipeline: Arc<RetrievalPipeline>, config: &RetrievalConfig) -> Self {
        Self {
            pipeline,
            k: config.k,
            display_chars: config.display_chars,
        }
    }
}

#[async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &str {
        "retrieve_context"
    }

    fn description(&self) -> &str {
        "Retrieve relevant information from the developer onboarding knowledge base. \
         Use this tool ONLY when you need to look up specific technical information \
         to answer the user's question. Do NOT use it for greetings or general chat."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A specific search query about the technical information you need"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }

        let hits = self.pipeline.search(query, self.k).await?;
        if hits.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let parts: Vec<String> = hits
            .iter()
            .map(|hit| {
                format!(
                    "[From {}]\n{}",
                    file_name(&hit.chunk.source_id),
                    truncate_chars(&hit.chunk.text, self.display_chars)
                )
            })
            .collect();
        Ok(parts.join("\n\n"))
    }
}

fn file_name(source_id: &str) -> &str {
    Path::new(source_id)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source_id)
}

/// First `max` characters of `text`, with `"..."` appended if anything was cut.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
