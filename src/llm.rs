//! Chat completion service.
//!
//! [`ChatModel`] is the seam between the conversation loop and whatever
//! produces assistant messages. [`OllamaChat`] talks to a local Ollama
//! server over `POST /api/chat` with streaming enabled.
//!
//! # Streaming
//!
//! Ollama answers with newline-delimited JSON objects:
//!
//! ```text
//! {"message":{"role":"assistant","content":"To run"},"done":false}
//! {"message":{"role":"assistant","content":" tests"},"done":false}
//! {"message":{"role":"assistant","content":"","tool_calls":[...]},"done":false}
//! {"done":true, ...}
//! ```
//!
//! Each line is fed to [`parse_chat_line`], which accumulates the reply in a
//! [`ChatStreamState`] and returns any text fragment to forward. Tool calls
//! arrive whole, never as deltas.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ModelConfig;
use crate::error::{HarnessError, Result};
use crate::models::{Message, Role, ToolCall, ToolSpec};

const SERVICE: &str = "completion";

/// Receives assistant text fragments as they are generated.
pub type FragmentSink = mpsc::UnboundedSender<String>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce one assistant message for `messages`, offering `tools`.
    ///
    /// Text fragments are pushed to `sink` while the reply is generated; the
    /// returned message carries the full text and any tool calls.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        sink: Option<&FragmentSink>,
    ) -> Result<Message>;
}

/// Create the [`ChatModel`] named by `config.provider`.
pub fn create_chat_model(config: &ModelConfig) -> Result<OllamaChat> {
    match config.provider.as_str() {
        "ollama" => OllamaChat::new(config),
        other => Err(HarnessError::config(format!(
            "Unknown model provider: {}",
            other
        ))),
    }
}

/// Ollama `/api/chat` client.
///
/// `timeout_secs` bounds each wait on the server (connecting, the response
/// headers, and every gap between streamed chunks), not the whole reply, so
/// long answers that keep streaming are never cut off.
pub struct OllamaChat {
    client: reqwest::Client,
    model: String,
    url: String,
    temperature: f32,
    idle_timeout: Duration,
}

impl OllamaChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let idle_timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .build()
            .map_err(|e| HarnessError::config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            idle_timeout,
        })
    }

    fn timed_out(&self, endpoint: &str, waiting_for: &str) -> HarnessError {
        HarnessError::Service {
            service: SERVICE,
            message: format!(
                "no {} from {} within {}s",
                waiting_for,
                endpoint,
                self.idle_timeout.as_secs()
            ),
        }
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(to_ollama_message).collect::<Vec<_>>(),
            "stream": true,
            "options": { "temperature": self.temperature },
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(to_ollama_tool).collect());
        }
        body
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        sink: Option<&FragmentSink>,
    ) -> Result<Message> {
        let endpoint = format!("{}/api/chat", self.url);
        let body = self.request_body(messages, tools);

        let request = self.client.post(&endpoint).json(&body).send();
        let response = tokio::time::timeout(self.idle_timeout, request)
            .await
            .map_err(|_| self.timed_out(&endpoint, "response"))?
            .map_err(|e| HarnessError::from_http(SERVICE, &endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(HarnessError::Service {
                service: SERVICE,
                message: format!("Ollama API error {}: {}", status, body_text),
            });
        }

        let mut state = ChatStreamState::default();
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(bytes) = tokio::time::timeout(self.idle_timeout, stream.next())
            .await
            .map_err(|_| self.timed_out(&endpoint, "stream data"))?
        {
            let bytes = bytes.map_err(|e| HarnessError::from_http(SERVICE, &endpoint, e))?;
            buffer.extend_from_slice(&bytes);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                feed_line(&line, &mut state, sink)?;
            }
        }
        if !buffer.is_empty() {
            feed_line(&buffer, &mut state, sink)?;
        }

        if !state.done {
            tracing::warn!(model = %self.model, "chat stream ended without a done marker");
        }
        Ok(state.into_message())
    }
}

fn feed_line(line: &[u8], state: &mut ChatStreamState, sink: Option<&FragmentSink>) -> Result<()> {
    let line = String::from_utf8_lossy(line);
    if let Some(fragment) = parse_chat_line(&line, state)? {
        if let Some(sink) = sink {
            // a closed receiver only means nobody is watching the stream
            let _ = sink.send(fragment);
        }
    }
    Ok(())
}

/// Accumulated reply while an NDJSON chat stream is being read.
#[derive(Debug, Default)]
pub struct ChatStreamState {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
}

impl ChatStreamState {
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content, self.tool_calls)
    }
}

/// Parse one NDJSON line into `state`, returning the text fragment it
/// carried, if any. Blank lines are ignored.
pub fn parse_chat_line(line: &str, state: &mut ChatStreamState) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let json: Value = serde_json::from_str(line).map_err(|e| HarnessError::InvalidResponse {
        service: SERVICE,
        message: format!("malformed stream line: {}", e),
    })?;

    if let Some(error) = json.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(HarnessError::Service {
            service: SERVICE,
            message,
        });
    }

    if json["done"].as_bool() == Some(true) {
        state.done = true;
    }

    let message = &json["message"];
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let call = parse_tool_call(call, state.tool_calls.len())?;
            state.tool_calls.push(call);
        }
    }

    match message["content"].as_str() {
        Some(fragment) if !fragment.is_empty() => {
            state.content.push_str(fragment);
            Ok(Some(fragment.to_string()))
        }
        _ => Ok(None),
    }
}

fn parse_tool_call(call: &Value, ordinal: usize) -> Result<ToolCall> {
    let function = &call["function"];
    let name = function["name"]
        .as_str()
        .ok_or_else(|| HarnessError::InvalidResponse {
            service: SERVICE,
            message: "tool call without a function name".to_string(),
        })?;

    // some models send arguments as a JSON-encoded string
    let arguments = match &function["arguments"] {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        Value::Null => json!({}),
        other => other.clone(),
    };

    let id = call["id"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", ordinal));

    Ok(ToolCall {
        id,
        name: name.to_string(),
        arguments,
    })
}

fn to_ollama_message(message: &Message) -> Value {
    let mut value = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        value["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|c| json!({ "function": { "name": c.name, "arguments": c.arguments } }))
            .collect();
    }
    if message.role == Role::Tool {
        if let Some(name) = &message.name {
            value["tool_name"] = json!(name);
        }
    }
    value
}

fn to_ollama_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}
