//! Per-thread conversation loop.
//!
//! One user turn drives a small state machine:
//!
//! ```text
//!            ┌──────────────── tool results ────────────────┐
//!            ▼                                              │
//!   user ─▶ AwaitingModel ── reply has tool calls ──▶ AwaitingToolResults
//!            │
//!            └── reply has no tool calls ──▶ Done(text)
//! ```
//!
//! Every model call sees `[system] + history`, trimmed to the token budget
//! by [`trim_messages`]; the stored history itself is never trimmed.
//!
//! # Threads
//!
//! Histories live in process memory, keyed by thread id, and are lost on
//! restart. A turn holds its thread's lock from start to finish, so turns on
//! one thread run one at a time while other threads proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::ConversationConfig;
use crate::error::{HarnessError, Result};
use crate::llm::{ChatModel, FragmentSink};
use crate::models::{Message, ToolCall};
use crate::tools::ToolRegistry;
use crate::trim::{count_tokens, trim_messages};

#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    AwaitingModel,
    AwaitingToolResults(Vec<ToolCall>),
    Done(String),
}

type History = Arc<AsyncMutex<Vec<Message>>>;

/// Thread id → message history.
#[derive(Default)]
pub struct ThreadStore {
    threads: Mutex<HashMap<String, History>>,
}

impl ThreadStore {
    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, History>> {
        // the map is only touched by short non-panicking sections
        self.threads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_or_create(&self, thread_id: &str) -> History {
        self.map()
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    fn get(&self, thread_id: &str) -> Option<History> {
        self.map().get(thread_id).cloned()
    }

    fn remove(&self, thread_id: &str) -> bool {
        self.map().remove(thread_id).is_some()
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.map().keys().cloned().collect();
        ids.sort();
        ids
    }
}

pub struct Conversation {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    config: ConversationConfig,
    threads: ThreadStore,
}

impl Conversation {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            config,
            threads: ThreadStore::default(),
        }
    }

    /// Run one user turn on `thread_id` and return the final answer.
    ///
    /// Assistant text fragments are pushed to `sink` as they are generated.
    /// A fallback answer substituted for blank text is pushed too.
    ///
    /// History only grows by completed steps. If the turn fails, the steps
    /// that finished before the failure stay in the thread.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        input: &str,
        sink: Option<&FragmentSink>,
    ) -> Result<String> {
        let thread = self.threads.get_or_create(thread_id);
        let mut history = thread.lock().await;

        history.push(Message::user(input));
        let result = self.drive(thread_id, &mut history, sink).await;
        if let Err(e) = &result {
            tracing::warn!(
                thread = thread_id,
                kept = history.len(),
                error = %e,
                "turn failed"
            );
        }
        result
    }

    async fn drive(
        &self,
        thread_id: &str,
        history: &mut Vec<Message>,
        sink: Option<&FragmentSink>,
    ) -> Result<String> {
        let specs = self.tools.specs();
        let system = Message::system(&self.system_prompt);
        let mut model_calls = 0;
        let mut state = TurnState::AwaitingModel;

        loop {
            state = match state {
                TurnState::AwaitingModel => {
                    if model_calls >= self.config.max_model_calls {
                        return Err(HarnessError::StepLimit(self.config.max_model_calls));
                    }
                    model_calls += 1;

                    let mut full = Vec::with_capacity(history.len() + 1);
                    full.push(system.clone());
                    full.extend(history.iter().cloned());
                    let window = trim_messages(&full, self.config.max_tokens);
                    tracing::debug!(
                        thread = thread_id,
                        messages = window.len(),
                        tokens = count_tokens(&window),
                        "calling model"
                    );

                    let reply = self.model.complete(&window, &specs, sink).await?;
                    let next = if reply.has_tool_calls() {
                        TurnState::AwaitingToolResults(reply.tool_calls.clone())
                    } else {
                        TurnState::Done(reply.content.clone())
                    };
                    history.push(reply);
                    next
                }
                TurnState::AwaitingToolResults(calls) => {
                    tracing::debug!(thread = thread_id, calls = calls.len(), "executing tool calls");
                    history.extend(self.tools.execute_all(&calls).await);
                    TurnState::AwaitingModel
                }
                TurnState::Done(text) => {
                    tracing::debug!(thread = thread_id, model_calls, "turn complete");
                    if text.trim().is_empty() {
                        let fallback = self.config.fallback_answer.clone();
                        if let Some(sink) = sink {
                            let _ = sink.send(fallback.clone());
                        }
                        return Ok(fallback);
                    }
                    return Ok(text);
                }
            };
        }
    }

    /// Run a turn on its own task and stream its assistant text.
    ///
    /// Dropping the returned [`TurnStream`] does not cancel the turn.
    pub fn stream(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        input: impl Into<String>,
    ) -> TurnStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        let thread_id = thread_id.into();
        let input = input.into();
        let handle = tokio::spawn(async move { this.run_turn(&thread_id, &input, Some(&tx)).await });
        TurnStream {
            fragments: rx,
            handle,
        }
    }

    /// Full, untrimmed history of a thread. Empty for unknown threads.
    pub async fn history(&self, thread_id: &str) -> Vec<Message> {
        match self.threads.get(thread_id) {
            Some(thread) => thread.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Forget a thread. Returns whether it existed.
    pub fn clear(&self, thread_id: &str) -> bool {
        self.threads.remove(thread_id)
    }

    pub fn threads(&self) -> Vec<String> {
        self.threads.ids()
    }
}

/// Assistant text fragments of a running turn, followed by its final answer.
pub struct TurnStream {
    fragments: mpsc::UnboundedReceiver<String>,
    handle: JoinHandle<Result<String>>,
}

impl TurnStream {
    /// Next text fragment, or `None` once the turn has finished.
    pub async fn next_fragment(&mut self) -> Option<String> {
        self.fragments.recv().await
    }

    /// Wait for the turn to end and return its final answer.
    pub async fn finish(self) -> Result<String> {
        self.handle
            .await
            .map_err(|e| HarnessError::Aborted(e.to_string()))?
    }
}
