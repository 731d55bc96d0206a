use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use onboard_harness::config::{ConversationConfig, RetrievalConfig};
use onboard_harness::conversation::Conversation;
use onboard_harness::embedding::HashingEmbedder;
use onboard_harness::error::Result;
use onboard_harness::llm::{ChatModel, FragmentSink};
use onboard_harness::models::{Document, Message, Role, ToolCall, ToolSpec};
use onboard_harness::retrieval::{ChunkingParams, RetrievalPipeline};
use onboard_harness::tools::{Tool, ToolRegistry, NO_RESULTS};

/// Chat model that replays a script and records every window it was sent.
struct ScriptedModel {
    replies: Mutex<VecDeque<Message>>,
    windows: Mutex<Vec<Vec<Message>>>,
    offered: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            windows: Mutex::new(Vec::new()),
            offered: Mutex::new(Vec::new()),
        })
    }

    fn windows(&self) -> Vec<Vec<Message>> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        sink: Option<&FragmentSink>,
    ) -> Result<Message> {
        self.windows.lock().unwrap().push(messages.to_vec());
        *self.offered.lock().unwrap() = tools.iter().map(|t| t.name.clone()).collect();
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Message::assistant("(script exhausted)"));
        if let (Some(sink), false) = (sink, reply.content.is_empty()) {
            for word in reply.content.split_inclusive(' ') {
                let _ = sink.send(word.to_string());
            }
        }
        Ok(reply)
    }
}

struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "employee_lookup"
    }
    fn description(&self) -> &str {
        "Look up an employee"
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "name": { "type": "string" } } })
    }
    async fn execute(&self, _params: Value) -> anyhow::Result<String> {
        anyhow::bail!("employee database unavailable")
    }
}

fn retrieve(id: &str, query: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "retrieve_context".to_string(),
        arguments: json!({ "query": query }),
    }
}

fn registry(docs: Vec<Document>) -> ToolRegistry {
    let pipeline = RetrievalPipeline::new(
        docs,
        ChunkingParams {
            chunk_size: 1000,
            chunk_overlap: 200,
        },
        Arc::new(HashingEmbedder::new(256)),
        16,
    )
    .unwrap();
    ToolRegistry::with_retrieval(Arc::new(pipeline), &RetrievalConfig::default())
}

fn onboarding_docs() -> Vec<Document> {
    vec![
        Document::new("kb/testing.md", "To run tests, use pytest tests/ from the repository root."),
        Document::new("kb/deploy.md", "Deploy with docker compose on the staging host."),
        Document::new("kb/setup.md", "Install Python 3.11 and create a virtualenv first."),
    ]
}

fn conversation(model: Arc<ScriptedModel>, tools: ToolRegistry, config: ConversationConfig) -> Arc<Conversation> {
    Arc::new(Conversation::new(model, Arc::new(tools), "You onboard engineers.", config))
}

#[tokio::test]
async fn test_retrieval_round_trip() {
    let model = ScriptedModel::new(vec![
        Message::assistant_with_tools("", vec![retrieve("call_0", "how to run tests")]),
        Message::assistant("Run pytest tests/ from the repo root."),
    ]);
    let conv = conversation(model.clone(), registry(onboarding_docs()), ConversationConfig::default());

    let answer = conv.run_turn("dev", "How do I run tests?", None).await.unwrap();
    assert_eq!(answer, "Run pytest tests/ from the repo root.");
    assert_eq!(*model.offered.lock().unwrap(), vec!["retrieve_context".to_string()]);

    let windows = model.windows();
    assert_eq!(windows.len(), 2);
    let tool_msg = windows[1].last().unwrap();
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_0"));
    assert!(tool_msg.content.starts_with("[From testing.md]\nTo run tests"));
}

#[tokio::test]
async fn test_empty_knowledge_base_answers_with_fallback() {
    let model = ScriptedModel::new(vec![
        Message::assistant_with_tools("", vec![retrieve("call_0", "vpn setup")]),
        Message::assistant(""),
    ]);
    let conv = conversation(model.clone(), registry(Vec::new()), ConversationConfig::default());

    let answer = conv.run_turn("dev", "How do I set up the VPN?", None).await.unwrap();
    assert_eq!(answer, "I don't have that information.");

    let history = conv.history("dev").await;
    assert_eq!(history[2].content, NO_RESULTS);
}

#[tokio::test]
async fn test_one_result_per_call_in_order_with_failures() {
    let mut tools = registry(onboarding_docs());
    tools.register(Arc::new(BrokenTool));

    let model = ScriptedModel::new(vec![
        Message::assistant_with_tools(
            "",
            vec![
                retrieve("a", "deploy"),
                ToolCall {
                    id: "b".into(),
                    name: "employee_lookup".into(),
                    arguments: json!({ "name": "Ada" }),
                },
                ToolCall {
                    id: "c".into(),
                    name: "does_not_exist".into(),
                    arguments: json!({}),
                },
                retrieve("d", "python virtualenv"),
            ],
        ),
        Message::assistant("Here is what I found."),
    ]);
    let conv = conversation(model, tools, ConversationConfig::default());

    let answer = conv.run_turn("dev", "Tell me everything", None).await.unwrap();
    assert_eq!(answer, "Here is what I found.");

    let history = conv.history("dev").await;
    let results: Vec<&Message> = history.iter().filter(|m| m.role == Role::Tool).collect();
    let ids: Vec<&str> = results.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    assert!(results[0].content.starts_with("[From "));
    assert_eq!(results[1].content, "Error: employee database unavailable");
    assert_eq!(results[2].content, "Error: unknown tool 'does_not_exist'");
    assert!(results[3].content.starts_with("[From "));
}

#[tokio::test]
async fn test_trimming_keeps_system_and_full_history() {
    let long = "lorem ipsum ".repeat(60);
    let model = ScriptedModel::new(vec![
        Message::assistant(long.clone()),
        Message::assistant(long.clone()),
        Message::assistant("short"),
    ]);
    let config = ConversationConfig {
        max_tokens: 300,
        ..Default::default()
    };
    let conv = conversation(model.clone(), ToolRegistry::new(), config);

    conv.run_turn("dev", "first question", None).await.unwrap();
    conv.run_turn("dev", "second question", None).await.unwrap();
    conv.run_turn("dev", "third question", None).await.unwrap();

    let windows = model.windows();
    let last = windows.last().unwrap();
    assert_eq!(last[0].role, Role::System);
    assert_eq!(last[0].content, "You onboard engineers.");
    assert_eq!(last[1].role, Role::User);
    assert!(!last.iter().any(|m| m.content == "first question"));
    assert_eq!(last.last().unwrap().content, "third question");

    let history = conv.history("dev").await;
    assert_eq!(history.len(), 6);
    assert_eq!(history[0].content, "first question");
}

#[tokio::test]
async fn test_stream_emits_only_assistant_text() {
    let model = ScriptedModel::new(vec![
        Message::assistant_with_tools("", vec![retrieve("call_0", "pytest")]),
        Message::assistant("Use pytest tests/ to run the suite."),
    ]);
    let conv = conversation(model, registry(onboarding_docs()), ConversationConfig::default());

    let mut stream = conv.stream("dev", "How do I run tests?");
    let mut text = String::new();
    while let Some(fragment) = stream.next_fragment().await {
        text.push_str(&fragment);
    }
    assert_eq!(text, "Use pytest tests/ to run the suite.");
    assert!(!text.contains("[From "));
    assert_eq!(stream.finish().await.unwrap(), "Use pytest tests/ to run the suite.");
}

#[tokio::test]
async fn test_concurrent_threads_do_not_mix() {
    let model = ScriptedModel::new(Vec::new());
    let conv = conversation(model, ToolRegistry::new(), ConversationConfig::default());

    let a = conv.stream("alice", "hello from alice");
    let b = conv.stream("bob", "hello from bob");
    a.finish().await.unwrap();
    b.finish().await.unwrap();

    let alice = conv.history("alice").await;
    let bob = conv.history("bob").await;
    assert_eq!(alice[0].content, "hello from alice");
    assert_eq!(bob[0].content, "hello from bob");
    assert_eq!(alice.len(), 2);
    assert_eq!(bob.len(), 2);
}
