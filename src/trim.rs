//! History trimming to an approximate token budget.
//!
//! The full thread history is never modified; each model call gets a window
//! built by [`trim_messages`]:
//!
//! 1. A leading system message is always kept and its cost is charged first.
//! 2. Remaining messages are taken newest-first while they fit. The first
//!    message that does not fit ends the walk; messages are never split.
//! 3. Leading messages are dropped until the window starts on a user
//!    message, so a tool result never appears without the assistant
//!    message that requested it.
//!
//! If not even the newest user message fits, the window is the system
//! message alone.

use crate::models::{Message, Role};

const CHARS_PER_TOKEN: usize = 4;
const TOKENS_PER_MESSAGE: usize = 3;

/// Rough token count: a quarter of the characters, plus per-message overhead.
pub fn approximate_tokens(message: &Message) -> usize {
    let mut chars = message.content.chars().count();
    for call in &message.tool_calls {
        chars += call.name.chars().count();
        chars += call.arguments.to_string().chars().count();
    }
    chars.div_ceil(CHARS_PER_TOKEN) + TOKENS_PER_MESSAGE
}

/// Total of [`approximate_tokens`] over `messages`.
pub fn count_tokens(messages: &[Message]) -> usize {
    messages.iter().map(approximate_tokens).sum()
}

/// Newest messages that fit in `max_tokens`, keeping the system message.
pub fn trim_messages(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, messages),
    };

    let mut budget = max_tokens.saturating_sub(system.map(approximate_tokens).unwrap_or(0));

    let mut keep_from = rest.len();
    for (i, message) in rest.iter().enumerate().rev() {
        let cost = approximate_tokens(message);
        if cost > budget {
            break;
        }
        budget -= cost;
        keep_from = i;
    }

    let window = &rest[keep_from..];
    let window = match window.iter().position(|m| m.role == Role::User) {
        Some(start) => &window[start..],
        None => &[],
    };

    let mut trimmed = Vec::with_capacity(window.len() + 1);
    if let Some(system) = system {
        trimmed.push(system.clone());
    }
    trimmed.extend_from_slice(window);

    if trimmed.len() < messages.len() {
        tracing::debug!(
            kept = trimmed.len(),
            dropped = messages.len() - trimmed.len(),
            "history trimmed"
        );
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolCall;
    use serde_json::json;

    #[test]
    fn test_approximate_tokens() {
        assert_eq!(approximate_tokens(&Message::user("")), 3);
        assert_eq!(approximate_tokens(&Message::user("abcd")), 4);
        assert_eq!(approximate_tokens(&Message::user("abcde")), 5);
    }

    #[test]
    fn test_tool_calls_count_toward_tokens() {
        let plain = Message::assistant("");
        let with_call = Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "call_0".into(),
                name: "retrieve_context".into(),
                arguments: json!({ "query": "setup" }),
            }],
        );
        assert!(approximate_tokens(&with_call) > approximate_tokens(&plain));
    }

    #[test]
    fn test_everything_fits() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        assert_eq!(trim_messages(&msgs, 2000), msgs);
    }

    #[test]
    fn test_drops_oldest_exchange_and_keeps_system() {
        // each message below costs 25 + 3 = 28 tokens
        let text = "x".repeat(100);
        let msgs = vec![
            Message::system("sys"),
            Message::user(format!("old {}", &text[4..])),
            Message::assistant(text.clone()),
            Message::user(format!("new {}", &text[4..])),
            Message::assistant(text.clone()),
        ];
        let trimmed = trim_messages(&msgs, 4 + 28 * 3);
        assert_eq!(trimmed.len(), 3);
        assert_eq!(count_tokens(&trimmed), 4 + 28 * 2);
        assert_eq!(trimmed[0].role, Role::System);
        assert!(trimmed[1].content.starts_with("new "));
        assert_eq!(trimmed[2].role, Role::Assistant);
    }

    #[test]
    fn test_window_starts_on_user_message() {
        let call = ToolCall {
            id: "call_0".into(),
            name: "retrieve_context".into(),
            arguments: json!({ "query": "q" }),
        };
        let msgs = vec![
            Message::system("sys"),
            Message::user("x".repeat(400)),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::tool_result(&call, "result"),
            Message::assistant("answer"),
        ];
        // the big user message does not fit, so the orphaned tool exchange is dropped too
        let trimmed = trim_messages(&msgs, 60);
        assert_eq!(trimmed, vec![Message::system("sys")]);
    }

    #[test]
    fn test_never_partial() {
        let msgs = vec![
            Message::user("a".repeat(40)),
            Message::assistant("b".repeat(40)),
            Message::user("c".repeat(40)),
        ];
        let trimmed = trim_messages(&msgs, 15);
        assert_eq!(trimmed, vec![Message::user("c".repeat(40))]);
    }

    #[test]
    fn test_input_untouched_and_without_system() {
        let msgs = vec![Message::assistant("orphan"), Message::user("q")];
        let trimmed = trim_messages(&msgs, 2000);
        assert_eq!(trimmed, vec![Message::user("q")]);
        assert_eq!(msgs.len(), 2);
    }
}
