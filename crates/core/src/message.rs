//! Message and Thread domain types.
//!
//! These are the value objects that flow through the engine:
//! a Session supplies the initial messages, the turn loop appends assistant
//! turns and batched tool results, and the model client reads them back.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a message thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (and tool results, which travel in user turns)
    User,
    /// The model
    Assistant,
}

/// A single piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// A `tool_use` block borrowed out of a message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolUse<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a serde_json::Value,
}

/// A single message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a user message with a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create an assistant message from complete content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Create an assistant message holding only text.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![ContentBlock::text(text)])
    }

    /// Batch tool results into the single user message that answers an assistant turn.
    pub fn tool_results(results: Vec<crate::tool::ToolResult>) -> Self {
        Self {
            role: Role::User,
            content: results.into_iter().map(ContentBlock::from).collect(),
        }
    }

    /// Concatenated text of all `text` blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All `tool_use` blocks, in order.
    pub fn tool_uses(&self) -> Vec<ToolUse<'_>> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolUse { id, name, input }),
                _ => None,
            })
            .collect()
    }

    /// Ids answered by `tool_result` blocks, in order.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// An ordered message thread, exclusively owned by the loop advancing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            id: ThreadId::new(),
            messages,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the most recent assistant message that produced any text.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(Message::text)
            .find(|t| !t.is_empty())
    }

    /// Check the tool pairing invariant.
    ///
    /// Every `tool_result` must answer a `tool_use` of the immediately preceding
    /// assistant message, and when an assistant turn with tool calls is followed
    /// by another message, that message answers all of them, in order.
    pub fn validate(&self) -> Result<(), String> {
        validate_messages(&self.messages)
    }
}

pub(crate) fn validate_messages(messages: &[Message]) -> Result<(), String> {
    for (i, message) in messages.iter().enumerate() {
        let answered = message.tool_result_ids();
        if !answered.is_empty() {
            if message.role != Role::User {
                return Err(format!("message {i}: tool_result blocks must be in a user message"));
            }
            let Some(prev) = i.checked_sub(1).map(|p| &messages[p]) else {
                return Err(format!("message {i}: tool_result without a preceding assistant turn"));
            };
            let requested: Vec<&str> = prev.tool_uses().iter().map(|u| u.id).collect();
            if prev.role != Role::Assistant || requested != answered {
                return Err(format!(
                    "message {i}: tool results {answered:?} do not answer tool calls {requested:?}"
                ));
            }
        }

        let requested = message.tool_uses();
        if !requested.is_empty() {
            if message.role != Role::Assistant {
                return Err(format!("message {i}: tool_use blocks must be in an assistant message"));
            }
            if let Some(next) = messages.get(i + 1)
                && next.tool_result_ids().len() != requested.len()
            {
                return Err(format!("message {}: unanswered tool calls", i + 1));
            }
        }
    }
    Ok(())
}
