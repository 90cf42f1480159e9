//! Session: the immutable snapshot a top-level execution starts from.
//!
//! A Session is what the workbench's project store hands over: a model id,
//! system blocks, tool schemas and the message history, serialized with the
//! same keys as the wire request.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::message::{Message, validate_messages};
use crate::provider::ModelRequest;
use crate::tool::ToolSchema;

/// Prompt-caching marker attached to a system block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".into(),
        }
    }
}

/// One block of system context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    /// Always "text" on the wire.
    #[serde(rename = "type", default = "text_kind")]
    pub kind: String,

    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

fn text_kind() -> String {
    "text".into()
}

impl SystemBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: text_kind(),
            text: text.into(),
            cache_control: None,
        }
    }

    /// A block the provider may cache across requests.
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            cache_control: Some(CacheControl::ephemeral()),
            ..Self::new(text)
        }
    }
}

/// An assembled prompt-engineering session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Model id (e.g. "claude-sonnet-4-20250514")
    pub model: String,

    /// Maximum tokens per model response
    pub max_tokens: u32,

    /// Ordered system blocks
    #[serde(default)]
    pub system: Vec<SystemBlock>,

    /// Tool schemas; names are unique
    #[serde(default)]
    pub tools: Vec<ToolSchema>,

    /// Message history
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: Vec::new(),
            tools: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn with_system(mut self, text: impl Into<String>) -> Self {
        self.system.push(SystemBlock::new(text));
        self
    }

    pub fn with_tool(mut self, schema: ToolSchema) -> Self {
        self.tools.push(schema);
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Look up a tool schema by name.
    pub fn tool(&self, name: &str) -> Option<&ToolSchema> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Parse a session from its JSON file form and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let session: Self = serde_json::from_str(json)?;
        session.validate()?;
        Ok(session)
    }

    /// Rebuild a session from a wire request.
    pub fn from_request(request: &ModelRequest) -> Self {
        Self {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            tools: request.tools.clone(),
            messages: request.messages.clone(),
        }
    }

    /// Check the session invariants: positive `max_tokens`, unique tool names,
    /// and tool results paired with the preceding assistant turn.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::InvalidSession("model must not be empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(Error::InvalidSession("max_tokens must be positive".into()));
        }
        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(Error::InvalidSession(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
        }
        validate_messages(&self.messages).map_err(Error::InvalidSession)
    }
}
