//! Model client trait: the abstraction over language-model backends.
//!
//! A client sends a wire request and answers either with a finished message
//! or with an incremental stream of deltas. The engine treats the client as
//! a black box: retries, backoff and transport details live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{ContentBlock, Message};
use crate::session::SystemBlock;
use crate::tool::ToolSchema;

/// A wire-ready model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// System context blocks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,

    /// Tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    /// The thread so far
    pub messages: Vec<Message>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Fold another call's usage into this running total.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// A finished assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Complete content blocks, in order
    pub content: Vec<ContentBlock>,

    pub stop_reason: StopReason,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ModelResponse {
    /// Break a finished message into the deltas a streaming client would emit.
    pub fn into_deltas(self) -> Vec<StreamDelta> {
        let mut deltas = vec![StreamDelta::MessageStart { model: self.model }];
        for (index, block) in self.content.into_iter().enumerate() {
            match block {
                ContentBlock::Text { text } => {
                    deltas.push(StreamDelta::TextDelta { index, text });
                }
                ContentBlock::ToolUse { id, name, input } => {
                    deltas.push(StreamDelta::ToolUseStart { index, id, name });
                    deltas.push(StreamDelta::InputJsonDelta {
                        index,
                        partial_json: input.to_string(),
                    });
                }
                // Models never emit tool results.
                ContentBlock::ToolResult { .. } => continue,
            }
            deltas.push(StreamDelta::BlockStop { index });
        }
        deltas.push(StreamDelta::MessageDelta {
            stop_reason: Some(self.stop_reason),
            usage: self.usage,
        });
        deltas.push(StreamDelta::MessageStop);
        deltas
    }
}

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    MessageStart { model: String },
    TextDelta { index: usize, text: String },
    ToolUseStart { index: usize, id: String, name: String },
    InputJsonDelta { index: usize, partial_json: String },
    BlockStop { index: usize },
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },
    MessageStop,
}

/// Receiving half of a delta stream.
pub type DeltaReceiver = mpsc::Receiver<Result<StreamDelta, ProviderError>>;

/// What a client hands back for one request.
#[derive(Debug)]
pub enum ModelReply {
    Message(ModelResponse),
    Stream(DeltaReceiver),
}

/// The core model client trait.
///
/// The turn loop calls `send()` without knowing which backend answers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError>;

    /// Send a request, answering with a finished message or a delta stream.
    ///
    /// Default implementation returns the result of `complete()`.
    async fn send(&self, request: ModelRequest) -> Result<ModelReply, ProviderError> {
        self.complete(request).await.map(ModelReply::Message)
    }
}
