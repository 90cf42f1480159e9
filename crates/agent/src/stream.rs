//! Stream decoder: reduces a delta stream into one complete response.
//!
//! The turn loop feeds every `StreamDelta` through a [`DeltaAccumulator`]
//! and only looks at the content once the message has stopped, so a
//! `tool_use` block is never acted on while its input is still arriving.

use std::collections::BTreeMap;

use workbench_core::error::ProviderError;
use workbench_core::message::ContentBlock;
use workbench_core::provider::{ModelResponse, StopReason, StreamDelta, Usage};

/// A content block still receiving deltas.
#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
}

impl PartialBlock {
    fn finish(self) -> Result<ContentBlock, ProviderError> {
        match self {
            Self::Text(text) => Ok(ContentBlock::Text { text }),
            Self::ToolUse {
                id,
                name,
                input_json,
            } => {
                let input = if input_json.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&input_json).map_err(|e| {
                        ProviderError::StreamInterrupted(format!(
                            "malformed input for tool_use '{name}' ({id}): {e}"
                        ))
                    })?
                };
                Ok(ContentBlock::ToolUse { id, name, input })
            }
        }
    }
}

/// Buffers deltas by block index until the message is complete.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    model: String,
    open: BTreeMap<usize, PartialBlock>,
    closed: BTreeMap<usize, ContentBlock>,
    stop_reason: Option<StopReason>,
    usage: Option<Usage>,
    stopped: bool,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `MessageStop` has been seen.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Apply one delta. Returns `true` once the message has stopped.
    pub fn push(&mut self, delta: StreamDelta) -> Result<bool, ProviderError> {
        match delta {
            StreamDelta::MessageStart { model } => self.model = model,
            StreamDelta::TextDelta { index, text } => match self.open.get_mut(&index) {
                Some(PartialBlock::Text(buf)) => buf.push_str(&text),
                Some(PartialBlock::ToolUse { .. }) => {
                    return Err(ProviderError::StreamInterrupted(format!(
                        "text delta for tool_use block {index}"
                    )));
                }
                None => {
                    self.open.insert(index, PartialBlock::Text(text));
                }
            },
            StreamDelta::ToolUseStart { index, id, name } => {
                self.open.insert(
                    index,
                    PartialBlock::ToolUse {
                        id,
                        name,
                        input_json: String::new(),
                    },
                );
            }
            StreamDelta::InputJsonDelta {
                index,
                partial_json,
            } => match self.open.get_mut(&index) {
                Some(PartialBlock::ToolUse { input_json, .. }) => input_json.push_str(&partial_json),
                _ => {
                    return Err(ProviderError::StreamInterrupted(format!(
                        "input delta for unknown tool_use block {index}"
                    )));
                }
            },
            StreamDelta::BlockStop { index } => {
                // A stop for a block that never produced content (an empty
                // text block, or one we skipped) is harmless.
                if let Some(block) = self.open.remove(&index) {
                    self.closed.insert(index, block.finish()?);
                }
            }
            StreamDelta::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if usage.is_some() {
                    self.usage = usage;
                }
            }
            StreamDelta::MessageStop => self.stopped = true,
        }
        Ok(self.stopped)
    }

    /// Produce the complete response.
    ///
    /// Fails when the stream ended before `MessageStop`.
    pub fn finish(mut self) -> Result<ModelResponse, ProviderError> {
        if !self.stopped {
            return Err(ProviderError::StreamInterrupted(
                "stream ended before message_stop".into(),
            ));
        }
        for (index, block) in std::mem::take(&mut self.open) {
            self.closed.insert(index, block.finish()?);
        }
        let content: Vec<ContentBlock> = self.closed.into_values().collect();
        let stop_reason = self.stop_reason.unwrap_or_else(|| {
            if content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. })) {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            }
        });
        Ok(ModelResponse {
            content,
            stop_reason,
            usage: self.usage,
            model: self.model,
        })
    }
}
