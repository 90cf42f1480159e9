//! Observer events emitted while a request executes.
//!
//! `AgentStreamEvent` is a side channel: the turn loop never waits on its
//! consumer and never changes control flow based on it. Every event carries
//! the spawn `depth` of the loop that produced it (0 = top level).

use serde::{Deserialize, Serialize};
use workbench_core::provider::Usage;

/// Events emitted by turn loops during execution.
///
/// - `turn_started`: a model call is about to be made
/// - `chunk`: partial assistant text
/// - `tool_call`: a tool is being dispatched
/// - `tool_result`: a tool call finished
/// - `sub_agent_started`: a nested loop is starting
/// - `sub_agent_finished`: a nested loop returned
/// - `done`: a loop reached its final answer
/// - `error`: a loop aborted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    TurnStarted { depth: u32, turn: u32 },

    /// Partial text token from the model.
    Chunk { depth: u32, content: String },

    ToolCall {
        depth: u32,
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        depth: u32,
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },

    SubAgentStarted {
        depth: u32,
        agent: String,
        model: String,
    },

    SubAgentFinished {
        depth: u32,
        agent: String,
        is_error: bool,
    },

    Done {
        depth: u32,
        turns: u32,
        usage: Usage,
    },

    Error { depth: u32, message: String },
}

impl AgentStreamEvent {
    /// Short event name, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::SubAgentStarted { .. } => "sub_agent_started",
            Self::SubAgentFinished { .. } => "sub_agent_finished",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Spawn depth of the loop that emitted this event.
    pub fn depth(&self) -> u32 {
        match self {
            Self::TurnStarted { depth, .. }
            | Self::Chunk { depth, .. }
            | Self::ToolCall { depth, .. }
            | Self::ToolResult { depth, .. }
            | Self::SubAgentStarted { depth, .. }
            | Self::SubAgentFinished { depth, .. }
            | Self::Done { depth, .. }
            | Self::Error { depth, .. } => *depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization() {
        let event = AgentStreamEvent::Chunk {
            depth: 1,
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
        assert!(json.contains(r#""depth":1"#));
    }

    #[test]
    fn tool_result_serialization() {
        let event = AgentStreamEvent::ToolResult {
            depth: 0,
            id: "toolu_1".into(),
            name: "Task".into(),
            content: "unknown agent".into(),
            is_error: true,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["is_error"], true);
    }

    #[test]
    fn event_type_matches_tag() {
        let events = vec![
            AgentStreamEvent::TurnStarted { depth: 0, turn: 1 },
            AgentStreamEvent::Chunk {
                depth: 0,
                content: String::new(),
            },
            AgentStreamEvent::SubAgentStarted {
                depth: 1,
                agent: "reviewer".into(),
                model: "m".into(),
            },
            AgentStreamEvent::Done {
                depth: 0,
                turns: 2,
                usage: Usage::default(),
            },
            AgentStreamEvent::Error {
                depth: 2,
                message: "boom".into(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
            assert_eq!(json["depth"], event.depth());
        }
    }

    #[test]
    fn roundtrip() {
        let event = AgentStreamEvent::ToolCall {
            depth: 0,
            id: "toolu_9".into(),
            name: "Echo".into(),
            input: serde_json::json!({"msg": "x"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentStreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
