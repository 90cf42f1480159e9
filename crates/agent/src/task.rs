//! The synthetic `Task` tool.
//!
//! `Task` is never registered as an ordinary tool. Its schema is generated
//! from the agent registry at assembly time, and calls to it are routed to
//! the spawner by the dispatcher.

use serde::Deserialize;
use workbench_core::tool::{TASK_TOOL_NAME, ToolSchema};

use crate::registry::AgentRegistry;

/// Arguments of a `Task` call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskInput {
    #[serde(rename = "subagentType", alias = "subagent_type")]
    pub subagent_type: String,
    pub prompt: String,
    /// Short label some models add; not forwarded to the agent.
    #[serde(default)]
    pub description: Option<String>,
}

/// Build the `Task` schema for the agents currently registered.
///
/// The description lists every agent by name, sorted, so the same
/// registry always produces the same schema. The advertised key is
/// `subagentType`; calls using `subagent_type` are accepted too.
pub fn task_schema(agents: &AgentRegistry) -> ToolSchema {
    let mut description = String::from(
        "Launch a sub-agent to handle a task in a fresh, isolated conversation. \
         The sub-agent sees only the prompt you give it, works until it is done, \
         and its final answer comes back as this tool's result.\n\n",
    );
    if agents.is_empty() {
        description.push_str("No agents are currently registered.");
    } else {
        description.push_str("Available agent types (pass one as subagentType):");
        for agent in agents.iter() {
            description.push_str(&format!("\n- {}: {}", agent.name, agent.description));
        }
    }

    ToolSchema {
        name: TASK_TOOL_NAME.to_string(),
        description,
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "subagentType": {
                    "type": "string",
                    "description": "Name of the agent to run"
                },
                "prompt": {
                    "type": "string",
                    "description": "The complete task for the agent, with all context it needs"
                }
            },
            "required": ["subagentType", "prompt"]
        }),
    }
}
