//! Echo tool: returns its `msg` input verbatim.
//!
//! Handy for wiring checks in the workbench: a session can exercise the
//! whole tool-call loop without touching the filesystem.

use async_trait::async_trait;
use workbench_core::error::ToolError;
use workbench_core::tool::{Tool, ToolContext};

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "Echo"
    }

    fn description(&self) -> &str {
        "Echo back the given message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "msg": { "type": "string", "description": "Text to echo" }
            },
            "required": ["msg"]
        })
    }

    async fn run(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        input["msg"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'msg' argument".into()))
    }
}
