//! Tool dispatch: routes each `tool_use` to the `Task` spawner, an ordinary
//! tool, or a "tool not found" result.

use std::collections::HashSet;

use tracing::{debug, warn};
use workbench_core::tool::{TASK_TOOL_NAME, Tool, ToolResult, ToolSchema};

use crate::context::ExecutionContext;
use crate::loop_runner::LoopError;
use crate::spawner;

pub const TOOL_NOT_FOUND: &str = "tool not found";

/// Where a tool call goes.
pub enum Dispatch<'a> {
    /// Spawn a nested agent.
    Task,
    /// Run an ordinary tool.
    Tool(&'a dyn Tool),
    /// Not callable from this loop.
    Unknown,
}

/// Resolves and runs the tool calls of one loop.
///
/// Only tools advertised in the loop's own request are callable; `Task` is
/// always routed to the spawner, which enforces the depth ceiling.
pub struct Dispatcher<'a> {
    ctx: &'a ExecutionContext,
    advertised: HashSet<&'a str>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(ctx: &'a ExecutionContext, advertised: &'a [ToolSchema]) -> Self {
        Self {
            ctx,
            advertised: advertised.iter().map(|t| t.name.as_str()).collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Dispatch<'a> {
        if name == TASK_TOOL_NAME {
            return Dispatch::Task;
        }
        if !self.advertised.contains(name) {
            return Dispatch::Unknown;
        }
        match self.ctx.tools.get(name) {
            Some(tool) => Dispatch::Tool(tool),
            None => Dispatch::Unknown,
        }
    }

    /// Produce the result for one call.
    ///
    /// Only cancellation escapes as an error; every other failure becomes an
    /// `is_error` result the model gets to see.
    pub async fn invoke(
        &self,
        id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<ToolResult, LoopError> {
        let depth = self.ctx.depth;
        match self.resolve(name) {
            Dispatch::Task => spawner::spawn(self.ctx, id, input).await,
            Dispatch::Tool(tool) => {
                debug!(depth, tool = name, "Running tool");
                let run = tool.run(input.clone(), &self.ctx.tool_context);
                let outcome = tokio::select! {
                    biased;
                    _ = self.ctx.cancel.cancelled() => return Err(LoopError::Cancelled),
                    outcome = run => outcome,
                };
                Ok(match outcome {
                    Ok(content) => ToolResult::ok(id, content),
                    Err(e) => {
                        warn!(depth, tool = name, error = %e, "Tool failed");
                        ToolResult::error(id, e.to_string())
                    }
                })
            }
            Dispatch::Unknown => {
                warn!(depth, tool = name, "Model called a tool that is not available here");
                Ok(ToolResult::error(id, TOOL_NOT_FOUND))
            }
        }
    }
}
