//! Agent spawner: runs a `Task` call as a nested turn loop.
//!
//! The nested loop gets a fresh thread holding only the prompt, runs to
//! completion while the parent waits, and its final text comes back as the
//! parent's tool result. Nothing a nested loop does can abort its parent
//! except cancellation.

use futures::future::BoxFuture;
use tracing::{info, warn};
use workbench_core::message::{Message, Thread};
use workbench_core::tool::ToolResult;

use crate::assembler::RequestAssembler;
use crate::context::ExecutionContext;
use crate::loop_runner::{LoopError, TurnLoop};
use crate::stream_event::AgentStreamEvent;
use crate::task::TaskInput;

/// Handle one `Task` call made by the loop running under `ctx`.
///
/// Boxed because it recurses: the nested loop may dispatch `Task` again.
pub fn spawn<'a>(
    ctx: &'a ExecutionContext,
    tool_use_id: &'a str,
    input: &'a serde_json::Value,
) -> BoxFuture<'a, Result<ToolResult, LoopError>> {
    Box::pin(async move {
        if ctx.at_depth_ceiling() {
            warn!(depth = ctx.depth, max_depth = ctx.max_depth, "Refusing to spawn past depth ceiling");
            return Ok(ToolResult::error(
                tool_use_id,
                format!(
                    "cannot spawn a sub-agent: depth ceiling reached ({} of {})",
                    ctx.depth, ctx.max_depth
                ),
            ));
        }

        let task: TaskInput = match serde_json::from_value(input.clone()) {
            Ok(task) => task,
            Err(e) => {
                return Ok(ToolResult::error(tool_use_id, format!("invalid Task input: {e}")));
            }
        };

        let Some(agent) = ctx.agents.get(&task.subagent_type) else {
            warn!(depth = ctx.depth, agent = %task.subagent_type, "Unknown agent requested");
            let available = ctx.agents.names();
            let hint = if available.is_empty() {
                "no agents are registered".to_string()
            } else {
                format!("available: {}", available.join(", "))
            };
            return Ok(ToolResult::error(
                tool_use_id,
                format!("unknown agent '{}' ({hint})", task.subagent_type),
            ));
        };

        let child = ctx.child(agent.model.resolve(&ctx.model));
        let template = match RequestAssembler::new(&child).assemble(Some(agent), Vec::new()) {
            Ok(request) => request,
            Err(e) => {
                warn!(depth = child.depth, agent = %agent.name, error = %e, "Sub-agent assembly failed");
                return Ok(ToolResult::error(
                    tool_use_id,
                    format!("agent '{}' could not start: {e}", agent.name),
                ));
            }
        };

        info!(depth = child.depth, agent = %agent.name, model = %child.model, "Spawning sub-agent");
        ctx.emit(AgentStreamEvent::SubAgentStarted {
            depth: child.depth,
            agent: agent.name.clone(),
            model: child.model.clone(),
        });

        let thread = Thread::new(vec![Message::user(task.prompt)]);
        let outcome = TurnLoop::new(&child, template, thread).run().await;

        ctx.emit(AgentStreamEvent::SubAgentFinished {
            depth: child.depth,
            agent: agent.name.clone(),
            is_error: outcome.is_err(),
        });

        match outcome {
            Ok(outcome) => Ok(ToolResult::ok(tool_use_id, outcome.text)),
            Err(failure) if matches!(failure.error, LoopError::Cancelled) => Err(LoopError::Cancelled),
            Err(failure) => {
                warn!(
                    depth = child.depth,
                    agent = %agent.name,
                    error = %failure.error,
                    "Sub-agent failed"
                );
                let mut content = format!("agent '{}' failed: {}", agent.name, failure.error);
                if let Some(text) = failure.last_assistant_text() {
                    content.push_str("\n\nLast output:\n");
                    content.push_str(&text);
                }
                Ok(ToolResult::error(tool_use_id, content))
            }
        }
    })
}
