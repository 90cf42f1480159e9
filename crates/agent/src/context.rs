//! Per-level execution state shared down the spawn tree.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use workbench_core::provider::ModelClient;
use workbench_core::session::Session;
use workbench_core::tool::{ToolContext, ToolRegistry};

use crate::registry::{AgentRegistry, SkillRegistry};
use crate::stream_event::AgentStreamEvent;

pub const DEFAULT_MAX_DEPTH: u32 = 5;
pub const DEFAULT_MAX_TURNS: u32 = 25;

/// Everything a turn loop needs besides its own thread.
///
/// Cloning is cheap: registries, the client and the session snapshot are
/// behind `Arc`s. A nested agent gets a [`child`](Self::child) context that
/// differs only in `depth` and `model`; everything else is shared, including
/// the working directory and the cancellation token.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Spawn depth, 0 at the top level
    pub depth: u32,
    pub max_depth: u32,
    /// Per-loop turn ceiling
    pub max_turns: u32,
    /// Resolved model of this level
    pub model: String,
    pub session: Arc<Session>,
    pub client: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub skills: Arc<SkillRegistry>,
    pub tool_context: ToolContext,
    pub cancel: CancellationToken,
    observer: Option<mpsc::UnboundedSender<AgentStreamEvent>>,
}

impl ExecutionContext {
    /// Top-level context for a session. The root model is the session's.
    pub fn new(session: Arc<Session>, client: Arc<dyn ModelClient>) -> Self {
        Self {
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            max_turns: DEFAULT_MAX_TURNS,
            model: session.model.clone(),
            session,
            client,
            tools: Arc::new(ToolRegistry::new()),
            agents: Arc::new(AgentRegistry::new()),
            skills: Arc::new(SkillRegistry::new()),
            tool_context: ToolContext::new("."),
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_agents(mut self, agents: Arc<AgentRegistry>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_skills(mut self, skills: Arc<SkillRegistry>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_context = ToolContext::new(dir);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Forward execution events to `tx`.
    pub fn with_observer(mut self, tx: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        self.observer = Some(tx);
        self
    }

    /// Context for a nested agent running on `model`.
    pub fn child(&self, model: impl Into<String>) -> Self {
        Self {
            depth: self.depth + 1,
            model: model.into(),
            ..self.clone()
        }
    }

    /// Whether an agent spawned from here would exceed the depth ceiling.
    pub fn at_depth_ceiling(&self) -> bool {
        self.depth >= self.max_depth
    }

    /// Send an event to the observer, if any. A dropped receiver is ignored.
    pub fn emit(&self, event: AgentStreamEvent) {
        if let Some(tx) = &self.observer {
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .field("max_turns", &self.max_turns)
            .field("model", &self.model)
            .field("client", &self.client.name())
            .field("tools", &self.tools.names())
            .field("agents", &self.agents.names())
            .field("working_dir", &self.tool_context.working_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedClient;

    fn ctx() -> ExecutionContext {
        let session = Arc::new(Session::new("claude-root", 256));
        ExecutionContext::new(session, Arc::new(ScriptedClient::new(vec![])))
    }

    #[test]
    fn defaults() {
        let ctx = ctx();
        assert_eq!(ctx.depth, 0);
        assert_eq!(ctx.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(ctx.max_turns, DEFAULT_MAX_TURNS);
        assert_eq!(ctx.model, "claude-root");
    }

    #[test]
    fn child_increments_depth_and_shares_the_rest() {
        let parent = ctx().with_working_dir("/work").with_max_depth(2);
        let child = parent.child("claude-child");
        assert_eq!(child.depth, 1);
        assert_eq!(child.model, "claude-child");
        assert_eq!(child.max_depth, 2);
        assert!(Arc::ptr_eq(&child.agents, &parent.agents));
        assert!(Arc::ptr_eq(&child.tool_context.working_dir, &parent.tool_context.working_dir));

        parent.cancel.cancel();
        assert!(child.cancel.is_cancelled());
    }

    #[test]
    fn depth_ceiling() {
        let root = ctx().with_max_depth(1);
        assert!(!root.at_depth_ceiling());
        assert!(root.child("m").at_depth_ceiling());
        assert!(ctx().with_max_depth(0).at_depth_ceiling());
    }

    #[test]
    fn emit_without_observer_is_a_no_op() {
        ctx().emit(AgentStreamEvent::TurnStarted { depth: 0, turn: 1 });
    }

    #[test]
    fn emit_reaches_observer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx().with_observer(tx);
        ctx.child("m").emit(AgentStreamEvent::TurnStarted { depth: 1, turn: 1 });
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentStreamEvent::TurnStarted { depth: 1, turn: 1 }
        );
    }
}
