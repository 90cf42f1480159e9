//! Request assembly: turns a session snapshot, a thread and an optional
//! agent into the wire request a model client accepts.
//!
//! | | no agent | agent |
//! |---|---|---|
//! | model | session model | agent model, `inherit` → level model |
//! | system | session blocks | agent prompt + one cached block per skill |
//! | tools | session tools + generated `Task` | allowlist (or session tools), never `Task` |

use workbench_core::agent::AgentDefinition;
use workbench_core::error::AssemblyError;
use workbench_core::message::Message;
use workbench_core::provider::ModelRequest;
use workbench_core::session::SystemBlock;
use workbench_core::tool::{TASK_TOOL_NAME, ToolSchema};

use crate::context::ExecutionContext;
use crate::task::task_schema;

/// Builds `ModelRequest`s for one level of execution.
pub struct RequestAssembler<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> RequestAssembler<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Assemble a complete request for `messages`.
    pub fn assemble(
        &self,
        agent: Option<&AgentDefinition>,
        messages: Vec<Message>,
    ) -> Result<ModelRequest, AssemblyError> {
        let session = &self.ctx.session;
        let (model, system, tools) = match agent {
            None => (session.model.clone(), session.system.clone(), self.session_tools()),
            Some(agent) => (
                agent.model.resolve(&self.ctx.model).to_string(),
                self.agent_system(agent)?,
                self.agent_tools(agent)?,
            ),
        };
        Ok(ModelRequest {
            model,
            max_tokens: session.max_tokens,
            system,
            tools,
            messages,
        })
    }

    /// Session tools, with the generated `Task` schema in place of a declared
    /// `Task` entry, or appended when any agent is registered.
    fn session_tools(&self) -> Vec<ToolSchema> {
        let task = task_schema(&self.ctx.agents);
        let mut tools = self.ctx.session.tools.clone();
        match tools.iter_mut().find(|t| t.name == TASK_TOOL_NAME) {
            Some(slot) => *slot = task,
            None if !self.ctx.agents.is_empty() => tools.push(task),
            None => {}
        }
        tools
    }

    fn agent_system(&self, agent: &AgentDefinition) -> Result<Vec<SystemBlock>, AssemblyError> {
        let mut system = Vec::with_capacity(agent.skills.len() + 1);
        system.push(SystemBlock::new(agent.system_prompt.clone()));
        for name in &agent.skills {
            let content = self
                .ctx
                .skills
                .get(name)
                .ok_or_else(|| AssemblyError::UnknownSkill(name.clone()))?;
            system.push(SystemBlock::cached(content));
        }
        Ok(system)
    }

    fn agent_tools(&self, agent: &AgentDefinition) -> Result<Vec<ToolSchema>, AssemblyError> {
        let session = &self.ctx.session;
        if agent.allowed_tools.is_empty() {
            return Ok(session
                .tools
                .iter()
                .filter(|t| t.name != TASK_TOOL_NAME)
                .cloned()
                .collect());
        }

        agent
            .allowed_tools
            .iter()
            .filter(|name| name.as_str() != TASK_TOOL_NAME)
            .map(|name| {
                session
                    .tool(name)
                    .cloned()
                    .or_else(|| self.ctx.tools.get(name).map(|t| t.describe()))
                    .ok_or_else(|| AssemblyError::UnknownTool(name.clone()))
            })
            .collect()
    }
}
