//! Tool trait: the abstraction over capabilities the model can invoke.
//!
//! Ordinary tools (read a file, run a command, ...) implement [`Tool`] and are
//! registered in a [`ToolRegistry`]. The synthetic `Task` tool is not a
//! `Tool`: it lives in the agent crate's dispatcher because invoking it
//! recurses into a fresh turn loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ToolError;
use crate::message::ContentBlock;

/// Name of the synthetic sub-agent spawning tool.
pub const TASK_TOOL_NAME: &str = "Task";

/// A tool schema as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The tool name (unique within a request)
    pub name: String,

    /// Prose description the model reads to decide when to call it
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

/// The result of one tool call, paired 1:1 with its `tool_use` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The `tool_use` id this result answers
    pub tool_use_id: String,

    /// Output (or error description) handed back to the model
    pub content: String,

    /// Whether the call failed
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<ToolResult> for ContentBlock {
    fn from(result: ToolResult) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: result.tool_use_id,
            content: result.content,
            is_error: result.is_error,
        }
    }
}

/// Environment handed to ordinary tools.
///
/// One working directory is shared by a whole top-level request; nested
/// agents inherit it unchanged.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub working_dir: Arc<PathBuf>,
}

impl ToolContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Arc::new(working_dir.into()),
        }
    }

    /// Resolve a possibly relative path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = std::path::Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool. Errors are reported to the model, never to the caller.
    async fn run(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError>;

    /// Describe this tool for the wire request.
    fn describe(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// A registry of ordinary tools, keyed by name.
///
/// Read-only once execution starts; share it behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if name == TASK_TOOL_NAME {
            tracing::warn!("Ignoring ordinary tool named '{TASK_TOOL_NAME}': the name is reserved");
            return;
        }
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool schemas, sorted by name.
    pub fn definitions(&self) -> Vec<ToolSchema> {
        let mut defs: Vec<ToolSchema> = self.tools.values().map(|t| t.describe()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run a tool by name.
    pub async fn run(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.run(input, ctx).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
