//! File read tool: read file contents relative to the working directory.

use async_trait::async_trait;
use std::path::{Component, Path};
use workbench_core::error::ToolError;
use workbench_core::tool::{Tool, ToolContext};

pub struct FileReadTool {
    /// Refuse paths that resolve outside the working directory.
    confine_to_working_dir: bool,
    /// Forbidden path prefixes.
    forbidden_paths: Vec<String>,
}

impl FileReadTool {
    /// Create a file read tool with no path restrictions.
    pub fn new() -> Self {
        Self {
            confine_to_working_dir: false,
            forbidden_paths: Vec::new(),
        }
    }

    /// Create a file read tool confined to the working directory.
    pub fn confined(forbidden_paths: Vec<String>) -> Self {
        Self {
            confine_to_working_dir: true,
            forbidden_paths,
        }
    }

    fn check_path(&self, raw: &str, resolved: &Path, ctx: &ToolContext) -> Result<(), ToolError> {
        let deny = |reason: String| ToolError::PermissionDenied {
            tool_name: "file_read".into(),
            reason,
        };

        if self.confine_to_working_dir {
            if Path::new(raw).components().any(|c| c == Component::ParentDir) {
                return Err(deny(format!("Path traversal detected in '{raw}'")));
            }
            if !resolved.starts_with(ctx.working_dir.as_path()) {
                return Err(deny(format!("Path '{raw}' is outside the working directory")));
            }
        }

        if let Some(pattern) = self
            .forbidden_paths
            .iter()
            .find(|p| resolved.starts_with(Path::new(p.as_str())))
        {
            return Err(deny(format!("Path '{raw}' matches forbidden pattern '{pattern}'")));
        }
        Ok(())
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Relative paths resolve against the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn run(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = ctx.resolve(path);
        self.check_path(path, &resolved, ctx)?;

        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!("Failed to read file: {e}"),
            })
    }
}
