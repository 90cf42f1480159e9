//! Shell tool: execute system commands in the working directory.
//!
//! Supports command allowlisting and a timeout. An allowlisted tool never
//! hands the command to a shell: the command is split on whitespace and
//! run directly, and shell syntax is refused outright.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use workbench_core::error::ToolError;
use workbench_core::tool::{Tool, ToolContext};

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self {
            allowed_commands,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        if has_shell_syntax(command) {
            return false;
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }

    fn build_command(&self, command: &str) -> Command {
        if !self.allowed_commands.is_empty() {
            let mut argv = command.split_whitespace();
            let mut c = Command::new(argv.next().unwrap_or_default());
            c.args(argv);
            return c;
        }
        if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        }
    }
}

/// Characters that chain, redirect, substitute or expand under `sh`.
const SHELL_SYNTAX: &[char] = &[
    ';', '&', '|', '`', '$', '<', '>', '(', ')', '{', '}', '*', '?', '~', '\\', '\'', '"', '\n', '\r',
];

fn has_shell_syntax(command: &str) -> bool {
    command.contains(SHELL_SYNTAX)
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn run(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            let reason = if has_shell_syntax(command) {
                "shell operators, redirects and quoting are not allowed".to_string()
            } else {
                format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                )
            };
            return Err(ToolError::PermissionDenied {
                tool_name: "shell".into(),
                reason,
            });
        }

        debug!(command = %command, cwd = %ctx.working_dir.display(), "Executing shell command");

        let mut cmd = self.build_command(command);
        cmd.current_dir(ctx.working_dir.as_path()).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            let text = if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(text.trim().to_string())
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            Err(ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: format!("[exit code: {code}]\n{}\n{}", stdout.trim(), stderr.trim()),
            })
        }
    }
}
