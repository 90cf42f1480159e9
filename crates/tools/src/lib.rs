//! Built-in tool implementations for Workbench.
//!
//! Ordinary tools run against the working directory of the top-level
//! request: read files, run commands, or simply echo their input.
//! Externally provided tools register into the same `ToolRegistry`.

pub mod echo;
pub mod file_read;
pub mod shell;

use workbench_core::tool::ToolRegistry;

pub use echo::EchoTool;
pub use file_read::FileReadTool;
pub use shell::ShellTool;

/// Create a default tool registry with all built-in tools.
///
/// Security defaults:
/// - Shell: only common read-mostly commands (ls, cat, grep, git, ...),
///   run without a shell so they cannot be chained or redirected
/// - File read: confined to the working directory
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let safe_commands = [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "wc", "grep", "git",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    registry.register(Box::new(ShellTool::new(safe_commands)));
    registry.register(Box::new(FileReadTool::confined(vec![])));
    registry.register(Box::new(EchoTool));
    registry
}
