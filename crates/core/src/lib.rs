//! # Workbench Core
//!
//! Domain types, traits, and error definitions for the Workbench agent
//! execution engine. This crate has **no framework dependencies** beyond
//! serde and tokio's channel types; it defines the domain model that the
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the engine (model client, ordinary tools) is a trait
//! here. Implementations live in their respective crates. This enables:
//! - Swapping a real model client for a scripted one in tests
//! - Registering externally provided tools without touching the engine
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentDefinition, ModelChoice};
pub use error::{AssemblyError, Error, ProviderError, Result, ToolError};
pub use message::{ContentBlock, Message, Role, Thread, ThreadId, ToolUse};
pub use provider::{
    DeltaReceiver, ModelClient, ModelReply, ModelRequest, ModelResponse, StopReason, StreamDelta,
    Usage,
};
pub use session::{CacheControl, Session, SystemBlock};
pub use tool::{TASK_TOOL_NAME, Tool, ToolContext, ToolRegistry, ToolResult, ToolSchema};
