//! Error types for the Workbench domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` unifies them
//! for callers that don't care which layer failed.

use thiserror::Error;

/// The top-level error type for Workbench operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model client errors ---
    #[error("Model client error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Request assembly errors ---
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    // --- Session / definition validation ---
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    // --- Configuration / loading errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by a model client. All of them are fatal for the
/// turn loop that encountered them.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Short, stable name of the failure class (`auth`, `rate_limit`, `transport`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Network(_) | Self::StreamInterrupted(_) | Self::Timeout(_) => "transport",
            Self::ApiError { .. } => "api",
            Self::NotConfigured(_) => "not_configured",
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures while turning a Session (plus optional agent) into a wire request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown skill: {0}")]
    UnknownSkill(String),
}
