//! Configuration loading and validation for Workbench.
//!
//! Loads configuration from `~/.workbench/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.workbench/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// API key for the model client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the model API base URL (proxies, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when a session doesn't name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Max tokens used when a session doesn't set them
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Sub-agent spawn depth ceiling
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Model calls allowed per turn loop
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Request streamed responses from the model
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Directory of agent definition files (`*.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<PathBuf>,

    /// Directory of skill files (`*.md`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills_dir: Option<PathBuf>,

    /// Client-side retry policy for transient model errors
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_depth() -> u32 {
    5
}
fn default_max_turns() -> u32 {
    25
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("max_depth", &self.max_depth)
            .field("max_turns", &self.max_turns)
            .field("stream", &self.stream)
            .field("agents_dir", &self.agents_dir)
            .field("skills_dir", &self.skills_dir)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first failure (0 disables retries)
    #[serde(default)]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles on each further attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.workbench/config.toml).
    ///
    /// Also checks environment variables:
    /// - `WORKBENCH_API_KEY` (highest priority), then `ANTHROPIC_API_KEY`
    /// - `WORKBENCH_MODEL` overrides the default model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("WORKBENCH_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("WORKBENCH_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".workbench")
    }

    /// Agents directory, falling back to `~/.workbench/agents`.
    pub fn agents_dir(&self) -> PathBuf {
        self.agents_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("agents"))
    }

    /// Skills directory, falling back to `~/.workbench/skills`.
    pub fn skills_dir(&self) -> PathBuf {
        self.skills_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("skills"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::ValidationError("max_turns must be at least 1".into()));
        }
        if self.default_max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "default_max_tokens must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: default_model(),
            default_max_tokens: default_max_tokens(),
            max_depth: default_max_depth(),
            max_turns: default_max_turns(),
            stream: true,
            agents_dir: None,
            skills_dir: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
