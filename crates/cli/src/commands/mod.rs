pub mod agents;
pub mod check;
pub mod init;
pub mod run;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use workbench_agent::{AgentRegistry, SkillRegistry};
use workbench_config::EngineConfig;
use workbench_core::agent::AgentDefinition;
use workbench_core::provider::ModelClient;
use workbench_core::session::Session;
use workbench_providers::{AnthropicClient, RetryingClient};

/// Config plus the registries loaded from its directories.
pub struct Workspace {
    pub config: EngineConfig,
    pub agents: AgentRegistry,
    pub skills: SkillRegistry,
}

impl Workspace {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = EngineConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let agents = AgentRegistry::load_dir(&config.agents_dir())?;
        let skills = SkillRegistry::load_dir(&config.skills_dir())?;
        Ok(Self {
            config,
            agents,
            skills,
        })
    }

    /// Look up an agent requested on the command line.
    pub fn agent(&self, name: Option<&str>) -> Result<Option<AgentDefinition>, Box<dyn std::error::Error>> {
        let Some(name) = name else {
            return Ok(None);
        };
        match self.agents.get(name) {
            Some(agent) => Ok(Some(agent.clone())),
            None => Err(format!(
                "Unknown agent '{name}'. Registered: {}",
                if self.agents.is_empty() {
                    "(none)".to_string()
                } else {
                    self.agents.names().join(", ")
                }
            )
            .into()),
        }
    }
}

/// Read a session file. `model` and `max_tokens` fall back to the config defaults.
pub fn load_session(path: &Path, config: &EngineConfig) -> Result<Session, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("{} is not valid JSON: {e}", path.display()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.entry("model")
            .or_insert_with(|| config.default_model.clone().into());
        obj.entry("max_tokens")
            .or_insert_with(|| config.default_max_tokens.into());
    }
    let session = Session::from_json(&value.to_string())
        .map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(session)
}

/// Build the model client described by the config.
pub fn build_client(
    config: &EngineConfig,
    stream: bool,
) -> Result<Arc<dyn ModelClient>, Box<dyn std::error::Error>> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        format!(
            "No API key configured. Set ANTHROPIC_API_KEY or add api_key to {}",
            EngineConfig::config_dir().join("config.toml").display()
        )
    })?;

    let mut client = AnthropicClient::new(api_key).with_streaming(stream);
    if let Some(url) = &config.base_url {
        client = client.with_base_url(url.clone());
    }
    let client: Arc<dyn ModelClient> = Arc::new(client);

    if config.retry.max_retries == 0 {
        return Ok(client);
    }
    Ok(Arc::new(
        RetryingClient::new(client)
            .with_max_retries(config.retry.max_retries)
            .with_initial_backoff(Duration::from_millis(config.retry.initial_backoff_ms)),
    ))
}
