//! Agent definitions: named personas that can be spawned as nested conversations.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which model a spawned agent runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelChoice {
    /// Reuse the spawning parent's resolved model
    #[default]
    Inherit,
    /// A concrete model id
    Id(String),
}

impl ModelChoice {
    /// Resolve against the parent's model.
    pub fn resolve<'a>(&'a self, parent_model: &'a str) -> &'a str {
        match self {
            Self::Inherit => parent_model,
            Self::Id(id) => id,
        }
    }
}

impl From<String> for ModelChoice {
    fn from(s: String) -> Self {
        if s.is_empty() || s == "inherit" {
            Self::Inherit
        } else {
            Self::Id(s)
        }
    }
}

impl From<ModelChoice> for String {
    fn from(choice: ModelChoice) -> Self {
        match choice {
            ModelChoice::Inherit => "inherit".into(),
            ModelChoice::Id(id) => id,
        }
    }
}

/// A preconfigured agent persona.
///
/// Immutable once loaded; lives as long as the registry holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique slug (`[a-z0-9_-]+`)
    pub name: String,

    /// Prose the parent model reads when choosing an agent
    pub description: String,

    /// Concrete model id or "inherit"
    #[serde(default)]
    pub model: ModelChoice,

    /// Tool names this agent may use. Empty = every session tool except `Task`.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Skills preloaded into the system context, in order
    #[serde(default)]
    pub skills: Vec<String>,

    /// Replaces the session's system text
    #[serde(default)]
    pub system_prompt: String,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            model: ModelChoice::Inherit,
            allowed_tools: Vec::new(),
            skills: Vec::new(),
            system_prompt: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = ModelChoice::from(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Check that the name is a slug.
    pub fn validate(&self) -> Result<()> {
        let is_slug = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !is_slug {
            return Err(Error::Config {
                message: format!("agent name '{}' is not a slug ([a-z0-9_-]+)", self.name),
            });
        }
        Ok(())
    }
}
