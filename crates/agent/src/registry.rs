//! Agent and skill registries.
//!
//! Both are loaded once before execution starts and shared read-only
//! (behind an `Arc`) by every loop of a request. Enumeration is sorted by
//! name so anything derived from a registry snapshot is deterministic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use workbench_core::agent::AgentDefinition;
use workbench_core::error::{Error, Result};

/// Registered agent definitions, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Rejects invalid names and duplicates.
    pub fn register(&mut self, agent: AgentDefinition) -> Result<()> {
        agent.validate()?;
        if self.agents.contains_key(&agent.name) {
            return Err(Error::Config {
                message: format!("duplicate agent name '{}'", agent.name),
            });
        }
        self.agents.insert(agent.name.clone(), agent);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, agent: AgentDefinition) -> Result<Self> {
        self.register(agent)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    /// Definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Load every `*.json` agent definition in `dir`.
    ///
    /// A missing directory yields an empty registry.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for path in files_with_extension(dir, "json")? {
            let content = read(&path)?;
            let agent: AgentDefinition = serde_json::from_str(&content).map_err(|e| Error::Config {
                message: format!("invalid agent definition {}: {e}", path.display()),
            })?;
            debug!(agent = %agent.name, path = %path.display(), "Loaded agent definition");
            registry.register(agent).map_err(|e| match e {
                Error::Config { message } => Error::Config {
                    message: format!("{}: {message}", path.display()),
                },
                other => other,
            })?;
        }
        info!(dir = %dir.display(), count = registry.len(), "Agent registry loaded");
        Ok(registry)
    }
}

/// Named blocks of reusable context, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, String>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill. Rejects duplicates.
    pub fn register(&mut self, name: impl Into<String>, content: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.skills.contains_key(&name) {
            return Err(Error::Config {
                message: format!("duplicate skill name '{name}'"),
            });
        }
        self.skills.insert(name, content.into());
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        self.register(name, content)?;
        Ok(self)
    }

    /// Full content of a skill.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.skills.get(name).map(String::as_str)
    }

    pub fn names(&self) -> Vec<&str> {
        self.skills.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Load every `*.md` file in `dir`, keyed by file stem.
    ///
    /// A missing directory yields an empty registry.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for path in files_with_extension(dir, "md")? {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = read(&path)?;
            registry.register(name, content)?;
        }
        info!(dir = %dir.display(), count = registry.len(), "Skill registry loaded");
        Ok(registry)
    }
}

/// Regular files in `dir` with the given extension, sorted by path.
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "Directory not found, nothing to load");
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| Error::Config {
        message: format!("failed to read {}: {e}", dir.display()),
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == ext))
        .collect();
    paths.sort();
    Ok(paths)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("failed to read {}: {e}", path.display()),
    })
}
