//! `workbench agents`: list registered agents and skills.

use workbench_config::EngineConfig;

use super::Workspace;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Workspace::load()?;
    let config: &EngineConfig = &workspace.config;

    println!("Agents ({})", config.agents_dir().display());
    if workspace.agents.is_empty() {
        println!("  (none)");
    }
    for agent in workspace.agents.iter() {
        let model: String = agent.model.clone().into();
        let tools = if agent.allowed_tools.is_empty() {
            "session tools".to_string()
        } else {
            agent.allowed_tools.join(", ")
        };
        println!("  {:<20} {}", agent.name, agent.description);
        println!("  {:<20} model: {model}  tools: {tools}", "");
        if !agent.skills.is_empty() {
            println!("  {:<20} skills: {}", "", agent.skills.join(", "));
        }
    }

    println!("\nSkills ({})", config.skills_dir().display());
    if workspace.skills.is_empty() {
        println!("  (none)");
    }
    for name in workspace.skills.names() {
        let size = workspace.skills.get(name).map(str::len).unwrap_or_default();
        println!("  {name:<20} {size} bytes");
    }

    Ok(())
}
