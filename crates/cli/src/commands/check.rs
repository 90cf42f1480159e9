//! `workbench check`: validate a session and show the request it assembles to.

use std::path::PathBuf;
use std::sync::Arc;

use workbench_agent::{ExecutionContext, RequestAssembler};
use workbench_core::provider::ModelClient;
use workbench_providers::AnthropicClient;

use super::{Workspace, load_session};

pub async fn run(path: PathBuf, agent: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Workspace::load()?;
    let session = load_session(&path, &workspace.config)?;
    let agent = workspace.agent(agent.as_deref())?;

    // Assembly never calls the client.
    let client: Arc<dyn ModelClient> = Arc::new(AnthropicClient::new(""));
    let ctx = ExecutionContext::new(Arc::new(session), client)
        .with_tools(Arc::new(workbench_tools::default_registry()))
        .with_agents(Arc::new(workspace.agents.clone()))
        .with_skills(Arc::new(workspace.skills.clone()));

    let messages = ctx.session.messages.clone();
    let request = RequestAssembler::new(&ctx)
        .assemble(agent.as_ref(), messages)
        .map_err(|e| format!("Assembly failed: {e}"))?;

    eprintln!("  ✅ {} is valid", path.display());
    eprintln!("  Model:     {}", request.model);
    eprintln!("  Messages:  {}", request.messages.len());
    eprintln!(
        "  Tools:     {}",
        request
            .tools
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
