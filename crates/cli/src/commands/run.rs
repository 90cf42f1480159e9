//! `workbench run`: drive a session to completion.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use workbench_agent::{AgentStreamEvent, ExecutionContext, run_session};

use super::{Workspace, build_client, load_session};

pub struct RunArgs {
    pub session: PathBuf,
    pub agent: Option<String>,
    pub cwd: Option<PathBuf>,
    pub max_depth: Option<u32>,
    pub max_turns: Option<u32>,
    pub no_stream: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = Workspace::load()?;
    let config = &workspace.config;
    let session = load_session(&args.session, config)?;
    let agent = workspace.agent(args.agent.as_deref())?;
    let client = build_client(config, config.stream && !args.no_stream)?;
    let cwd = match args.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = ExecutionContext::new(Arc::new(session), client)
        .with_tools(Arc::new(workbench_tools::default_registry()))
        .with_agents(Arc::new(workspace.agents.clone()))
        .with_skills(Arc::new(workspace.skills.clone()))
        .with_max_depth(args.max_depth.unwrap_or(config.max_depth))
        .with_max_turns(args.max_turns.unwrap_or(config.max_turns))
        .with_working_dir(cwd)
        .with_cancellation(cancel.clone())
        .with_observer(tx);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            interrupt.cancel();
        }
    });

    let printer = tokio::spawn(print_events(rx));
    let result = run_session(&ctx, agent.as_ref()).await;
    // Closing the observer channel lets the printer drain and exit.
    drop(ctx);
    printer.await?;

    match result {
        Ok(outcome) => {
            eprintln!(
                "\n  Done in {} turn(s), {} tokens",
                outcome.turns,
                outcome.usage.total()
            );
            Ok(())
        }
        Err(failure) => {
            eprintln!("\n  Aborted [{}]: {}", failure.error.kind(), failure.error);
            if let Some(text) = failure.last_assistant_text() {
                eprintln!("\n  Last assistant output:\n{text}");
            }
            Err(Box::new(failure))
        }
    }
}

/// Print top-level text to stdout and a trace of tool and agent activity to stderr.
async fn print_events(mut rx: mpsc::UnboundedReceiver<AgentStreamEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        let indent = "  ".repeat(event.depth() as usize + 1);
        match event {
            AgentStreamEvent::Chunk { depth: 0, content } => {
                print!("{content}");
                let _ = stdout.flush();
            }
            AgentStreamEvent::ToolCall { name, .. } => eprintln!("\n{indent}→ {name}"),
            AgentStreamEvent::ToolResult {
                name,
                is_error: true,
                content,
                ..
            } => eprintln!("{indent}✗ {name}: {}", first_line(&content)),
            AgentStreamEvent::SubAgentStarted { agent, model, .. } => {
                eprintln!("{indent}▶ agent {agent} ({model})")
            }
            AgentStreamEvent::SubAgentFinished { agent, is_error, .. } => {
                eprintln!("{indent}■ agent {agent}{}", if is_error { " failed" } else { "" })
            }
            AgentStreamEvent::Done { depth: 0, .. } => println!(),
            _ => {}
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_of_multiline_error() {
        assert_eq!(first_line("agent 'x' failed\n\nLast output:\n..."), "agent 'x' failed");
        assert_eq!(first_line(""), "");
    }
}
