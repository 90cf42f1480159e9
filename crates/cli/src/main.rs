//! Workbench CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config and create the agents/skills dirs
//! - `run`: Run a session to completion, streaming the answer
//! - `agents`: List registered agents and skills
//! - `check`: Validate a session and print the request it assembles to

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "workbench",
    about = "Workbench: run prompt sessions and nested agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the agents/skills directories
    Init,

    /// Run a session file to completion
    Run {
        /// Session JSON file
        session: PathBuf,

        /// Run the session as this agent instead of with its own system and tools
        #[arg(short, long)]
        agent: Option<String>,

        /// Working directory for tools (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Override the nesting ceiling for sub-agents
        #[arg(long)]
        max_depth: Option<u32>,

        /// Override the per-loop turn ceiling
        #[arg(long)]
        max_turns: Option<u32>,

        /// Wait for complete responses instead of streaming
        #[arg(long)]
        no_stream: bool,
    },

    /// List registered agents and skills
    Agents,

    /// Validate a session and print the assembled request
    Check {
        /// Session JSON file
        session: PathBuf,

        /// Assemble as this agent
        #[arg(short, long)]
        agent: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the answer.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Run {
            session,
            agent,
            cwd,
            max_depth,
            max_turns,
            no_stream,
        } => {
            commands::run::run(commands::run::RunArgs {
                session,
                agent,
                cwd,
                max_depth,
                max_turns,
                no_stream,
            })
            .await?
        }
        Commands::Agents => commands::agents::run().await?,
        Commands::Check { session, agent } => commands::check::run(session, agent).await?,
    }

    Ok(())
}
