//! Conclave CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway
//! - `agents`  — Build every configured agent and report failures
//! - `ask`     — Send one message to an agent
//! - `route`   — Route one task through a network

use clap::{Parser, Subcommand};

mod bootstrap;
mod commands;

#[derive(Parser)]
#[command(
    name = "conclave",
    about = "Conclave — configurable agents with shared memory threads and network routing",
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
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Build every configured agent and network, then list them
    Agents,

    /// Send a single message to an agent
    Ask {
        /// Agent id
        #[arg(short, long)]
        agent: String,

        /// The message
        #[arg(short, long)]
        message: String,

        /// Resource (e.g. user id) whose thread to record on
        #[arg(short, long)]
        resource: Option<String>,

        /// Explicit thread id
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Route a task through a network
    Route {
        /// Network name
        #[arg(short, long)]
        network: String,

        /// The task
        #[arg(short, long)]
        message: String,

        /// Resource (e.g. user id) whose thread to record on
        #[arg(short, long)]
        resource: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Agents => commands::agents::run().await?,
        Commands::Ask {
            agent,
            message,
            resource,
            thread,
        } => commands::ask::run(&agent, message, resource, thread).await?,
        Commands::Route {
            network,
            message,
            resource,
        } => commands::route::run(&network, &message, resource).await?,
    }

    Ok(())
}
