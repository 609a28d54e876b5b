//! k8spulse CLI
//!
//! A command-line tool for reading cluster health history and agent
//! status from a running k8spulse agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, status};

/// k8spulse CLI
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author, version, about = "CLI for the k8spulse cluster health agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via PULSE_API_URL env var)
    #[arg(long, env = "PULSE_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show stored snapshots, most recent first
    History {
        /// How many hours back to look
        #[arg(long, default_value_t = 24)]
        hours: u64,
    },

    /// Show the most recent snapshot
    Latest,

    /// Show node issues from the most recent snapshot
    Nodes,

    /// Show agent health and readiness
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.resolve_format(cli.format);

    // Initialize client
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::History { hours } => history::show_history(&client, hours, format).await?,
        Commands::Latest => history::show_latest(&client, format).await?,
        Commands::Nodes => history::show_nodes(&client, format).await?,
        Commands::Status => status::show_status(&client, format).await?,
    }

    Ok(())
}
