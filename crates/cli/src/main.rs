//! handoff CLI: the main entry point.
//!
//! Commands:
//! - `onboard`  : write a starter config and workspace
//! - `agent`    : interactive chat or single-message mode
//! - `personas` : list configured personas
//! - `status`   : show the effective configuration
//! - `doctor`   : diagnose configuration and provider health

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "handoff",
    about = "handoff: a multi-persona agent runtime with in-turn delegation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of ~/.handoff/config.toml
    #[arg(short, long, global = true, env = "HANDOFF_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Onboard,

    /// Chat with the agent
    #[command(alias = "chat")]
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Persona to start with instead of the configured default
        #[arg(short, long)]
        persona: Option<String>,
    },

    /// List configured personas
    Personas,

    /// Show the effective configuration
    Status,

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(|| handoff_config::AppConfig::config_dir().join("config.toml"));

    match cli.command {
        Commands::Onboard => commands::onboard::run(&config_path)?,
        Commands::Agent { message, persona } => {
            commands::agent::run(&config_path, message, persona).await?
        }
        Commands::Personas => commands::status::personas(&config_path)?,
        Commands::Status => commands::status::run(&config_path)?,
        Commands::Doctor => commands::doctor::run(&config_path).await?,
    }

    Ok(())
}
