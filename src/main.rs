//! aiswarm CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use aiswarm::cli::commands::{init, launch, list, monitor, serve};
use aiswarm::cli::{Cli, Commands};
use aiswarm::infrastructure::logging;
use aiswarm::services::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_dir = match &cli.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Cannot determine working directory")?,
    };

    let config = Config::load(&base_dir).context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Init { force } => init::handle_init(&base_dir, force).await,
        Commands::Serve => serve::handle_serve(&base_dir, config).await,
        Commands::Launch { agent, description, model, worktree, dry_run, yolo } => {
            launch::handle_launch(
                &base_dir,
                config,
                launch::LaunchArgs {
                    persona: agent,
                    description,
                    model,
                    worktree,
                    dry_run,
                    yolo,
                },
            )
            .await
        }
        Commands::List { persona, json } => list::handle_list(&base_dir, config, persona, json).await,
        Commands::Monitor => monitor::handle_monitor(&base_dir, config).await,
    }
}
