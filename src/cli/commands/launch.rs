//! `aiswarm launch`: spawn and register one agent process.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::adapters::sqlite::{
    initialize_database, SqliteAgentRepository, SqliteEventLogRepository,
};
use crate::adapters::{PersonaCatalog, ProcessLauncher, SignalTerminator};
use crate::domain::ports::{LaunchRequest, Launcher, PersonaLoader, SystemClock};
use crate::domain::models::RegisterAgentRequest;
use crate::services::{AgentRegistry, Config, EventBuses, EventLogger};

pub struct LaunchArgs {
    pub persona: String,
    pub description: String,
    pub model: Option<String>,
    pub worktree: Option<String>,
    pub dry_run: bool,
    pub yolo: bool,
}

pub async fn handle_launch(base_dir: &Path, config: Config, args: LaunchArgs) -> Result<()> {
    let personas = Arc::new(PersonaCatalog::with_overrides(base_dir.join(".aiswarm").join("personas")));

    if personas.load(&args.persona).is_err() {
        bail!(
            "Unknown persona '{}'. Available: {}",
            args.persona,
            personas.available().join(", ")
        );
    }

    if args.dry_run {
        println!(
            "Would launch: {} (persona={}, model={}, worktree={})",
            config.launcher.program,
            args.persona,
            args.model.as_deref().unwrap_or("default"),
            args.worktree.as_deref().unwrap_or("none"),
        );
        return Ok(());
    }

    let pool = initialize_database(&config.database_url(base_dir))
        .await
        .context("Failed to open coordination database")?;

    let buses = Arc::new(EventBuses::new());
    let mut logger = EventLogger::new(
        Arc::new(SqliteEventLogRepository::new(pool.clone())),
        Arc::clone(&buses),
    );
    logger.start();

    let registry = AgentRegistry::new(
        Arc::new(SqliteAgentRepository::new(pool)),
        Arc::clone(&buses.agent),
        Arc::new(SystemClock),
        Arc::new(SignalTerminator),
    );

    let agent_id = registry
        .register(RegisterAgentRequest {
            persona_id: args.persona.clone(),
            working_directory: base_dir.display().to_string(),
            model: args.model.clone(),
            worktree_name: args.worktree.clone(),
        })
        .await?;

    let launcher = ProcessLauncher::new(
        config.launcher.program.clone(),
        config.launcher.args.clone(),
        personas,
    );
    let launched = launcher
        .launch(&LaunchRequest {
            agent_id,
            persona_id: args.persona.clone(),
            description: args.description,
            working_directory: base_dir.display().to_string(),
            model: args.model,
            worktree_name: args.worktree,
            yolo: args.yolo,
        })
        .await;

    match launched {
        Ok(process) => {
            registry.mark_running(agent_id, process.process_id).await?;
            println!("Launched {} agent {} (pid {})", args.persona, agent_id, process.process_id);
        }
        Err(e) => {
            registry.stop(agent_id).await?;
            logger.stop(Duration::from_secs(5)).await;
            return Err(e.into());
        }
    }

    logger.stop(Duration::from_secs(5)).await;
    buses.dispose_all();
    Ok(())
}
