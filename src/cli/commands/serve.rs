//! `aiswarm serve`: run the MCP coordination server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::adapters::mcp::StdioServer;
use crate::adapters::sqlite::{
    initialize_database, SqliteAgentRepository, SqliteEventLogRepository, SqliteMemoryRepository,
    SqliteTaskRepository,
};
use crate::adapters::{PersonaCatalog, ProcessLauncher, SignalTerminator};
use crate::domain::ports::{Clock, SystemClock};
use crate::services::{
    AgentMonitor, AgentRegistry, Config, EventBuses, EventLogger, MemoryStore, TaskCoordinator,
};

pub async fn handle_serve(base_dir: &Path, config: Config) -> Result<()> {
    let pool = initialize_database(&config.database_url(base_dir))
        .await
        .context("Failed to open coordination database")?;

    let buses = Arc::new(EventBuses::new());

    // The audit logger subscribes before anything can publish.
    let event_log_repo = Arc::new(SqliteEventLogRepository::new(pool.clone()));
    let mut logger = EventLogger::new(event_log_repo, Arc::clone(&buses));
    logger.start();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let memory_repo = Arc::new(SqliteMemoryRepository::new(pool));

    let registry = Arc::new(AgentRegistry::new(
        agent_repo.clone(),
        Arc::clone(&buses.agent),
        Arc::clone(&clock),
        Arc::new(SignalTerminator),
    ));
    let coordinator = Arc::new(TaskCoordinator::new(
        task_repo,
        agent_repo.clone(),
        Arc::clone(&buses.task),
        Arc::clone(&clock),
    ));
    let memory = Arc::new(MemoryStore::new(
        memory_repo,
        Arc::clone(&buses.memory),
        Arc::clone(&clock),
    ));

    let personas = Arc::new(PersonaCatalog::with_overrides(base_dir.join(".aiswarm").join("personas")));
    let launcher = Arc::new(ProcessLauncher::new(
        config.launcher.program.clone(),
        config.launcher.args.clone(),
        personas,
    ));

    let shutdown = CancellationToken::new();

    let monitor = AgentMonitor::new(
        Arc::clone(&registry),
        agent_repo,
        clock,
        config.monitor.to_monitor_config(),
    );
    let monitor_token = shutdown.child_token();
    let monitor_handle = tokio::spawn(async move { monitor.run(monitor_token).await });

    let server = Arc::new(StdioServer::new(
        registry,
        coordinator,
        memory,
        launcher,
        base_dir.display().to_string(),
        Duration::from_millis(config.dispatch.default_wait_millis),
        shutdown.clone(),
    ));

    tokio::select! {
        result = Arc::clone(&server).run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received; shutting down"),
    }

    // Teardown order: publishers stop, the logger drains, buses dispose.
    shutdown.cancel();
    let _ = monitor_handle.await;
    logger.stop(Duration::from_millis(config.dispatch.logger_drain_millis)).await;
    buses.dispose_all();

    Ok(())
}
