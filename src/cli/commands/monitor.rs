//! `aiswarm monitor`: run the heartbeat sweep loop in the foreground.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::adapters::sqlite::{
    initialize_database, SqliteAgentRepository, SqliteEventLogRepository,
};
use crate::adapters::SignalTerminator;
use crate::domain::ports::{Clock, SystemClock};
use crate::services::{AgentMonitor, AgentRegistry, Config, EventBuses, EventLogger};

pub async fn handle_monitor(base_dir: &Path, config: Config) -> Result<()> {
    let pool = initialize_database(&config.database_url(base_dir))
        .await
        .context("Failed to open coordination database")?;

    let buses = Arc::new(EventBuses::new());
    let mut logger = EventLogger::new(
        Arc::new(SqliteEventLogRepository::new(pool.clone())),
        Arc::clone(&buses),
    );
    logger.start();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let agent_repo = Arc::new(SqliteAgentRepository::new(pool));
    let registry = Arc::new(AgentRegistry::new(
        agent_repo.clone(),
        Arc::clone(&buses.agent),
        Arc::clone(&clock),
        Arc::new(SignalTerminator),
    ));

    let monitor = AgentMonitor::new(registry, agent_repo, clock, config.monitor.to_monitor_config());
    let token = CancellationToken::new();

    println!(
        "Monitoring agents (timeout {}s, interval {}s). Ctrl-C to stop.",
        config.monitor.heartbeat_timeout_secs, config.monitor.check_interval_secs
    );

    tokio::select! {
        () = monitor.run(token.child_token()) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    token.cancel();
    logger.stop(Duration::from_secs(5)).await;
    buses.dispose_all();
    Ok(())
}
