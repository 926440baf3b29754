//! Heartbeat monitor: periodic sweep that force-kills unresponsive agents.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{AgentRepository, Clock};
use crate::services::agent_registry::AgentRegistry;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// A running agent whose last heartbeat is older than this is killed.
    pub heartbeat_timeout: Duration,
    /// Time between sweeps.
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(300),
            check_interval: Duration::from_secs(60),
        }
    }
}

pub struct AgentMonitor {
    registry: Arc<AgentRegistry>,
    repository: Arc<dyn AgentRepository>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
}

impl AgentMonitor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        repository: Arc<dyn AgentRepository>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Self {
        Self { registry, repository, clock, config }
    }

    /// Sweep loop. Stops at the next iteration boundary after cancellation.
    pub async fn run(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.sweep_once().await {
                Ok(0) => {}
                Ok(killed) => tracing::info!(killed, "heartbeat sweep killed unresponsive agents"),
                Err(error) => tracing::warn!(%error, "heartbeat sweep failed"),
            }
        }
    }

    /// One sweep: kill every running agent past the heartbeat deadline.
    /// A failure on one agent does not stop the sweep.
    pub async fn sweep_once(&self) -> DomainResult<usize> {
        let timeout = chrono::Duration::milliseconds(self.config.heartbeat_timeout.as_millis() as i64);
        let cutoff = self.clock.now() - timeout;

        let stale = self.repository.list_running_stale(cutoff).await?;
        let mut killed = 0;
        for agent in stale {
            match self.registry.kill(agent.id, Some("heartbeat timeout".to_string())).await {
                Ok(()) => killed += 1,
                Err(error) => {
                    tracing::warn!(agent_id = %agent.id, %error, "failed to kill unresponsive agent");
                }
            }
        }
        Ok(killed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentRepository};
    use crate::domain::events::AgentEvent;
    use crate::domain::models::{AgentStatus, RegisterAgentRequest};
    use crate::domain::ports::{ManualClock, ProcessTerminator};
    use crate::services::event_bus::EventBus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTerminator(AtomicUsize);

    #[async_trait]
    impl ProcessTerminator for CountingTerminator {
        async fn kill(&self, _process_id: u32) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn sweep_kills_only_agents_past_the_deadline() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repository = Arc::new(SqliteAgentRepository::new(pool));
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let terminator = Arc::new(CountingTerminator(AtomicUsize::new(0)));
        let bus = Arc::new(EventBus::<AgentEvent>::new());

        let registry = Arc::new(AgentRegistry::new(
            repository.clone(),
            bus,
            clock.clone(),
            terminator.clone(),
        ));

        let request = |persona: &str| RegisterAgentRequest {
            persona_id: persona.to_string(),
            working_directory: "/tmp/w".to_string(),
            model: None,
            worktree_name: None,
        };

        // Stale agent: running, heartbeat at T.
        let stale_id = registry.register(request("implementer")).await.unwrap();
        registry.mark_running(stale_id, 1234).await.unwrap();
        registry.heartbeat(stale_id).await.unwrap();

        // Fresh agent heartbeats after the clock advances.
        let fresh_id = registry.register(request("reviewer")).await.unwrap();
        registry.mark_running(fresh_id, 5678).await.unwrap();

        clock.advance(chrono::Duration::minutes(10));
        registry.heartbeat(fresh_id).await.unwrap();

        let monitor = AgentMonitor::new(
            registry.clone(),
            repository.clone(),
            clock.clone(),
            MonitorConfig {
                heartbeat_timeout: Duration::from_secs(300),
                check_interval: Duration::from_secs(60),
            },
        );

        let killed = monitor.sweep_once().await.unwrap();
        assert_eq!(killed, 1);
        assert_eq!(terminator.0.load(Ordering::SeqCst), 1);

        let stale = registry.get(stale_id).await.unwrap().unwrap();
        assert_eq!(stale.status, AgentStatus::Killed);
        let fresh = registry.get(fresh_id).await.unwrap().unwrap();
        assert_eq!(fresh.status, AgentStatus::Running);

        // Idempotent: the killed agent is no longer Running, so a second
        // sweep finds nothing.
        assert_eq!(monitor.sweep_once().await.unwrap(), 0);
    }
}
