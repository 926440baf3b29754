//! Agent registry: registration, liveness, and lifecycle transitions.
//!
//! Every mutation commits to the store before the matching event is
//! published. Terminator failures never block a kill transition; database
//! conflicts are retried once.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::AgentEvent;
use crate::domain::models::{Agent, AgentStatus, RegisterAgentRequest};
use crate::domain::ports::{AgentRepository, Clock, ProcessTerminator, TransitionOutcome};
use crate::services::event_bus::EventBus;

pub struct AgentRegistry {
    repository: Arc<dyn AgentRepository>,
    bus: Arc<EventBus<AgentEvent>>,
    clock: Arc<dyn Clock>,
    terminator: Arc<dyn ProcessTerminator>,
}

impl AgentRegistry {
    pub fn new(
        repository: Arc<dyn AgentRepository>,
        bus: Arc<EventBus<AgentEvent>>,
        clock: Arc<dyn Clock>,
        terminator: Arc<dyn ProcessTerminator>,
    ) -> Self {
        Self { repository, bus, clock, terminator }
    }

    /// Create an agent in `Starting` status and announce it.
    pub async fn register(&self, request: RegisterAgentRequest) -> DomainResult<Uuid> {
        if request.persona_id.trim().is_empty() {
            return Err(DomainError::InvalidArgument("persona_id must not be empty".into()));
        }
        if request.working_directory.trim().is_empty() {
            return Err(DomainError::InvalidArgument("working_directory must not be empty".into()));
        }

        let now = self.clock.now();
        let agent = Agent::register(request, now);
        let persona = agent.persona_id.clone();
        let agent_id = agent.id;

        retry_once(|| self.repository.insert(&agent)).await?;
        self.publish(AgentEvent::registered(agent_id, persona, now));

        Ok(agent_id)
    }

    pub async fn get(&self, agent_id: Uuid) -> DomainResult<Option<Agent>> {
        self.repository.get(agent_id).await
    }

    pub async fn list(&self, persona_filter: Option<&str>) -> DomainResult<Vec<Agent>> {
        self.repository.list(persona_filter).await
    }

    /// `Starting → Running`. Idempotent when already running (no event).
    pub async fn mark_running(&self, agent_id: Uuid, process_id: u32) -> DomainResult<()> {
        let agent = self.require(agent_id).await?;

        match agent.status {
            AgentStatus::Running => Ok(()),
            AgentStatus::Starting => {
                let now = self.clock.now();
                let outcome =
                    retry_once(|| self.repository.mark_running(agent_id, process_id, now)).await?;
                match outcome {
                    TransitionOutcome::Applied => {
                        self.publish(AgentEvent::status_changed(
                            agent_id,
                            AgentStatus::Starting,
                            AgentStatus::Running,
                            now,
                        ));
                        Ok(())
                    }
                    // Lost a race with a concurrent transition; running now
                    // means someone else did the work.
                    TransitionOutcome::NotApplied => match self.require(agent_id).await?.status {
                        AgentStatus::Running => Ok(()),
                        status => Err(DomainError::AgentNotEligible {
                            id: agent_id,
                            status: status.as_str().to_string(),
                        }),
                    },
                }
            }
            status => Err(DomainError::AgentNotEligible {
                id: agent_id,
                status: status.as_str().to_string(),
            }),
        }
    }

    /// Update liveness. Returns false for an unknown agent, with no side
    /// effects.
    pub async fn heartbeat(&self, agent_id: Uuid) -> DomainResult<bool> {
        self.repository.touch_heartbeat(agent_id, self.clock.now()).await
    }

    /// Graceful shutdown. No-op on a terminal agent.
    pub async fn stop(&self, agent_id: Uuid) -> DomainResult<()> {
        let agent = self.require(agent_id).await?;
        if agent.is_terminal() {
            return Ok(());
        }

        let now = self.clock.now();
        let outcome = retry_once(|| {
            self.repository.transition_terminal(agent_id, AgentStatus::Stopped, now)
        })
        .await?;

        if outcome == TransitionOutcome::Applied {
            self.publish(AgentEvent::status_changed(agent_id, agent.status, AgentStatus::Stopped, now));
        }
        Ok(())
    }

    /// Forced termination. Kills the OS process best-effort, then transitions
    /// to `Killed`. No-op (and no event) on a terminal agent. Tasks owned by
    /// the agent are left in place.
    pub async fn kill(&self, agent_id: Uuid, reason: Option<String>) -> DomainResult<()> {
        let agent = self.require(agent_id).await?;
        if agent.is_terminal() {
            return Ok(());
        }

        if let Some(process_id) = agent.process_id {
            if !self.terminator.kill(process_id).await {
                tracing::warn!(%agent_id, process_id, "terminator failed; proceeding with status update");
            }
        }

        let now = self.clock.now();
        let outcome = retry_once(|| {
            self.repository.transition_terminal(agent_id, AgentStatus::Killed, now)
        })
        .await?;

        if outcome == TransitionOutcome::Applied {
            self.publish(AgentEvent::killed(agent_id, reason, now));
        }
        Ok(())
    }

    async fn require(&self, agent_id: Uuid) -> DomainResult<Agent> {
        self.repository
            .get(agent_id)
            .await?
            .ok_or(DomainError::AgentNotFound(agent_id))
    }

    fn publish(&self, event: AgentEvent) {
        if let Err(error) = self.bus.publish(event) {
            tracing::warn!(%error, "agent event dropped");
        }
    }
}

/// Retry a store write once on a concurrency conflict.
async fn retry_once<T, F, Fut>(op: F) -> DomainResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DomainResult<T>>,
{
    match op().await {
        Err(DomainError::ConcurrencyConflict { .. }) => op().await,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentRepository};
    use crate::domain::events::AgentEventKind;
    use crate::domain::ports::SystemClock;
    use crate::services::event_bus::EventFilter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct RecordingTerminator {
        calls: AtomicUsize,
        succeed: bool,
    }

    impl RecordingTerminator {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), succeed })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessTerminator for RecordingTerminator {
        async fn kill(&self, _process_id: u32) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    async fn setup(terminator: Arc<RecordingTerminator>) -> (AgentRegistry, Arc<EventBus<AgentEvent>>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let bus = Arc::new(EventBus::new());
        let registry = AgentRegistry::new(
            Arc::new(SqliteAgentRepository::new(pool)),
            bus.clone(),
            Arc::new(SystemClock),
            terminator,
        );
        (registry, bus)
    }

    fn request() -> RegisterAgentRequest {
        RegisterAgentRequest {
            persona_id: "implementer".to_string(),
            working_directory: "/tmp/work".to_string(),
            model: None,
            worktree_name: None,
        }
    }

    #[tokio::test]
    async fn register_emits_registered_event() {
        let (registry, bus) = setup(RecordingTerminator::new(true)).await;
        let token = CancellationToken::new();
        let mut sub = bus.subscribe(EventFilter::all(), &token);

        let agent_id = registry.register(request()).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, AgentEventKind::Registered);
        assert_eq!(event.payload.agent_id, agent_id);
        assert_eq!(event.payload.persona.as_deref(), Some("implementer"));
    }

    #[tokio::test]
    async fn register_rejects_empty_persona() {
        let (registry, _bus) = setup(RecordingTerminator::new(true)).await;
        let mut bad = request();
        bad.persona_id = "  ".to_string();
        assert!(matches!(
            registry.register(bad).await,
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn mark_running_is_idempotent_without_second_event() {
        let (registry, bus) = setup(RecordingTerminator::new(true)).await;
        let token = CancellationToken::new();
        let mut sub = bus.subscribe(EventFilter::for_kinds([AgentEventKind::StatusChanged]), &token);

        let agent_id = registry.register(request()).await.unwrap();
        registry.mark_running(agent_id, 1234).await.unwrap();
        registry.mark_running(agent_id, 1234).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.payload.old_status, Some(AgentStatus::Starting));
        assert_eq!(event.payload.new_status, Some(AgentStatus::Running));

        // Only the first transition produced an event.
        token.cancel();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn heartbeat_unknown_agent_returns_false() {
        let (registry, _bus) = setup(RecordingTerminator::new(true)).await;
        assert!(!registry.heartbeat(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn kill_invokes_terminator_and_is_idempotent() {
        let terminator = RecordingTerminator::new(true);
        let (registry, bus) = setup(terminator.clone()).await;
        let token = CancellationToken::new();
        let mut sub = bus.subscribe(EventFilter::for_kinds([AgentEventKind::Killed]), &token);

        let agent_id = registry.register(request()).await.unwrap();
        registry.mark_running(agent_id, 4321).await.unwrap();

        registry.kill(agent_id, Some("test".into())).await.unwrap();
        assert_eq!(terminator.call_count(), 1);

        let agent = registry.get(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Killed);
        assert!(agent.stopped_at.is_some());

        // Second kill: no terminator call, no event.
        registry.kill(agent_id, None).await.unwrap();
        assert_eq!(terminator.call_count(), 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.payload.agent_id, agent_id);
        token.cancel();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn terminator_failure_does_not_block_kill() {
        let terminator = RecordingTerminator::new(false);
        let (registry, _bus) = setup(terminator.clone()).await;

        let agent_id = registry.register(request()).await.unwrap();
        registry.mark_running(agent_id, 77).await.unwrap();
        registry.kill(agent_id, None).await.unwrap();

        assert_eq!(terminator.call_count(), 1);
        let agent = registry.get(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Killed);
    }

    #[tokio::test]
    async fn stop_is_noop_on_terminal_agent() {
        let (registry, _bus) = setup(RecordingTerminator::new(true)).await;
        let agent_id = registry.register(request()).await.unwrap();
        registry.kill(agent_id, None).await.unwrap();
        registry.stop(agent_id).await.unwrap();

        let agent = registry.get(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Killed);
    }
}
