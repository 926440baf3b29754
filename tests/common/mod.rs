//! Shared test harness: a fully wired coordination stack on an in-memory
//! database, with a manual clock and a recording terminator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use aiswarm::adapters::sqlite::{
    create_migrated_test_pool, SqliteAgentRepository, SqliteEventLogRepository,
    SqliteMemoryRepository, SqliteTaskRepository,
};
use aiswarm::domain::models::RegisterAgentRequest;
use aiswarm::domain::ports::{Clock, ManualClock, ProcessTerminator};
use aiswarm::services::{
    AgentMonitor, AgentRegistry, EventBuses, EventLogger, MemoryStore, MonitorConfig,
    TaskCoordinator,
};

/// Terminator that records every pid it was asked to kill.
pub struct RecordingTerminator {
    calls: Mutex<Vec<u32>>,
}

impl RecordingTerminator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessTerminator for RecordingTerminator {
    async fn kill(&self, process_id: u32) -> bool {
        self.calls.lock().unwrap().push(process_id);
        true
    }
}

pub struct Harness {
    pub buses: Arc<EventBuses>,
    pub clock: Arc<ManualClock>,
    pub terminator: Arc<RecordingTerminator>,
    pub registry: Arc<AgentRegistry>,
    pub coordinator: Arc<TaskCoordinator>,
    pub memory: Arc<MemoryStore>,
    pub agent_repo: Arc<SqliteAgentRepository>,
    pub event_logs: Arc<SqliteEventLogRepository>,
    logger: Option<EventLogger>,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool().await.expect("test pool");
        let buses = Arc::new(EventBuses::new());

        // Audit logging starts before anything can publish.
        let event_logs = Arc::new(SqliteEventLogRepository::new(pool.clone()));
        let mut logger = EventLogger::new(event_logs.clone(), Arc::clone(&buses));
        logger.start();

        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let terminator = RecordingTerminator::new();

        let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let memory_repo = Arc::new(SqliteMemoryRepository::new(pool));

        let registry = Arc::new(AgentRegistry::new(
            agent_repo.clone(),
            Arc::clone(&buses.agent),
            Arc::clone(&clock_dyn),
            terminator.clone(),
        ));
        let coordinator = Arc::new(TaskCoordinator::new(
            task_repo,
            agent_repo.clone(),
            Arc::clone(&buses.task),
            Arc::clone(&clock_dyn),
        ));
        let memory = Arc::new(MemoryStore::new(
            memory_repo,
            Arc::clone(&buses.memory),
            clock_dyn,
        ));

        Self {
            buses,
            clock,
            terminator,
            registry,
            coordinator,
            memory,
            agent_repo,
            event_logs,
            logger: Some(logger),
        }
    }

    /// Register an agent and mark it running with the given pid.
    pub async fn register_running(&self, persona: &str, pid: u32) -> Uuid {
        let agent_id = self
            .registry
            .register(RegisterAgentRequest {
                persona_id: persona.to_string(),
                working_directory: "/tmp/swarm".to_string(),
                model: None,
                worktree_name: None,
            })
            .await
            .expect("register");
        self.registry.mark_running(agent_id, pid).await.expect("mark running");
        agent_id
    }

    pub fn monitor(&self, heartbeat_timeout: Duration) -> AgentMonitor {
        AgentMonitor::new(
            Arc::clone(&self.registry),
            self.agent_repo.clone(),
            self.clock.clone(),
            MonitorConfig { heartbeat_timeout, check_interval: Duration::from_secs(60) },
        )
    }

    /// Drain and stop the audit logger so `event_logs` reflects everything
    /// published so far.
    pub async fn drain_audit_log(&mut self) {
        if let Some(logger) = self.logger.take() {
            logger.stop(Duration::from_secs(5)).await;
        }
    }
}
