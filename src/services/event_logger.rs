//! Audit logger: subscribes to every bus and appends each envelope to the
//! `event_logs` table.
//!
//! Best-effort by design: a failed write is logged out-of-band and the event
//! dropped, so publishers are never blocked on audit persistence. Must be
//! started before any component publishes so no event escapes the audit log.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::events::BusEvent;
use crate::domain::ports::EventLogRepository;
use crate::services::event_bus::{EventFilter, Subscription};
use crate::services::EventBuses;

pub struct EventLogger {
    repository: Arc<dyn EventLogRepository>,
    buses: Arc<EventBuses>,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl EventLogger {
    pub fn new(repository: Arc<dyn EventLogRepository>, buses: Arc<EventBuses>) -> Self {
        Self {
            repository,
            buses,
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Subscribe to all buses for all event kinds and begin draining.
    pub fn start(&mut self) {
        let task_sub = self.buses.task.subscribe(EventFilter::all(), &self.token);
        let agent_sub = self.buses.agent.subscribe(EventFilter::all(), &self.token);
        let memory_sub = self.buses.memory.subscribe(EventFilter::all(), &self.token);

        self.handles.push(drain(task_sub, Arc::clone(&self.repository)));
        self.handles.push(drain(agent_sub, Arc::clone(&self.repository)));
        self.handles.push(drain(memory_sub, Arc::clone(&self.repository)));
    }

    /// Stop accepting new envelopes and drain in-flight ones within the
    /// deadline. Tasks still running after the deadline are aborted.
    pub async fn stop(mut self, drain_deadline: Duration) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(drain_deadline, handle).await.is_err() {
                tracing::warn!("event logger drain exceeded deadline; aborting");
                abort.abort();
            }
        }
    }
}

fn drain<E: BusEvent>(
    mut subscription: Subscription<E>,
    repository: Arc<dyn EventLogRepository>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let entry = event.to_log_entry();
            if let Err(error) = repository.append(&entry).await {
                tracing::warn!(
                    event_type = %entry.event_type,
                    %error,
                    "failed to persist audit event; dropping"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteEventLogRepository};
    use crate::domain::events::{AgentEvent, MemoryEvent, MemoryEventKind, TaskEvent};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn logs_events_from_all_buses() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repository = Arc::new(SqliteEventLogRepository::new(pool));
        let buses = Arc::new(EventBuses::new());

        let mut logger = EventLogger::new(repository.clone(), buses.clone());
        logger.start();

        buses
            .task
            .publish(TaskEvent::created(Uuid::new_v4(), None, "implementer", Utc::now()))
            .unwrap();
        buses
            .agent
            .publish(AgentEvent::registered(Uuid::new_v4(), "implementer", Utc::now()))
            .unwrap();
        buses
            .memory
            .publish(MemoryEvent::new(
                MemoryEventKind::Created,
                "",
                "k",
                "v",
                "json",
                None,
                Utc::now(),
            ))
            .unwrap();

        logger.stop(Duration::from_secs(5)).await;

        use crate::domain::ports::EventLogRepository as _;
        let rows = repository.list_recent(10).await.unwrap();
        let mut types: Vec<_> = rows.iter().map(|r| r.event_type.clone()).collect();
        types.sort();
        assert_eq!(types, ["agent.registered", "memory.created", "task.created"]);
    }
}
