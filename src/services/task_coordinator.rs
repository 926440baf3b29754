//! Task coordinator: creation, blocking dispatch, and completion reporting.
//!
//! Dispatch gives each task to at most one agent. Selection order per
//! evaluation:
//!   1. the caller's in-progress task, returned as-is (sticky progress);
//!   2. the best pending task pinned to the caller;
//!   3. the best unpinned pending task routed to the caller's persona;
//!   4. otherwise wait for a matching `Created` event, then re-evaluate.
//! The claim itself is a conditional update; losing the race re-runs
//! selection. The subscription is opened before the first evaluation so a
//! creation racing the subscribe is never missed.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::{TaskEvent, TaskEventKind};
use crate::domain::models::{Agent, Task, TaskPriority, TaskStatus};
use crate::domain::ports::{AgentRepository, FinalizeOutcome, TaskRepository};
use crate::services::event_bus::{EventBus, EventFilter, Subscription};

/// Reserved prefix for the re-query sentinel returned on dispatch timeout.
/// Real task ids are UUIDs and can never contain a colon, so the sentinel
/// cannot collide with one.
pub const REQUERY_PREFIX: &str = "system:requery:";

/// Parameters for creating a task.
#[derive(Debug, Clone)]
pub struct NewTaskRequest {
    /// Pin the task to one agent. The persona tag is still required.
    pub agent_id: Option<Uuid>,
    pub persona_id: String,
    pub description: String,
    pub priority: TaskPriority,
}

/// A task handed to a caller by `get_next`.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedTask {
    pub task_id: Uuid,
    pub description: String,
    pub persona_id: String,
}

/// Result of a `get_next` long poll.
#[derive(Debug, Clone, PartialEq)]
pub enum GetNextOutcome {
    Task(DispatchedTask),
    /// Nothing matched within the wait window. The sentinel is a fresh
    /// `system:requery:` token the caller can treat as a task id.
    TimedOut { requery_id: String },
    Cancelled,
}

pub struct TaskCoordinator {
    tasks: Arc<dyn TaskRepository>,
    agents: Arc<dyn AgentRepository>,
    bus: Arc<EventBus<TaskEvent>>,
    clock: Arc<dyn crate::domain::ports::Clock>,
}

impl TaskCoordinator {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        agents: Arc<dyn AgentRepository>,
        bus: Arc<EventBus<TaskEvent>>,
        clock: Arc<dyn crate::domain::ports::Clock>,
    ) -> Self {
        Self { tasks, agents, bus, clock }
    }

    /// Create a pending task and announce it. A pinned task requires the
    /// target agent to exist and be `Starting` or `Running`.
    pub async fn create(&self, request: NewTaskRequest) -> DomainResult<Uuid> {
        if request.persona_id.trim().is_empty() {
            return Err(DomainError::InvalidArgument("persona_id must not be empty".into()));
        }
        if request.description.trim().is_empty() {
            return Err(DomainError::InvalidArgument("description must not be empty".into()));
        }

        if let Some(agent_id) = request.agent_id {
            let agent = self
                .agents
                .get(agent_id)
                .await?
                .ok_or(DomainError::AgentNotFound(agent_id))?;
            if !agent.is_eligible_for_tasks() {
                return Err(DomainError::AgentNotEligible {
                    id: agent_id,
                    status: agent.status.as_str().to_string(),
                });
            }
        }

        let now = self.clock.now();
        let task = Task::new(
            request.agent_id,
            request.persona_id,
            request.description,
            request.priority,
            now,
        );
        let task_id = task.id;
        let agent_id = task.agent_id;
        let persona_id = task.persona_id.clone();

        self.tasks.insert(&task).await?;
        self.publish(TaskEvent::created(task_id, agent_id, persona_id, now));

        Ok(task_id)
    }

    /// Return one task for the caller, waiting up to `wait_up_to` for one to
    /// appear. See the module docs for the selection order.
    pub async fn get_next(
        &self,
        agent_id: Uuid,
        wait_up_to: Duration,
        token: &CancellationToken,
    ) -> DomainResult<GetNextOutcome> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(DomainError::AgentNotFound(agent_id))?;

        // Subscribe before the first selection pass so a task created
        // between evaluation and wait is still seen.
        let subscription_token = token.child_token();
        let persona = agent.persona_id.clone();
        let filter = EventFilter::for_kinds([TaskEventKind::Created]).with_predicate(
            move |event: &TaskEvent| {
                event.payload.agent_id == Some(agent_id)
                    || (event.payload.agent_id.is_none()
                        && event.payload.persona_id.as_deref() == Some(persona.as_str()))
            },
        );
        let subscription = self.bus.subscribe(filter, &subscription_token);

        let outcome = self.dispatch_loop(&agent, wait_up_to, token, subscription).await;
        subscription_token.cancel();
        outcome
    }

    async fn dispatch_loop(
        &self,
        agent: &Agent,
        wait_up_to: Duration,
        token: &CancellationToken,
        mut subscription: Subscription<TaskEvent>,
    ) -> DomainResult<GetNextOutcome> {
        let deadline = tokio::time::Instant::now() + wait_up_to;

        loop {
            if let Some(task) = self.try_select(agent).await? {
                return Ok(GetNextOutcome::Task(DispatchedTask {
                    task_id: task.id,
                    description: task.description,
                    persona_id: task.persona_id,
                }));
            }

            tokio::select! {
                () = token.cancelled() => return Ok(GetNextOutcome::Cancelled),
                () = tokio::time::sleep_until(deadline) => {
                    return Ok(GetNextOutcome::TimedOut { requery_id: requery_token() });
                }
                event = subscription.recv() => {
                    // The event is only a hint; the claim still races in
                    // the next selection pass.
                    if event.is_none() {
                        return Err(DomainError::BusDisposed);
                    }
                }
            }
        }
    }

    /// One selection pass: sticky in-progress first, then claim attempts in
    /// priority order. Lost claim races restart the pass.
    async fn try_select(&self, agent: &Agent) -> DomainResult<Option<Task>> {
        loop {
            if let Some(task) = self.tasks.find_in_progress_for_agent(agent.id).await? {
                return Ok(Some(task));
            }

            let candidate = match self.tasks.find_pending_for_agent(agent.id).await? {
                Some(task) => Some(task),
                None => self.tasks.find_pending_for_persona(&agent.persona_id).await?,
            };

            let Some(mut task) = candidate else {
                return Ok(None);
            };

            let now = self.clock.now();
            if self.tasks.claim(task.id, agent.id, now).await? {
                task.agent_id = Some(agent.id);
                task.status = TaskStatus::InProgress;
                task.claimed_at = Some(now);
                task.started_at = Some(now);
                self.publish(TaskEvent::claimed(task.id, agent.id, now));
                return Ok(Some(task));
            }
            // Lost the race; re-run selection.
        }
    }

    /// `{Pending, InProgress} → Completed`.
    pub async fn report_completion(&self, task_id: Uuid, result: &str) -> DomainResult<()> {
        self.finalize(task_id, TaskStatus::Completed, result).await
    }

    /// `{Pending, InProgress} → Failed`. The error message becomes `result`.
    pub async fn report_failure(&self, task_id: Uuid, error_message: &str) -> DomainResult<()> {
        self.finalize(task_id, TaskStatus::Failed, error_message).await
    }

    async fn finalize(&self, task_id: Uuid, status: TaskStatus, result: &str) -> DomainResult<()> {
        let now = self.clock.now();
        match self.tasks.finalize(task_id, status, result, now).await? {
            FinalizeOutcome::Applied => {
                let agent_id = self.tasks.get(task_id).await?.and_then(|t| t.agent_id);
                let event = match status {
                    TaskStatus::Completed => TaskEvent::completed(task_id, agent_id, now),
                    _ => TaskEvent::failed(task_id, agent_id, result, now),
                };
                self.publish(event);
                Ok(())
            }
            FinalizeOutcome::AlreadyTerminal => Err(DomainError::AlreadyTerminal(task_id)),
            FinalizeOutcome::NotFound => Err(DomainError::TaskNotFound(task_id)),
        }
    }

    // Read-only queries backing the tool surface.

    pub async fn get_task(&self, task_id: Uuid) -> DomainResult<Option<Task>> {
        self.tasks.get(task_id).await
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
        self.tasks.list_by_status(status).await
    }

    pub async fn tasks_by_agent(&self, agent_id: Uuid) -> DomainResult<Vec<Task>> {
        self.tasks.list_by_agent(agent_id).await
    }

    pub async fn tasks_by_agent_and_status(
        &self,
        agent_id: Uuid,
        status: TaskStatus,
    ) -> DomainResult<Vec<Task>> {
        self.tasks.list_by_agent_and_status(agent_id, status).await
    }

    fn publish(&self, event: TaskEvent) {
        if let Err(error) = self.bus.publish(event) {
            tracing::warn!(%error, "task event dropped");
        }
    }
}

fn requery_token() -> String {
    format!("{REQUERY_PREFIX}{}", Uuid::new_v4())
}
