//! Repository port for task persistence.
//!
//! The claim is a conditional update; zero rows affected means the claim was
//! lost to a racing dispatcher and selection must re-run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};

/// Outcome of a terminal transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Applied,
    /// Task exists but is already terminal.
    AlreadyTerminal,
    NotFound,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &Task) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>>;

    async fn list_by_agent(&self, agent_id: Uuid) -> DomainResult<Vec<Task>>;

    async fn list_by_agent_and_status(
        &self,
        agent_id: Uuid,
        status: TaskStatus,
    ) -> DomainResult<Vec<Task>>;

    /// The in-progress task pinned to this agent, if any (sticky-progress
    /// rule; at most one exists per agent by construction).
    async fn find_in_progress_for_agent(&self, agent_id: Uuid) -> DomainResult<Option<Task>>;

    /// Best pending task pinned to this agent: highest priority first, then
    /// earliest `created_at`.
    async fn find_pending_for_agent(&self, agent_id: Uuid) -> DomainResult<Option<Task>>;

    /// Best unpinned pending task routed to this persona, same ordering.
    async fn find_pending_for_persona(&self, persona_id: &str) -> DomainResult<Option<Task>>;

    /// Atomically claim a pending task for an agent
    /// (`Pending → InProgress`, sets `agent_id`, `claimed_at`, `started_at`).
    /// Returns false when the conditional update affected zero rows.
    async fn claim(&self, task_id: Uuid, agent_id: Uuid, now: DateTime<Utc>) -> DomainResult<bool>;

    /// Transition to `Completed`/`Failed`, setting `result` and
    /// `completed_at`. Conditional on the task being non-terminal.
    async fn finalize(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<FinalizeOutcome>;
}
