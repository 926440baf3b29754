//! Repository port for agent persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, AgentStatus};

/// Outcome of a conditional status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The row was updated.
    Applied,
    /// The precondition no longer held; nothing changed.
    NotApplied,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn insert(&self, agent: &Agent) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>>;

    /// List agents, optionally filtered by persona tag.
    async fn list(&self, persona_filter: Option<&str>) -> DomainResult<Vec<Agent>>;

    /// Update `last_heartbeat`. Returns false when the agent is unknown.
    async fn touch_heartbeat(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool>;

    /// `Starting → Running`, conditionally: only applies while the row is
    /// still `Starting`.
    async fn mark_running(
        &self,
        id: Uuid,
        process_id: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome>;

    /// Transition to a terminal status, conditionally: only applies while
    /// the row is non-terminal. Sets `stopped_at`.
    async fn transition_terminal(
        &self,
        id: Uuid,
        status: AgentStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome>;

    /// Running agents whose `last_heartbeat` is strictly before `cutoff`.
    async fn list_running_stale(&self, cutoff: DateTime<Utc>) -> DomainResult<Vec<Agent>>;
}
