//! Agent domain model.
//!
//! An agent is a long-running external process registered against a persona
//! tag. Agents are never deleted; terminal rows are retained for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered but not yet confirmed running.
    Starting,
    /// Process is up and heartbeating.
    Running,
    /// Shut down gracefully.
    Stopped,
    /// Forcefully terminated (by request or heartbeat sweep).
    Killed,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Starting
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Killed => "killed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Killed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [AgentStatus] {
        match self {
            Self::Starting => &[Self::Running, Self::Stopped, Self::Killed],
            Self::Running => &[Self::Stopped, Self::Killed],
            Self::Stopped => &[],
            Self::Killed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// A registered agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    /// Routing tag, e.g. `"implementer"`. Short string, never persona prose.
    pub persona_id: String,
    pub working_directory: String,
    pub model: Option<String>,
    pub worktree_name: Option<String>,
    pub process_id: Option<u32>,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Create a new agent in `Starting` status with `last_heartbeat`
    /// initialized to the registration time.
    pub fn register(request: RegisterAgentRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona_id: request.persona_id,
            working_directory: request.working_directory,
            model: request.model,
            worktree_name: request.worktree_name,
            process_id: None,
            status: AgentStatus::Starting,
            registered_at: now,
            started_at: None,
            last_heartbeat: now,
            stopped_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the agent may receive new work.
    pub fn is_eligible_for_tasks(&self) -> bool {
        matches!(self.status, AgentStatus::Starting | AgentStatus::Running)
    }
}

/// Parameters for registering a new agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    pub persona_id: String,
    pub working_directory: String,
    pub model: Option<String>,
    pub worktree_name: Option<String>,
}
