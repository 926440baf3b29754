//! Typed event envelopes for the three in-memory buses.
//!
//! Each family is a tagged envelope `{kind, timestamp, payload}`; the buses
//! are parameterized by family type rather than sharing one flat enum.
//! Envelopes are at-most-once and never survive a restart; the audit
//! conversion feeds the `event_logs` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{AgentStatus, EventLogEntry, EventSeverity};

/// Contract implemented by every event family carried on a bus.
pub trait BusEvent: Clone + Send + Sync + 'static {
    /// Kind discriminator used by subscription filters.
    type Kind: Copy + Eq + std::hash::Hash + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
    fn timestamp(&self) -> DateTime<Utc>;
    /// Audit row for the event logger.
    fn to_log_entry(&self) -> EventLogEntry;
}

// ---------------------------------------------------------------------------
// Task events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Claimed,
    Completed,
    Failed,
}

impl TaskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "task.created",
            Self::Claimed => "task.claimed",
            Self::Completed => "task.completed",
            Self::Failed => "task.failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEventPayload {
    pub task_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub persona_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: TaskEventPayload,
}

impl TaskEvent {
    pub fn created(
        task_id: Uuid,
        agent_id: Option<Uuid>,
        persona_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TaskEventKind::Created,
            timestamp,
            payload: TaskEventPayload {
                task_id,
                agent_id,
                persona_id: Some(persona_id.into()),
                reason: None,
            },
        }
    }

    pub fn claimed(task_id: Uuid, agent_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: TaskEventKind::Claimed,
            timestamp,
            payload: TaskEventPayload {
                task_id,
                agent_id: Some(agent_id),
                persona_id: None,
                reason: None,
            },
        }
    }

    pub fn completed(task_id: Uuid, agent_id: Option<Uuid>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: TaskEventKind::Completed,
            timestamp,
            payload: TaskEventPayload {
                task_id,
                agent_id,
                persona_id: None,
                reason: None,
            },
        }
    }

    pub fn failed(
        task_id: Uuid,
        agent_id: Option<Uuid>,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: TaskEventKind::Failed,
            timestamp,
            payload: TaskEventPayload {
                task_id,
                agent_id,
                persona_id: None,
                reason: Some(reason.into()),
            },
        }
    }
}

impl BusEvent for TaskEvent {
    type Kind = TaskEventKind;

    fn kind(&self) -> TaskEventKind {
        self.kind
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_log_entry(&self) -> EventLogEntry {
        let severity = match self.kind {
            TaskEventKind::Failed => EventSeverity::Warning,
            _ => EventSeverity::Info,
        };
        let payload = serde_json::to_string(&self.payload).unwrap_or_default();
        let mut entry = EventLogEntry::new(self.kind.as_str(), self.timestamp, severity, payload)
            .with_entity("task", self.payload.task_id.to_string());
        if let Some(agent_id) = self.payload.agent_id {
            entry = entry.with_actor(agent_id.to_string());
        }
        entry
    }
}

// ---------------------------------------------------------------------------
// Agent events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    Registered,
    Killed,
    StatusChanged,
}

impl AgentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "agent.registered",
            Self::Killed => "agent.killed",
            Self::StatusChanged => "agent.status_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEventPayload {
    pub agent_id: Uuid,
    pub persona: Option<String>,
    pub old_status: Option<AgentStatus>,
    pub new_status: Option<AgentStatus>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: AgentEventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: AgentEventPayload,
}

impl AgentEvent {
    pub fn registered(agent_id: Uuid, persona: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: AgentEventKind::Registered,
            timestamp,
            payload: AgentEventPayload {
                agent_id,
                persona: Some(persona.into()),
                old_status: None,
                new_status: Some(AgentStatus::Starting),
                reason: None,
            },
        }
    }

    pub fn killed(agent_id: Uuid, reason: Option<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: AgentEventKind::Killed,
            timestamp,
            payload: AgentEventPayload {
                agent_id,
                persona: None,
                old_status: None,
                new_status: Some(AgentStatus::Killed),
                reason,
            },
        }
    }

    pub fn status_changed(
        agent_id: Uuid,
        old_status: AgentStatus,
        new_status: AgentStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: AgentEventKind::StatusChanged,
            timestamp,
            payload: AgentEventPayload {
                agent_id,
                persona: None,
                old_status: Some(old_status),
                new_status: Some(new_status),
                reason: None,
            },
        }
    }
}

impl BusEvent for AgentEvent {
    type Kind = AgentEventKind;

    fn kind(&self) -> AgentEventKind {
        self.kind
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_log_entry(&self) -> EventLogEntry {
        let severity = match self.kind {
            AgentEventKind::Killed => EventSeverity::Warning,
            _ => EventSeverity::Info,
        };
        let payload = serde_json::to_string(&self.payload).unwrap_or_default();
        EventLogEntry::new(self.kind.as_str(), self.timestamp, severity, payload)
            .with_entity("agent", self.payload.agent_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Memory events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEventKind {
    Created,
    Updated,
    Deleted,
}

impl MemoryEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "memory.created",
            Self::Updated => "memory.updated",
            Self::Deleted => "memory.deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEventPayload {
    pub namespace: String,
    pub key: String,
    pub value: String,
    pub entry_type: String,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub kind: MemoryEventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: MemoryEventPayload,
}

impl MemoryEvent {
    pub fn new(
        kind: MemoryEventKind,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        entry_type: impl Into<String>,
        metadata: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            timestamp,
            payload: MemoryEventPayload {
                namespace: namespace.into(),
                key: key.into(),
                value: value.into(),
                entry_type: entry_type.into(),
                metadata,
            },
        }
    }

    /// Whether this event concerns the given `(namespace, key)` pair.
    pub fn matches_key(&self, namespace: &str, key: &str) -> bool {
        self.payload.namespace == namespace && self.payload.key == key
    }
}

impl BusEvent for MemoryEvent {
    type Kind = MemoryEventKind;

    fn kind(&self) -> MemoryEventKind {
        self.kind
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn to_log_entry(&self) -> EventLogEntry {
        let payload = serde_json::to_string(&self.payload).unwrap_or_default();
        let entity_id = format!("{}/{}", self.payload.namespace, self.payload.key);
        EventLogEntry::new(self.kind.as_str(), self.timestamp, EventSeverity::Debug, payload)
            .with_entity("memory", entity_id)
    }
}
