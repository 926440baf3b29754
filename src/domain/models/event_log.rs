//! Event log domain model.
//!
//! Append-only audit rows written by the event logger. The table is for
//! inspection and post-crash replay, not for re-subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A single audit row in the `event_logs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Uuid,
    /// Dotted discriminator, e.g. `"task.claimed"`.
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub actor: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub severity: EventSeverity,
    pub tags: Option<String>,
    /// Serialized event payload.
    pub payload: String,
}

impl EventLogEntry {
    pub fn new(
        event_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        severity: EventSeverity,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp,
            actor: None,
            correlation_id: None,
            entity_id: None,
            entity_type: None,
            severity,
            tags: None,
            payload: payload.into(),
        }
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}
