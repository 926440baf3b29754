//! Domain errors for the aiswarm coordination system.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the coordination core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Agent {id} is not eligible: status is {status}")]
    AgentNotEligible { id: Uuid, status: String },

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),

    #[error("Lost claim race for task {0}")]
    LostRace(Uuid),

    #[error("Memory entry not found: {namespace}/{key}")]
    MemoryNotFound { namespace: String, key: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Event bus is disposed")]
    BusDisposed,

    #[error("Failed to launch agent process: {0}")]
    LaunchFailed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::ConcurrencyConflict {
                entity: "row".to_string(),
                id: db.message().to_string(),
            },
            _ => DomainError::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
