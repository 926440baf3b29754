//! Repository port for the append-only audit log.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::EventLogEntry;

#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn append(&self, entry: &EventLogEntry) -> DomainResult<()>;

    /// Rows ordered by insertion (rowid), oldest first.
    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<EventLogEntry>>;

    /// Rows of one event type, insertion order.
    async fn list_by_type(&self, event_type: &str, limit: usize) -> DomainResult<Vec<EventLogEntry>>;
}
