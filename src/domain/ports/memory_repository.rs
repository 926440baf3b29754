//! Repository port for memory entry persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::MemoryEntry;

/// What an upsert did, decided inside a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No row existed; one was inserted.
    Inserted(MemoryEntry),
    /// The row existed and its value or metadata changed.
    Updated(MemoryEntry),
    /// The row existed with a byte-identical value and metadata.
    Unchanged(MemoryEntry),
}

impl UpsertOutcome {
    pub fn entry(&self) -> &MemoryEntry {
        match self {
            Self::Inserted(e) | Self::Updated(e) | Self::Unchanged(e) => e,
        }
    }
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Insert-or-update by `(namespace, key)`, comparing the stored value and
    /// metadata to decide the outcome.
    async fn upsert(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        entry_type: &str,
        metadata: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<UpsertOutcome>;

    /// Fetch without touching access stats.
    async fn get(&self, namespace: &str, key: &str) -> DomainResult<Option<MemoryEntry>>;

    /// Fetch and bump `accessed_at`/`access_count` in the same transaction.
    /// Returns the entry with the bumped stats.
    async fn read_tracked(
        &self,
        namespace: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<MemoryEntry>>;

    /// All entries in a namespace, `created_at` ascending.
    async fn list_namespace(&self, namespace: &str) -> DomainResult<Vec<MemoryEntry>>;

    /// Remove a row, returning the deleted entry when it existed.
    async fn delete(&self, namespace: &str, key: &str) -> DomainResult<Option<MemoryEntry>>;
}
