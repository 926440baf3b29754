//! Shared memory store: namespaced key/value entries with access tracking
//! and blocking waits for creation and updates.
//!
//! Wait operations open their subscription before reading current state, so
//! a save racing the subscribe is never lost. Events are published only
//! after the corresponding row is committed, which lets a woken waiter read
//! the entry back from the store.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::{MemoryEvent, MemoryEventKind};
use crate::domain::models::MemoryEntry;
use crate::domain::ports::{Clock, MemoryRepository, UpsertOutcome};
use crate::services::event_bus::{EventBus, EventFilter, Subscription};

/// Which event a memory wait is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Fires on creation; returns immediately when the entry already exists.
    Creation,
    /// Fires only on a subsequent update; the current value never matches.
    Update,
}

impl WaitMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "creation" | "create" => Some(Self::Creation),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// Result of a blocking memory wait.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Ready(MemoryEntry),
    TimedOut,
    Cancelled,
}

pub struct MemoryStore {
    repository: Arc<dyn MemoryRepository>,
    bus: Arc<EventBus<MemoryEvent>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        bus: Arc<EventBus<MemoryEvent>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repository, bus, clock }
    }

    /// Upsert by `(namespace, key)`. Emits `Created` on insert and `Updated`
    /// on a value or metadata change; a byte-identical save emits nothing.
    pub async fn save(
        &self,
        key: &str,
        value: &str,
        entry_type: Option<&str>,
        metadata: Option<&str>,
        namespace: &str,
    ) -> DomainResult<MemoryEntry> {
        if key.is_empty() {
            return Err(DomainError::InvalidArgument("key must not be empty".into()));
        }

        let entry_type = entry_type.unwrap_or("json");
        let now = self.clock.now();
        let outcome = self
            .repository
            .upsert(namespace, key, value, entry_type, metadata, now)
            .await?;

        let (entry, kind) = match outcome {
            UpsertOutcome::Inserted(entry) => (entry, Some(MemoryEventKind::Created)),
            UpsertOutcome::Updated(entry) => (entry, Some(MemoryEventKind::Updated)),
            UpsertOutcome::Unchanged(entry) => (entry, None),
        };

        if let Some(kind) = kind {
            self.publish(MemoryEvent::new(
                kind,
                namespace,
                key,
                entry.value.clone(),
                entry.entry_type.clone(),
                entry.metadata.clone(),
                now,
            ));
        }

        Ok(entry)
    }

    /// Read an entry, bumping `accessed_at` and `access_count` atomically
    /// with the read. Access bumps emit no events.
    pub async fn read(&self, key: &str, namespace: &str) -> DomainResult<MemoryEntry> {
        self.repository
            .read_tracked(namespace, key, self.clock.now())
            .await?
            .ok_or_else(|| DomainError::MemoryNotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })
    }

    /// All entries in a namespace, oldest first.
    pub async fn list(&self, namespace: &str) -> DomainResult<Vec<MemoryEntry>> {
        self.repository.list_namespace(namespace).await
    }

    /// Delete an entry. Emits `Deleted` only when a row existed.
    pub async fn delete(&self, key: &str, namespace: &str) -> DomainResult<bool> {
        let Some(entry) = self.repository.delete(namespace, key).await? else {
            return Ok(false);
        };

        self.publish(MemoryEvent::new(
            MemoryEventKind::Deleted,
            namespace,
            key,
            entry.value,
            entry.entry_type,
            entry.metadata,
            self.clock.now(),
        ));
        Ok(true)
    }

    /// Block until the entry exists (or already does), the wait window
    /// closes, or the caller cancels.
    pub async fn wait_for_creation(
        &self,
        key: &str,
        namespace: &str,
        wait_up_to: Duration,
        token: &CancellationToken,
    ) -> DomainResult<WaitOutcome> {
        let subscription_token = token.child_token();
        let subscription = self.subscribe_key(MemoryEventKind::Created, namespace, key, &subscription_token);

        // Check current state only after the subscription is live; the
        // reverse order would drop a creation racing the subscribe.
        let outcome = if let Some(entry) = self.repository.get(namespace, key).await? {
            Ok(WaitOutcome::Ready(entry))
        } else {
            self.await_event(namespace, key, wait_up_to, token, subscription).await
        };

        subscription_token.cancel();
        outcome
    }

    /// Block until the entry is updated. Does not fire for the value
    /// current at call time, nor for creations.
    pub async fn wait_for_update(
        &self,
        key: &str,
        namespace: &str,
        wait_up_to: Duration,
        token: &CancellationToken,
    ) -> DomainResult<WaitOutcome> {
        let subscription_token = token.child_token();
        let subscription = self.subscribe_key(MemoryEventKind::Updated, namespace, key, &subscription_token);

        let outcome = self.await_event(namespace, key, wait_up_to, token, subscription).await;
        subscription_token.cancel();
        outcome
    }

    fn subscribe_key(
        &self,
        kind: MemoryEventKind,
        namespace: &str,
        key: &str,
        token: &CancellationToken,
    ) -> Subscription<MemoryEvent> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        let filter = EventFilter::for_kinds([kind])
            .with_predicate(move |event: &MemoryEvent| event.matches_key(&namespace, &key));
        self.bus.subscribe(filter, token)
    }

    async fn await_event(
        &self,
        namespace: &str,
        key: &str,
        wait_up_to: Duration,
        token: &CancellationToken,
        mut subscription: Subscription<MemoryEvent>,
    ) -> DomainResult<WaitOutcome> {
        let deadline = tokio::time::Instant::now() + wait_up_to;

        loop {
            tokio::select! {
                () = token.cancelled() => return Ok(WaitOutcome::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Ok(WaitOutcome::TimedOut),
                event = subscription.recv() => {
                    if event.is_none() {
                        return Err(DomainError::BusDisposed);
                    }
                    // The row was committed before the event was published;
                    // read it back. A concurrent delete re-arms the wait.
                    if let Some(entry) = self.repository.get(namespace, key).await? {
                        return Ok(WaitOutcome::Ready(entry));
                    }
                }
            }
        }
    }

    fn publish(&self, event: MemoryEvent) {
        if let Err(error) = self.bus.publish(event) {
            tracing::warn!(%error, "memory event dropped");
        }
    }
}
