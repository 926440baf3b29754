//! Typed in-process event bus.
//!
//! One bus instance exists per event family (task, agent, memory). Every
//! subscriber owns a dedicated unbounded queue; `publish` enqueues to all
//! matching queues while holding the registry lock, so all subscribers of a
//! bus observe the same event order. Publishers never block on consumers.
//!
//! Cancellation-token completion is the sole unsubscribe signal: a watcher
//! task removes the subscriber entry and closes its queue when the token
//! fires. Dropping a `Subscription` without cancelling leaks the queue until
//! the bus is disposed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::events::BusEvent;

/// Subscription filter: a set of kind discriminators plus an optional
/// predicate over the whole envelope. An empty filter matches everything.
pub struct EventFilter<E: BusEvent> {
    kinds: Option<HashSet<E::Kind>>,
    predicate: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
}

impl<E: BusEvent> Clone for EventFilter<E> {
    fn clone(&self) -> Self {
        Self {
            kinds: self.kinds.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<E: BusEvent> Default for EventFilter<E> {
    fn default() -> Self {
        Self::all()
    }
}

impl<E: BusEvent> EventFilter<E> {
    /// Match every event on the bus.
    pub fn all() -> Self {
        Self { kinds: None, predicate: None }
    }

    /// Match only the given kinds.
    pub fn for_kinds(kinds: impl IntoIterator<Item = E::Kind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            predicate: None,
        }
    }

    /// Additionally require the predicate to hold.
    pub fn with_predicate(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, event: &E) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        match &self.predicate {
            Some(predicate) => predicate(event),
            None => true,
        }
    }
}

struct Subscriber<E: BusEvent> {
    id: u64,
    filter: EventFilter<E>,
    tx: mpsc::UnboundedSender<E>,
}

struct BusState<E: BusEvent> {
    subscribers: Vec<Subscriber<E>>,
    disposed: bool,
}

/// A live subscription's receiving half.
pub struct Subscription<E: BusEvent> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E: BusEvent> Subscription<E> {
    /// Next envelope in FIFO order; `None` once unsubscribed (token
    /// cancelled) or the bus disposed, after the queue drains.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }
}

/// Fan-out bus for one event family.
pub struct EventBus<E: BusEvent> {
    state: Arc<Mutex<BusState<E>>>,
    next_id: AtomicU64,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                subscribers: Vec::new(),
                disposed: false,
            })),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a subscriber. The subscription stays live until `token` is
    /// cancelled or the bus is disposed. Events published before the
    /// registration completes are not delivered.
    pub fn subscribe(&self, filter: EventFilter<E>, token: &CancellationToken) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = lock(&self.state);
            if !state.disposed {
                state.subscribers.push(Subscriber { id, filter, tx });
            }
            // On a disposed bus the sender is dropped here and the
            // subscription yields None immediately.
        }

        let state = Arc::clone(&self.state);
        let token = token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            lock(&state).subscribers.retain(|s| s.id != id);
        });

        Subscription { rx }
    }

    /// Deliver an envelope to every matching subscriber. Completes only
    /// after all current matching queues have accepted it.
    pub fn publish(&self, event: E) -> DomainResult<()> {
        let state = lock(&self.state);
        if state.disposed {
            return Err(DomainError::BusDisposed);
        }
        for subscriber in &state.subscribers {
            if subscriber.filter.matches(&event) {
                // A closed queue means the subscriber went away without
                // cancelling; delivery to it is skipped.
                let _ = subscriber.tx.send(event.clone());
            }
        }
        Ok(())
    }

    /// Close all subscriber queues and reject further publishes.
    pub fn dispose(&self) {
        let mut state = lock(&self.state);
        state.disposed = true;
        state.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }
}

fn lock<E: BusEvent>(state: &Mutex<BusState<E>>) -> std::sync::MutexGuard<'_, BusState<E>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
