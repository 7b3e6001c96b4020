//! Self-expiring UI events keyed by domain identifier.
//!
//! At most one event is pending per key. Publishing on a pending key replaces
//! its payload and restarts the timer; the superseded timer is aborted.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::TransientEvent;
use crate::infrastructure::metrics;

/// Default lifetime of a transient event.
pub const DEFAULT_TTL: Duration = Duration::from_millis(3000);

const CHANGE_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Inserted,
    /// A pending event with the same key was replaced
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransientChange {
    Published(TransientEvent),
    Expired { key: String },
}

struct Pending {
    event: TransientEvent,
    timer: JoinHandle<()>,
    generation: u64,
}

struct Inner {
    pending: Mutex<HashMap<String, Pending>>,
    next_generation: Mutex<u64>,
    ttl: Duration,
    changes: broadcast::Sender<TransientChange>,
}

impl Inner {
    /// Remove `key` if it is still the publication that armed the timer.
    fn expire_generation(&self, key: &str, generation: u64) {
        let removed = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(entry) if entry.generation == generation => pending.remove(key),
                _ => None,
            }
        };

        if removed.is_some() {
            tracing::trace!(key, "Transient event expired");
            metrics::record_transient("expired");
            let _ = self.changes.send(TransientChange::Expired {
                key: key.to_string(),
            });
        }
    }
}

/// Queue of pending transient events. Cloning shares the queue.
#[derive(Clone)]
pub struct TransientEventQueue {
    inner: Arc<Inner>,
}

impl TransientEventQueue {
    pub fn new(ttl: Duration) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                next_generation: Mutex::new(0),
                ttl,
                changes,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransientChange> {
        self.inner.changes.subscribe()
    }

    /// Publish `event` and arm its expiry timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn publish(&self, event: TransientEvent) -> PublishOutcome {
        let key = event.key.clone();
        let generation = {
            let mut next = self.inner.next_generation.lock();
            *next += 1;
            *next
        };
        let outcome = {
            let mut pending = self.inner.pending.lock();
            // Armed under the lock so the timer cannot observe the map before the insert
            let timer = self.arm_timer(key.clone(), generation);
            let replaced = pending.insert(
                key.clone(),
                Pending {
                    event: event.clone(),
                    timer,
                    generation,
                },
            );
            match replaced {
                Some(old) => {
                    old.timer.abort();
                    PublishOutcome::Superseded
                }
                None => PublishOutcome::Inserted,
            }
        };

        tracing::trace!(key = %key, kind = event.kind.as_str(), ?outcome, "Transient event published");
        metrics::record_transient(match outcome {
            PublishOutcome::Inserted => "published",
            PublishOutcome::Superseded => "superseded",
        });
        let _ = self.inner.changes.send(TransientChange::Published(event));
        outcome
    }

    /// Expire `key` now. Returns `false` if nothing was pending.
    pub fn expire(&self, key: &str) -> bool {
        let generation = match self.inner.pending.lock().get(key) {
            Some(entry) => {
                entry.timer.abort();
                entry.generation
            }
            None => return false,
        };
        self.inner.expire_generation(key, generation);
        true
    }

    /// User dismissal; same effect as expiry.
    pub fn dismiss(&self, key: &str) -> bool {
        self.expire(key)
    }

    pub fn get(&self, key: &str) -> Option<TransientEvent> {
        self.inner.pending.lock().get(key).map(|p| p.event.clone())
    }

    /// Pending events, oldest first
    pub fn pending(&self) -> Vec<TransientEvent> {
        let mut events: Vec<TransientEvent> = self
            .inner
            .pending
            .lock()
            .values()
            .map(|p| p.event.clone())
            .collect();
        events.sort_by_key(|e| e.created_at);
        events
    }

    pub fn len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.pending.lock().is_empty()
    }

    /// Abort every timer and drop all pending events without emitting expiries.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Pending> = self.inner.pending.lock().drain().map(|(_, p)| p).collect();
        for pending in &drained {
            pending.timer.abort();
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Transient queue shut down");
        }
        drained.len()
    }

    fn arm_timer(&self, key: String, generation: u64) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let ttl = self.inner.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire_generation(&key, generation);
            }
        })
    }
}

impl Default for TransientEventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl std::fmt::Debug for TransientEventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientEventQueue")
            .field("pending", &self.len())
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}
