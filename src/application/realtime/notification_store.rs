//! Bounded notification ledger.
//!
//! Newest entries sit at the head. The unread counter is kept equal to the
//! number of unread entries actually held after every operation.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::{Notification, NotificationAlerter};
use crate::infrastructure::metrics;
use crate::shared::error::SyncError;

/// Default number of notifications retained.
pub const DEFAULT_CAPACITY: usize = 10;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Result of an ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored at the head; `evicted` lists ids pushed out of the tail
    Inserted { evicted: Vec<String> },
    /// An entry with the same id is already held
    Duplicate,
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub items: Vec<Notification>,
    pub unread: usize,
}

/// Change notification published after each write.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationChange {
    Inserted { id: String },
    Read { ids: Vec<String> },
    Removed { id: String },
    Replaced { count: usize },
    Cleared,
}

#[derive(Debug, Default)]
struct Ledger {
    items: VecDeque<Notification>,
    unread: usize,
}

impl Ledger {
    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| n.is_unread()).count();
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }
}

/// Notification lifecycle state machine: unread to read, bounded by capacity.
pub struct NotificationStore {
    ledger: Mutex<Ledger>,
    capacity: usize,
    alerter: Option<Arc<dyn NotificationAlerter>>,
    changes: broadcast::Sender<NotificationChange>,
}

impl NotificationStore {
    /// Create a store holding at most `capacity` entries (minimum one).
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            ledger: Mutex::new(Ledger::default()),
            capacity: capacity.max(1),
            alerter: None,
            changes,
        }
    }

    /// Offer newly inserted unread notifications to a platform alerter.
    pub fn with_alerter(mut self, alerter: Arc<dyn NotificationAlerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationChange> {
        self.changes.subscribe()
    }

    /// Insert a pushed notification at the head.
    pub fn ingest(&self, notification: Notification) -> IngestOutcome {
        let id = notification.id.clone();
        let unread = notification.is_unread();

        let evicted = {
            let mut ledger = self.ledger.lock();
            if ledger.position(&id).is_some() {
                drop(ledger);
                tracing::debug!(notification_id = %id, "Duplicate notification ignored");
                metrics::record_notification("duplicate");
                return IngestOutcome::Duplicate;
            }

            ledger.items.push_front(notification.clone());
            if unread {
                ledger.unread += 1;
            }

            let mut evicted = Vec::new();
            while ledger.items.len() > self.capacity {
                if let Some(oldest) = ledger.items.pop_back() {
                    evicted.push(oldest.id);
                }
            }
            if !evicted.is_empty() {
                ledger.recount();
            }
            evicted
        };

        tracing::debug!(
            notification_id = %id,
            kind = %notification.kind,
            evicted = evicted.len(),
            "Notification stored"
        );
        metrics::record_notification("inserted");
        self.notify(NotificationChange::Inserted { id });

        if unread {
            if let Some(alerter) = &self.alerter {
                alerter.offer(&notification);
            }
        }

        IngestOutcome::Inserted { evicted }
    }

    /// Mark one entry read. Returns `false` when the id is not held.
    pub fn mark_read(&self, id: &str) -> bool {
        let changed = {
            let mut ledger = self.ledger.lock();
            let Some(index) = ledger.position(id) else {
                return false;
            };
            let entry = &mut ledger.items[index];
            if entry.read {
                false
            } else {
                entry.read = true;
                ledger.unread = ledger.unread.saturating_sub(1);
                true
            }
        };

        if changed {
            self.notify(NotificationChange::Read {
                ids: vec![id.to_string()],
            });
        }
        true
    }

    /// Mark every held entry read in one step. Returns how many changed.
    pub fn mark_all_read(&self) -> usize {
        let ids: Vec<String> = {
            let mut ledger = self.ledger.lock();
            let ids = ledger
                .items
                .iter_mut()
                .filter(|n| !n.read)
                .map(|n| {
                    n.read = true;
                    n.id.clone()
                })
                .collect();
            ledger.unread = 0;
            ids
        };

        let count = ids.len();
        if count > 0 {
            self.notify(NotificationChange::Read { ids });
        }
        count
    }

    /// Replace the ledger with a fetched list (newest first).
    ///
    /// Duplicate ids keep their first occurrence; entries past capacity are dropped.
    pub fn replace_all(&self, notifications: Vec<Notification>) -> usize {
        let count = {
            let mut ledger = self.ledger.lock();
            ledger.items.clear();
            for notification in notifications {
                if ledger.items.len() == self.capacity {
                    break;
                }
                if ledger.position(&notification.id).is_none() {
                    ledger.items.push_back(notification);
                }
            }
            ledger.recount();
            ledger.items.len()
        };

        tracing::debug!(count, "Notification ledger replaced");
        self.notify(NotificationChange::Replaced { count });
        count
    }

    /// Replace the ledger from `fetch`. On error the current entries stay.
    pub async fn refresh<Fut>(&self, fetch: Fut) -> Result<usize, SyncError>
    where
        Fut: Future<Output = Result<Vec<Notification>, SyncError>>,
    {
        match fetch.await {
            Ok(notifications) => Ok(self.replace_all(notifications)),
            Err(e) => {
                tracing::warn!(error = %e, "Notification refresh failed, keeping current entries");
                Err(e)
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Notification> {
        let removed = {
            let mut ledger = self.ledger.lock();
            let index = ledger.position(id)?;
            let removed = ledger.items.remove(index);
            ledger.recount();
            removed
        };

        if removed.is_some() {
            self.notify(NotificationChange::Removed { id: id.to_string() });
        }
        removed
    }

    pub fn clear(&self) {
        {
            let mut ledger = self.ledger.lock();
            ledger.items.clear();
            ledger.unread = 0;
        }
        self.notify(NotificationChange::Cleared);
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        let ledger = self.ledger.lock();
        NotificationSnapshot {
            items: ledger.items.iter().cloned().collect(),
            unread: ledger.unread,
        }
    }

    pub fn unread_count(&self) -> usize {
        self.ledger.lock().unread
    }

    pub fn len(&self) -> usize {
        self.ledger.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.lock().items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ledger.lock().position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        let ledger = self.ledger.lock();
        ledger.position(id).map(|index| ledger.items[index].clone())
    }

    fn notify(&self, change: NotificationChange) {
        let _ = self.changes.send(change);
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("NotificationStore")
            .field("len", &ledger.items.len())
            .field("unread", &ledger.unread)
            .field("capacity", &self.capacity)
            .finish()
    }
}
