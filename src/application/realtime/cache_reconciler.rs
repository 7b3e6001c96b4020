//! Course cache and reconciliation of inbound server events.
//!
//! The cache is a copy-on-write snapshot: every write swaps in a new
//! `Arc<CourseRecord>` and bumps the snapshot version, so observers can detect
//! changes by pointer identity and readers holding an older snapshot never see
//! it mutate underneath them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::domain::{CourseId, CoursePatch, CourseRecord, InboundEvent};
use crate::infrastructure::metrics;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Immutable view of the cached courses.
#[derive(Debug, Clone, Default)]
pub struct CourseSnapshot {
    records: HashMap<CourseId, Arc<CourseRecord>>,
    /// Bumped whenever a server event touches a record, even without a value change
    server_generations: HashMap<CourseId, u64>,
    version: u64,
}

impl CourseSnapshot {
    pub fn get(&self, id: &CourseId) -> Option<&Arc<CourseRecord>> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &CourseId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<CourseRecord>> {
        self.records.values()
    }

    fn server_generation(&self, id: &CourseId) -> u64 {
        self.server_generations.get(id).copied().unwrap_or(0)
    }
}

/// Origin of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Fetch,
    Server,
    Optimistic,
    Rollback,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Server => "server",
            Self::Optimistic => "optimistic",
            Self::Rollback => "rollback",
        }
    }
}

/// Change notification emitted after each cache write.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheUpdate {
    pub course_id: Option<CourseId>,
    pub source: UpdateSource,
    pub version: u64,
}

/// Result of applying an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Record found and at least one field changed
    Applied,
    /// Record found, every carried field already held the value
    Unchanged,
    /// No cached record for the id; nothing was created
    Missing,
    /// Event carries no course fields
    Ignored,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Missing => "missing",
            Self::Ignored => "ignored",
        }
    }

    /// The event matched a cached record
    pub fn matched(&self) -> bool {
        matches!(self, Self::Applied | Self::Unchanged)
    }
}

/// Pending optimistic write, kept as the undo record of a mutation.
#[derive(Debug, Clone)]
pub struct OptimisticWrite {
    pub course_id: CourseId,
    pub previous: Arc<CourseRecord>,
    pub written: Arc<CourseRecord>,
    server_generation: u64,
}

/// What happened when an optimistic write was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Pre-mutation value restored
    Restored,
    /// A server event or another write touched the record first; it wins
    Superseded,
    /// Record disappeared in the meantime
    Missing,
}

/// Keyed cache of course records.
pub struct CourseCache {
    snapshot: RwLock<Arc<CourseSnapshot>>,
    updates: broadcast::Sender<CacheUpdate>,
}

impl CourseCache {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(Arc::new(CourseSnapshot::default())),
            updates,
        }
    }

    /// Current immutable snapshot
    pub fn snapshot(&self) -> Arc<CourseSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn get(&self, id: &CourseId) -> Option<Arc<CourseRecord>> {
        self.snapshot.read().get(id).cloned()
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates.subscribe()
    }

    /// Replace the whole cache with a full fetch result.
    pub fn load(&self, records: impl IntoIterator<Item = CourseRecord>) -> usize {
        let version = {
            let mut guard = self.snapshot.write();
            let next = Arc::make_mut(&mut guard);
            next.records = records
                .into_iter()
                .map(|record| (record.id.clone(), Arc::new(record)))
                .collect();
            next.server_generations.clear();
            next.version += 1;
            next.version
        };

        let count = self.snapshot.read().len();
        tracing::debug!(count, version, "Course cache loaded");
        self.notify(None, UpdateSource::Fetch, version);
        count
    }

    /// Insert or replace one record from a full fetch.
    pub fn upsert(&self, record: CourseRecord) -> Arc<CourseRecord> {
        let id = record.id.clone();
        let record = Arc::new(record);
        let version = {
            let mut guard = self.snapshot.write();
            let next = Arc::make_mut(&mut guard);
            next.records.insert(id.clone(), record.clone());
            next.version += 1;
            next.version
        };
        self.notify(Some(id), UpdateSource::Fetch, version);
        record
    }

    pub fn remove(&self, id: &CourseId) -> Option<Arc<CourseRecord>> {
        let (removed, version) = {
            let mut guard = self.snapshot.write();
            if !guard.contains(id) {
                return None;
            }
            let next = Arc::make_mut(&mut guard);
            let removed = next.records.remove(id);
            next.server_generations.remove(id);
            next.version += 1;
            (removed, next.version)
        };
        self.notify(Some(id.clone()), UpdateSource::Fetch, version);
        removed
    }

    /// Merge server-confirmed fields into an existing record.
    pub fn apply_server(&self, id: &CourseId, patch: &CoursePatch) -> ReconcileOutcome {
        let (outcome, version) = {
            let mut guard = self.snapshot.write();
            let Some(current) = guard.get(id).cloned() else {
                return ReconcileOutcome::Missing;
            };

            let next = Arc::make_mut(&mut guard);
            *next.server_generations.entry(id.clone()).or_insert(0) += 1;

            match patch.merge(&current) {
                Some(merged) => {
                    next.records.insert(id.clone(), Arc::new(merged));
                    next.version += 1;
                    (ReconcileOutcome::Applied, Some(next.version))
                }
                None => (ReconcileOutcome::Unchanged, None),
            }
        };

        if let Some(version) = version {
            self.notify(Some(id.clone()), UpdateSource::Server, version);
        }
        outcome
    }

    /// Apply a local guess ahead of server confirmation.
    ///
    /// Returns the undo record, or `None` when the course is not cached.
    pub fn apply_optimistic(&self, id: &CourseId, patch: &CoursePatch) -> Option<OptimisticWrite> {
        let (write, version) = {
            let mut guard = self.snapshot.write();
            let previous = guard.get(id).cloned()?;
            let server_generation = guard.server_generation(id);

            match patch.merge(&previous) {
                Some(merged) => {
                    let written = Arc::new(merged);
                    let next = Arc::make_mut(&mut guard);
                    next.records.insert(id.clone(), written.clone());
                    next.version += 1;
                    let write = OptimisticWrite {
                        course_id: id.clone(),
                        previous,
                        written,
                        server_generation,
                    };
                    (write, Some(next.version))
                }
                None => {
                    let write = OptimisticWrite {
                        course_id: id.clone(),
                        previous: previous.clone(),
                        written: previous,
                        server_generation,
                    };
                    (write, None)
                }
            }
        };

        if let Some(version) = version {
            self.notify(Some(id.clone()), UpdateSource::Optimistic, version);
        }
        Some(write)
    }

    /// Undo an optimistic write.
    ///
    /// The exact pre-mutation value is restored only if the cache still holds
    /// the optimistic value and no server event touched the record since.
    pub fn rollback(&self, write: OptimisticWrite) -> RollbackOutcome {
        let id = write.course_id.clone();
        let (outcome, version) = {
            let mut guard = self.snapshot.write();
            let Some(current) = guard.get(&id).cloned() else {
                return RollbackOutcome::Missing;
            };

            if !Arc::ptr_eq(&current, &write.written)
                || guard.server_generation(&id) != write.server_generation
            {
                (RollbackOutcome::Superseded, None)
            } else if Arc::ptr_eq(&current, &write.previous) {
                // The optimistic write was a no-op; nothing to restore
                (RollbackOutcome::Restored, None)
            } else {
                let next = Arc::make_mut(&mut guard);
                next.records.insert(id.clone(), write.previous);
                next.version += 1;
                (RollbackOutcome::Restored, Some(next.version))
            }
        };

        if let Some(version) = version {
            self.notify(Some(id), UpdateSource::Rollback, version);
        }
        outcome
    }

    fn notify(&self, course_id: Option<CourseId>, source: UpdateSource, version: u64) {
        // No receivers is fine; observers come and go
        let _ = self.updates.send(CacheUpdate {
            course_id,
            source,
            version,
        });
    }
}

impl Default for CourseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CourseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("CourseCache")
            .field("len", &snapshot.len())
            .field("version", &snapshot.version())
            .finish()
    }
}

/// Applies inbound course events to the cache.
#[derive(Debug, Clone)]
pub struct CacheReconciler {
    cache: Arc<CourseCache>,
}

impl CacheReconciler {
    pub fn new(cache: Arc<CourseCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<CourseCache> {
        &self.cache
    }

    /// Merge the fields named by `event` into the cached record.
    ///
    /// Events for unknown ids never create records. Reapplying an identical
    /// event yields the same state.
    pub fn apply_event(&self, event: &InboundEvent) -> ReconcileOutcome {
        let topic = event.topic();
        let (Some(course_id), Some(patch)) = (event.course_id(), event.course_patch()) else {
            metrics::record_reconciled(topic.as_str(), ReconcileOutcome::Ignored.as_str());
            return ReconcileOutcome::Ignored;
        };

        let outcome = self.cache.apply_server(course_id, &patch);

        match outcome {
            ReconcileOutcome::Missing => tracing::debug!(
                topic = %topic,
                course_id = %course_id,
                "Event for uncached course ignored"
            ),
            _ => tracing::debug!(
                topic = %topic,
                course_id = %course_id,
                fields = ?patch.fields(),
                outcome = outcome.as_str(),
                "Event reconciled"
            ),
        }
        metrics::record_reconciled(topic.as_str(), outcome.as_str());
        outcome
    }
}
