//! Optimistic mutation protocol.
//!
//! A mutation is a command object carrying both directions: `forward` applies
//! the local guess and returns an undo record, `inverse` consumes that record to
//! put the prior state back. The mutator applies the command, awaits the remote
//! request and keeps or undoes the change depending on its outcome.
//!
//! Mutations touching the same key are serialized: a second mutation on a key
//! does not apply its forward step until the first one has been confirmed or
//! rolled back.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::infrastructure::metrics;
use crate::shared::error::SyncError;

/// Result of undoing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStatus {
    /// Pre-mutation state is back in place
    Restored,
    /// Newer state (usually a server event) replaced the optimistic value and was kept
    Superseded,
}

impl RollbackStatus {
    fn as_metric(&self) -> &'static str {
        match self {
            Self::Restored => "rolled_back",
            Self::Superseded => "superseded",
        }
    }
}

/// A reversible local mutation.
pub trait OptimisticCommand: Send {
    /// Everything `inverse` needs to restore the prior state
    type Undo: Send;

    /// Keys this command touches. Mutations sharing a key run one at a time.
    fn keys(&self) -> Vec<String>;

    /// Apply the optimistic change.
    fn forward(&mut self) -> Result<Self::Undo, SyncError>;

    /// Undo a previously applied change.
    fn inverse(&mut self, undo: Self::Undo) -> RollbackStatus;
}

/// Command built from a pair of closures.
pub struct FnCommand<F, I, U> {
    key: String,
    forward: Option<F>,
    inverse: Option<I>,
    _undo: PhantomData<fn() -> U>,
}

impl<F, I, U> FnCommand<F, I, U>
where
    F: FnOnce() -> Result<U, SyncError> + Send,
    I: FnOnce(U) -> RollbackStatus + Send,
    U: Send,
{
    pub fn new(key: impl Into<String>, forward: F, inverse: I) -> Self {
        Self {
            key: key.into(),
            forward: Some(forward),
            inverse: Some(inverse),
            _undo: PhantomData,
        }
    }
}

impl<F, I, U> OptimisticCommand for FnCommand<F, I, U>
where
    F: FnOnce() -> Result<U, SyncError> + Send,
    I: FnOnce(U) -> RollbackStatus + Send,
    U: Send,
{
    type Undo = U;

    fn keys(&self) -> Vec<String> {
        vec![self.key.clone()]
    }

    fn forward(&mut self) -> Result<U, SyncError> {
        let forward = self
            .forward
            .take()
            .ok_or_else(|| SyncError::Internal(format!("command {} already applied", self.key)))?;
        forward()
    }

    fn inverse(&mut self, undo: U) -> RollbackStatus {
        match self.inverse.take() {
            Some(inverse) => inverse(undo),
            None => RollbackStatus::Superseded,
        }
    }
}

type Lanes = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Runs optimistic commands against their remote confirmation.
#[derive(Clone, Default)]
pub struct OptimisticMutator {
    lanes: Lanes,
}

impl OptimisticMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a mutation in flight or waiting
    pub fn busy_keys(&self) -> usize {
        self.lanes.len()
    }

    /// Apply `command`, then await `remote`.
    ///
    /// On success the optimistic state stays and the remote value is returned.
    /// On failure the command is inverted before the error is returned. If the
    /// returned future is dropped while the remote request is pending, the
    /// command is inverted as well.
    pub async fn perform<C, Fut, T, E>(&self, command: C, remote: Fut) -> Result<T, SyncError>
    where
        C: OptimisticCommand,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let keys = command.keys();
        let label = keys.join(",");
        let mutation_id = Uuid::new_v4();
        let _lane = LaneGuard::acquire(self.lanes.clone(), keys).await;

        let mut pending = PendingRollback::new(command, mutation_id, label.clone());
        if let Err(e) = pending.apply() {
            tracing::warn!(
                mutation_id = %mutation_id,
                key = %label,
                error = %e,
                "Optimistic mutation rejected locally"
            );
            metrics::record_mutation("rejected");
            return Err(e);
        }

        tracing::debug!(mutation_id = %mutation_id, key = %label, "Optimistic mutation applied");

        match remote.await {
            Ok(value) => {
                pending.commit();
                tracing::debug!(mutation_id = %mutation_id, key = %label, "Mutation confirmed");
                metrics::record_mutation("confirmed");
                Ok(value)
            }
            Err(e) => {
                let reason = e.to_string();
                let status = pending.rollback();
                tracing::warn!(
                    mutation_id = %mutation_id,
                    key = %label,
                    error = %reason,
                    rollback = ?status,
                    "Remote request failed, optimistic mutation rolled back"
                );
                Err(SyncError::Mutation { key: label, reason })
            }
        }
    }
}

impl std::fmt::Debug for OptimisticMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticMutator")
            .field("busy_keys", &self.lanes.len())
            .finish()
    }
}

/// Holds the per-key locks for one mutation.
struct LaneGuard {
    lanes: Lanes,
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl LaneGuard {
    async fn acquire(lanes: Lanes, mut keys: Vec<String>) -> Self {
        // Fixed order so overlapping multi-key commands cannot deadlock
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lane = lanes.entry(key.clone()).or_default().clone();
            guards.push(lane.lock_owned().await);
        }

        Self {
            lanes,
            keys,
            guards,
        }
    }
}

impl Drop for LaneGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            self.lanes
                .remove_if(key, |_, lane| Arc::strong_count(lane) == 1);
        }
    }
}

/// Undo record that inverts its command when dropped unconfirmed.
struct PendingRollback<C: OptimisticCommand> {
    command: C,
    undo: Option<C::Undo>,
    mutation_id: Uuid,
    label: String,
}

impl<C: OptimisticCommand> PendingRollback<C> {
    fn new(command: C, mutation_id: Uuid, label: String) -> Self {
        Self {
            command,
            undo: None,
            mutation_id,
            label,
        }
    }

    fn apply(&mut self) -> Result<(), SyncError> {
        self.undo = Some(self.command.forward()?);
        Ok(())
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) -> Option<RollbackStatus> {
        let undo = self.undo.take()?;
        let status = self.command.inverse(undo);
        metrics::record_mutation(status.as_metric());
        Some(status)
    }
}

impl<C: OptimisticCommand> Drop for PendingRollback<C> {
    fn drop(&mut self) {
        if self.undo.is_some() {
            let status = self.rollback();
            tracing::warn!(
                mutation_id = %self.mutation_id,
                key = %self.label,
                rollback = ?status,
                "Mutation cancelled before confirmation, rolled back"
            );
        }
    }
}
