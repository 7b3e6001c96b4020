//! Course Admin Service
//!
//! Bulk course edits applied optimistically to the course cache.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;

use crate::application::realtime::{
    CourseCache, OptimisticCommand, OptimisticMutator, OptimisticWrite, RollbackOutcome,
    RollbackStatus,
};
use crate::domain::{CourseId, CoursePatch, HttpClient, HttpMethod, HttpRequest, SessionToken};
use crate::shared::error::SyncError;

/// Course admin service trait.
#[async_trait]
pub trait CourseAdminService: Send + Sync {
    /// Apply `patch` to every listed course and confirm with the server.
    ///
    /// Returns the number of cached records changed optimistically.
    async fn bulk_patch(&self, ids: &[CourseId], patch: CoursePatch) -> Result<usize, SyncError>;

    /// Flag or unflag a single course as trending.
    async fn set_trending(&self, id: &CourseId, is_trending: bool) -> Result<(), SyncError>;
}

/// Optimistic patch over a set of cached courses.
pub struct CoursePatchCommand {
    cache: Arc<CourseCache>,
    ids: Vec<CourseId>,
    patch: CoursePatch,
    changed: Arc<AtomicUsize>,
}

impl CoursePatchCommand {
    pub fn new(cache: Arc<CourseCache>, ids: Vec<CourseId>, patch: CoursePatch) -> Self {
        Self {
            cache,
            ids,
            patch,
            changed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of records the forward step actually changed, readable after `perform`.
    pub fn changed_counter(&self) -> Arc<AtomicUsize> {
        self.changed.clone()
    }
}

impl OptimisticCommand for CoursePatchCommand {
    type Undo = Vec<OptimisticWrite>;

    fn keys(&self) -> Vec<String> {
        self.ids.iter().map(|id| format!("course:{}", id)).collect()
    }

    fn forward(&mut self) -> Result<Self::Undo, SyncError> {
        if self.patch.is_empty() {
            return Err(SyncError::Internal("empty course patch".into()));
        }
        let writes: Vec<OptimisticWrite> = self
            .ids
            .iter()
            .filter_map(|id| self.cache.apply_optimistic(id, &self.patch))
            .collect();
        let changed = writes
            .iter()
            .filter(|write| !Arc::ptr_eq(&write.previous, &write.written))
            .count();
        self.changed.store(changed, Ordering::Release);
        Ok(writes)
    }

    fn inverse(&mut self, writes: Self::Undo) -> RollbackStatus {
        let mut status = RollbackStatus::Restored;
        // Reverse order so duplicate ids unwind to the oldest value
        for write in writes.into_iter().rev() {
            let course_id = write.course_id.clone();
            match self.cache.rollback(write) {
                RollbackOutcome::Restored => {}
                outcome => {
                    tracing::debug!(course_id = %course_id, ?outcome, "Server state kept over rollback");
                    status = RollbackStatus::Superseded;
                }
            }
        }
        status
    }
}

/// Course admin service implementation.
pub struct CourseAdminServiceImpl {
    cache: Arc<CourseCache>,
    http: Arc<dyn HttpClient>,
    mutator: OptimisticMutator,
    session: RwLock<Option<SessionToken>>,
}

impl CourseAdminServiceImpl {
    pub fn new(cache: Arc<CourseCache>, http: Arc<dyn HttpClient>, mutator: OptimisticMutator) -> Self {
        Self {
            cache,
            http,
            mutator,
            session: RwLock::new(None),
        }
    }

    pub fn set_session(&self, token: Option<SessionToken>) {
        *self.session.write() = token;
    }

    /// Apply `patch` to `ids` and confirm with `remote`.
    pub async fn bulk_patch_with<Fut, T, E>(
        &self,
        ids: &[CourseId],
        patch: CoursePatch,
        remote: Fut,
    ) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.patch_counting(ids, patch, remote).await.map(|(value, _)| value)
    }

    /// Like [`bulk_patch_with`](Self::bulk_patch_with), also returning how many
    /// records changed once the per-course lanes were held.
    async fn patch_counting<Fut, T, E>(
        &self,
        ids: &[CourseId],
        patch: CoursePatch,
        remote: Fut,
    ) -> Result<(T, usize), SyncError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let command = CoursePatchCommand::new(self.cache.clone(), ids.to_vec(), patch);
        let changed = command.changed_counter();
        let value = self.mutator.perform(command, remote).await?;
        Ok((value, changed.load(Ordering::Acquire)))
    }
}

#[async_trait]
impl CourseAdminService for CourseAdminServiceImpl {
    async fn bulk_patch(&self, ids: &[CourseId], patch: CoursePatch) -> Result<usize, SyncError> {
        let mut request = HttpRequest::new(HttpMethod::Patch, "/courses")
            .json(json!({ "ids": ids, "patch": patch }));
        if let Some(token) = self.session.read().clone() {
            request = request.bearer(token);
        }

        let fields = patch.fields();
        let http = self.http.clone();
        let (_, changed) = self
            .patch_counting(ids, patch, async move {
                http.send(request).await?.error_for_status()
            })
            .await?;

        tracing::info!(courses = ids.len(), changed, fields = ?fields, "Bulk course patch confirmed");
        Ok(changed)
    }

    async fn set_trending(&self, id: &CourseId, is_trending: bool) -> Result<(), SyncError> {
        self.bulk_patch(std::slice::from_ref(id), CoursePatch::trending(is_trending))
            .await
            .map(|_| ())
    }
}
