//! Wishlist Service
//!
//! Optimistic wishlist membership backed by a persisted identifier set.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use crate::application::realtime::{OptimisticCommand, OptimisticMutator, RollbackStatus};
use crate::domain::{
    CourseId, HttpClient, HttpMethod, HttpRequest, KeyValueStore, SessionToken,
};
use crate::shared::error::SyncError;

/// Storage key of the persisted wishlist.
pub const WISHLIST_STORAGE_KEY: &str = "wishlist";

/// Direction of a toggle, as sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishlistIntent {
    Add,
    Remove,
}

/// Wishlist service trait.
#[async_trait]
pub trait WishlistService: Send + Sync {
    /// Whether the course is currently wishlisted (optimistic view).
    fn contains(&self, id: &CourseId) -> bool;

    /// All wishlisted ids in sorted order.
    fn ids(&self) -> Vec<CourseId>;

    /// Flip membership of `id` and confirm it with the server.
    ///
    /// On rejection the membership reverts and `SyncError::Mutation` is returned.
    async fn toggle(&self, id: &CourseId) -> Result<WishlistIntent, SyncError>;
}

type IdSet = Arc<Mutex<BTreeSet<CourseId>>>;

/// Writes the current set to storage.
fn persist(store: &dyn KeyValueStore, ids: &BTreeSet<CourseId>) -> Result<(), SyncError> {
    let encoded = serde_json::to_string(ids)?;
    store.save(WISHLIST_STORAGE_KEY, &encoded)
}

/// Optimistic membership flip for one id.
pub struct WishlistToggle {
    ids: IdSet,
    store: Arc<dyn KeyValueStore>,
    course_id: CourseId,
}

impl OptimisticCommand for WishlistToggle {
    /// Membership before the flip
    type Undo = bool;

    fn keys(&self) -> Vec<String> {
        vec![format!("wishlist:{}", self.course_id)]
    }

    fn forward(&mut self) -> Result<bool, SyncError> {
        let mut ids = self.ids.lock();
        let was_member = ids.contains(&self.course_id);
        if was_member {
            ids.remove(&self.course_id);
        } else {
            ids.insert(self.course_id.clone());
        }

        if let Err(e) = persist(self.store.as_ref(), &ids) {
            // Keep memory and storage in agreement
            if was_member {
                ids.insert(self.course_id.clone());
            } else {
                ids.remove(&self.course_id);
            }
            return Err(e);
        }
        Ok(was_member)
    }

    fn inverse(&mut self, was_member: bool) -> RollbackStatus {
        let mut ids = self.ids.lock();
        if was_member {
            ids.insert(self.course_id.clone());
        } else {
            ids.remove(&self.course_id);
        }
        if let Err(e) = persist(self.store.as_ref(), &ids) {
            tracing::warn!(course_id = %self.course_id, error = %e, "Failed to persist wishlist rollback");
        }
        RollbackStatus::Restored
    }
}

/// Wishlist service implementation.
pub struct WishlistServiceImpl {
    ids: IdSet,
    store: Arc<dyn KeyValueStore>,
    http: Arc<dyn HttpClient>,
    mutator: OptimisticMutator,
    session: RwLock<Option<SessionToken>>,
}

impl WishlistServiceImpl {
    /// Create the service, loading the persisted set.
    ///
    /// Unreadable or corrupt data starts an empty wishlist.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        http: Arc<dyn HttpClient>,
        mutator: OptimisticMutator,
    ) -> Self {
        let ids = Self::load(store.as_ref());
        tracing::debug!(count = ids.len(), "Wishlist loaded");
        Self {
            ids: Arc::new(Mutex::new(ids)),
            store,
            http,
            mutator,
            session: RwLock::new(None),
        }
    }

    /// Attach the session used for remote calls.
    pub fn set_session(&self, token: Option<SessionToken>) {
        *self.session.write() = token;
    }

    fn load(store: &dyn KeyValueStore) -> BTreeSet<CourseId> {
        match store.load(WISHLIST_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CourseId>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Corrupt wishlist in storage, starting empty");
                    BTreeSet::new()
                }
            },
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read wishlist, starting empty");
                BTreeSet::new()
            }
        }
    }

    /// Flip membership of `id` and confirm it with `remote`.
    ///
    /// `remote` receives the intent derived from the membership at the time
    /// the flip is applied.
    pub async fn toggle_with<R, Fut, T, E>(&self, id: &CourseId, remote: R) -> Result<T, SyncError>
    where
        R: FnOnce(WishlistIntent) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let command = WishlistToggle {
            ids: self.ids.clone(),
            store: self.store.clone(),
            course_id: id.clone(),
        };

        // The intent is only known once the forward step has run under the key lock
        let ids = self.ids.clone();
        let course_id = id.clone();
        let remote = async move {
            let intent = if ids.lock().contains(&course_id) {
                WishlistIntent::Add
            } else {
                WishlistIntent::Remove
            };
            remote(intent).await
        };

        self.mutator.perform(command, remote).await
    }

    fn request_for(&self, id: &CourseId, intent: WishlistIntent) -> HttpRequest {
        let request = match intent {
            WishlistIntent::Add => HttpRequest::new(HttpMethod::Post, "/wishlist")
                .json(json!({ "courseId": id })),
            WishlistIntent::Remove => {
                HttpRequest::new(HttpMethod::Delete, format!("/wishlist/{}", id))
            }
        };
        match self.session.read().clone() {
            Some(token) => request.bearer(token),
            None => request,
        }
    }
}

#[async_trait]
impl WishlistService for WishlistServiceImpl {
    fn contains(&self, id: &CourseId) -> bool {
        self.ids.lock().contains(id)
    }

    fn ids(&self) -> Vec<CourseId> {
        self.ids.lock().iter().cloned().collect()
    }

    async fn toggle(&self, id: &CourseId) -> Result<WishlistIntent, SyncError> {
        let http = self.http.clone();
        let add = self.request_for(id, WishlistIntent::Add);
        let remove = self.request_for(id, WishlistIntent::Remove);

        let intent = self
            .toggle_with(id, move |intent| async move {
                let request = match intent {
                    WishlistIntent::Add => add,
                    WishlistIntent::Remove => remove,
                };
                http.send(request).await?.error_for_status()?;
                Ok::<_, SyncError>(intent)
            })
            .await?;

        tracing::info!(course_id = %id, ?intent, "Wishlist updated");
        Ok(intent)
    }
}
