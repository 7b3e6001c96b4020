//! Catalog Service
//!
//! Initial pull of course records and notifications through the HTTP
//! collaborator. Full fetches are the only way records enter the course cache;
//! push events afterwards only merge into what was fetched here.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::application::realtime::{CourseCache, NotificationStore};
use crate::domain::{
    CourseRecord, HttpClient, HttpMethod, HttpRequest, Notification, SessionToken,
};
use crate::shared::error::SyncError;

pub const COURSES_ENDPOINT: &str = "/courses";
pub const NOTIFICATIONS_ENDPOINT: &str = "/notifications";

/// Result of [`CatalogService::load_initial`]. `None` marks a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitialLoad {
    pub courses: Option<usize>,
    pub notifications: Option<usize>,
}

impl InitialLoad {
    pub fn is_complete(&self) -> bool {
        self.courses.is_some() && self.notifications.is_some()
    }
}

/// Catalog service trait.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Replace the course cache with the server's list.
    ///
    /// On failure the cache is left as it was.
    async fn fetch_courses(&self) -> Result<usize, SyncError>;

    /// Replace the notification ledger with the server's list.
    ///
    /// On failure the last-known-good entries stay.
    async fn fetch_notifications(&self) -> Result<usize, SyncError>;

    /// Fetch both; a failure of one does not skip the other.
    async fn load_initial(&self) -> InitialLoad;
}

/// Catalog service implementation.
pub struct CatalogServiceImpl {
    cache: Arc<CourseCache>,
    notifications: Arc<NotificationStore>,
    http: Arc<dyn HttpClient>,
    session: RwLock<Option<SessionToken>>,
}

impl CatalogServiceImpl {
    pub fn new(
        cache: Arc<CourseCache>,
        notifications: Arc<NotificationStore>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            cache,
            notifications,
            http,
            session: RwLock::new(None),
        }
    }

    pub fn set_session(&self, token: Option<SessionToken>) {
        *self.session.write() = token;
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        field: &str,
    ) -> Result<Vec<T>, SyncError> {
        let mut request = HttpRequest::new(HttpMethod::Get, endpoint);
        if let Some(token) = self.session.read().clone() {
            request = request.bearer(token);
        }
        let response = self.http.send(request).await?.error_for_status()?;
        Ok(serde_json::from_value(list_body(response.json, field))?)
    }
}

/// Accept either a bare array or an envelope `{ "<field>": [...] }` / `{ "data": [...] }`.
fn list_body(json: Value, field: &str) -> Value {
    match json {
        Value::Object(mut map) => map
            .remove(field)
            .or_else(|| map.remove("data"))
            .unwrap_or(Value::Object(map)),
        other => other,
    }
}

#[async_trait]
impl CatalogService for CatalogServiceImpl {
    async fn fetch_courses(&self) -> Result<usize, SyncError> {
        let records: Vec<CourseRecord> = self.get_list(COURSES_ENDPOINT, "courses").await?;
        let count = self.cache.load(records);
        tracing::info!(count, "Course catalog loaded");
        Ok(count)
    }

    async fn fetch_notifications(&self) -> Result<usize, SyncError> {
        let count = self
            .notifications
            .refresh(self.get_list::<Notification>(NOTIFICATIONS_ENDPOINT, "notifications"))
            .await?;
        tracing::info!(count, "Notifications loaded");
        Ok(count)
    }

    async fn load_initial(&self) -> InitialLoad {
        let courses = match self.fetch_courses().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "Course catalog fetch failed");
                None
            }
        };
        let notifications = self.fetch_notifications().await.ok();
        InitialLoad {
            courses,
            notifications,
        }
    }
}
