//! Application Startup
//!
//! Builds the realtime stack and services from settings.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::application::realtime::RealtimeSync;
use crate::application::services::{
    CatalogService, CatalogServiceImpl, CourseAdminServiceImpl, InitialLoad, WishlistServiceImpl,
};
use crate::config::Settings;
use crate::domain::{HttpClient, KeyValueStore, NotificationAlerter, PushTransport, SessionToken};
use crate::infrastructure::alerts::{LogAlerter, NoopAlerter};
use crate::infrastructure::http::ReqwestHttpClient;
use crate::infrastructure::storage::FileStore;
use crate::infrastructure::transport::WebSocketTransport;

/// Application instance
pub struct Application {
    pub sync: Arc<RealtimeSync>,
    pub catalog: Arc<CatalogServiceImpl>,
    pub wishlist: Arc<WishlistServiceImpl>,
    pub course_admin: Arc<CourseAdminServiceImpl>,
    pub settings: Arc<Settings>,
}

impl Application {
    /// Build the application with the production collaborators
    pub fn build(settings: Settings) -> Result<Self> {
        let transport = Arc::new(WebSocketTransport::from_settings(&settings.push));
        tracing::info!(url = %transport.url(), "Push transport configured");

        let http = Arc::new(
            ReqwestHttpClient::new(&settings.http).context("Failed to build HTTP client")?,
        );
        let store = Arc::new(
            FileStore::open(&settings.storage.data_dir).context("Failed to open local storage")?,
        );
        tracing::info!(data_dir = %store.root().display(), "Local storage ready");

        Ok(Self::with_collaborators(settings, transport, http, store))
    }

    /// Build the application around caller-supplied collaborators
    pub fn with_collaborators(
        settings: Settings,
        transport: Arc<dyn PushTransport>,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let alerter: Arc<dyn NotificationAlerter> = if settings.notifications.platform_alerts {
            Arc::new(LogAlerter)
        } else {
            Arc::new(NoopAlerter)
        };

        let sync = Arc::new(RealtimeSync::new(transport, &settings, Some(alerter)));
        sync.start();

        let catalog = Arc::new(CatalogServiceImpl::new(
            sync.cache().clone(),
            sync.notifications().clone(),
            http.clone(),
        ));
        let wishlist = Arc::new(WishlistServiceImpl::new(
            store,
            http.clone(),
            sync.mutator().clone(),
        ));
        let course_admin = Arc::new(CourseAdminServiceImpl::new(
            sync.cache().clone(),
            http,
            sync.mutator().clone(),
        ));

        Self {
            sync,
            catalog,
            wishlist,
            course_admin,
            settings: Arc::new(settings),
        }
    }

    /// Open the push channel and hand the session to the services
    pub async fn connect(&self, token: SessionToken) {
        self.catalog.set_session(Some(token.clone()));
        self.wishlist.set_session(Some(token.clone()));
        self.course_admin.set_session(Some(token.clone()));
        self.sync.connect(token).await;
    }

    /// Pull the course catalog and notifications that push events merge into
    pub async fn load_initial(&self) -> InitialLoad {
        self.catalog.load_initial().await
    }

    /// Tear everything down
    pub async fn shutdown(&self) {
        self.catalog.set_session(None);
        self.wishlist.set_session(None);
        self.course_admin.set_session(None);
        self.sync.shutdown().await;
    }
}
