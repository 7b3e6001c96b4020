//! Wiring of the realtime components.
//!
//! `RealtimeSync` is built once per client session and passed by reference to
//! whatever needs it. It connects the push channel to the stores:
//!
//! ```text
//! frame -> ConnectionManager -> SubscriptionRegistry -> CacheReconciler -> TransientEventQueue
//!                                                    -> NotificationStore
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use super::cache_reconciler::{CacheReconciler, CourseCache};
use super::connection_manager::ConnectionManager;
use super::notification_store::NotificationStore;
use super::optimistic_mutator::OptimisticMutator;
use super::subscription_registry::{SubscriptionHandle, SubscriptionRegistry};
use super::transient_queue::TransientEventQueue;
use crate::config::Settings;
use crate::domain::{
    ConnectionState, InboundEvent, NotificationAlerter, PushTransport, SessionToken,
    TransientEvent, Topic,
};

pub struct RealtimeSync {
    registry: SubscriptionRegistry,
    connection: ConnectionManager,
    cache: Arc<CourseCache>,
    reconciler: CacheReconciler,
    notifications: Arc<NotificationStore>,
    transient: TransientEventQueue,
    mutator: OptimisticMutator,
    handles: Mutex<Vec<SubscriptionHandle>>,
}

impl RealtimeSync {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        settings: &Settings,
        alerter: Option<Arc<dyn NotificationAlerter>>,
    ) -> Self {
        let registry = SubscriptionRegistry::new();
        let connection =
            ConnectionManager::new(transport, registry.clone(), settings.reconnect.clone());
        let cache = Arc::new(CourseCache::new());

        let mut notifications = NotificationStore::new(settings.notifications.capacity);
        if let Some(alerter) = alerter {
            notifications = notifications.with_alerter(alerter);
        }

        Self {
            registry,
            connection,
            reconciler: CacheReconciler::new(cache.clone()),
            cache,
            notifications: Arc::new(notifications),
            transient: TransientEventQueue::new(settings.transient.ttl()),
            mutator: OptimisticMutator::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register the store handlers. Calling it again while started does nothing.
    ///
    /// Handles released behind our back (a direct connection teardown) count
    /// as stopped and are replaced.
    ///
    /// Returns the number of handlers registered by this call.
    pub fn start(&self) -> usize {
        let mut handles = self.handles.lock();
        if handles.iter().any(SubscriptionHandle::is_active) {
            return 0;
        }
        handles.clear();

        for topic in Topic::COURSE {
            let reconciler = self.reconciler.clone();
            let transient = self.transient.clone();
            handles.push(self.registry.subscribe(topic, move |event: &InboundEvent| {
                let outcome = reconciler.apply_event(event);
                if !outcome.matched() {
                    return;
                }
                if let Some(course_id) = event.course_id() {
                    transient.publish(TransientEvent::new(
                        course_id.as_str(),
                        event.transient_kind(),
                        event.payload(),
                    ));
                }
            }));
        }

        let notifications = self.notifications.clone();
        handles.push(
            self.registry
                .subscribe(Topic::Notification, move |event: &InboundEvent| {
                    if let InboundEvent::Notification(payload) = event {
                        notifications.ingest(payload.clone().into_notification());
                    }
                }),
        );

        tracing::debug!(handlers = handles.len(), "Realtime handlers registered");
        handles.len()
    }

    /// Open (or re-key) the push channel. See [`ConnectionManager::connect`].
    pub async fn connect(&self, token: SessionToken) -> bool {
        self.connection.connect(token).await
    }

    /// Tear the session down: subscriptions, channel and pending transient events.
    pub async fn shutdown(&self) {
        self.connection.teardown().await;
        self.handles.lock().clear();
        self.transient.shutdown();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn cache(&self) -> &Arc<CourseCache> {
        &self.cache
    }

    pub fn reconciler(&self) -> &CacheReconciler {
        &self.reconciler
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }

    pub fn transient(&self) -> &TransientEventQueue {
        &self.transient
    }

    pub fn mutator(&self) -> &OptimisticMutator {
        &self.mutator
    }
}

impl std::fmt::Debug for RealtimeSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSync")
            .field("connection", &self.connection)
            .field("cache", &self.cache)
            .field("notifications", &self.notifications)
            .field("transient", &self.transient)
            .finish()
    }
}
