//! Subscription Registry
//!
//! Ref-counted map from topic to handlers. A topic is attached to the live
//! push channel at most once, no matter how many consumers subscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::{ControlMessage, InboundEvent, Topic};
use crate::shared::error::SyncError;

/// Callback invoked for every event on a topic
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    handler: EventHandler,
}

struct RegistryInner {
    /// Handlers per topic in subscription order
    topics: Mutex<HashMap<Topic, Vec<HandlerEntry>>>,
    /// Outbound side of the live connection, if any
    link: Mutex<Option<mpsc::UnboundedSender<ControlMessage>>>,
    next_id: AtomicU64,
}

/// Topic registry shared between consumers and the connection manager.
///
/// Lock order is always `topics` then `link`.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                topics: Mutex::new(HashMap::new()),
                link: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for `topic`.
    ///
    /// On the first subscriber the topic is attached to the live connection.
    /// The returned handle removes exactly this handler.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.inner.topics.lock();
        let handlers = topics.entry(topic).or_default();
        handlers.push(HandlerEntry {
            id,
            handler: Arc::new(handler),
        });
        let ref_count = handlers.len();

        if ref_count == 1 {
            self.send_control(ControlMessage::Subscribe { topic });
        }
        drop(topics);

        tracing::debug!(topic = %topic, handler_id = id, ref_count, "Handler subscribed");

        SubscriptionHandle {
            registry: Arc::downgrade(&self.inner),
            topic,
            id,
            released: AtomicBool::new(false),
        }
    }

    /// Invoke every handler of the event's topic in subscription order.
    ///
    /// The handler list is captured before the first call, so a handler that
    /// unsubscribes mid-dispatch still sees this event once.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let topic = event.topic();
        let handlers: Vec<EventHandler> = {
            let topics = self.inner.topics.lock();
            match topics.get(&topic) {
                Some(entries) => entries.iter().map(|e| e.handler.clone()).collect(),
                None => Vec::new(),
            }
        };

        for handler in &handlers {
            handler(event);
        }

        tracing::trace!(topic = %topic, handlers = handlers.len(), "Event dispatched");
        handlers.len()
    }

    /// Number of live handlers on `topic`
    pub fn ref_count(&self, topic: Topic) -> usize {
        self.inner
            .topics
            .lock()
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Topics with at least one handler, sorted
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.inner.topics.lock().keys().copied().collect();
        topics.sort();
        topics
    }

    /// Whether an outbound link is attached
    pub fn is_linked(&self) -> bool {
        self.inner.link.lock().is_some()
    }

    /// Attach a freshly opened connection and re-issue every active topic.
    ///
    /// Returns the number of subscribe messages sent.
    pub fn attach_link(&self, link: mpsc::UnboundedSender<ControlMessage>) -> usize {
        let topics = self.inner.topics.lock();
        let mut slot = self.inner.link.lock();
        *slot = Some(link);

        let mut active: Vec<Topic> = topics.keys().copied().collect();
        active.sort();

        let mut sent = 0;
        if let Some(link) = slot.as_ref() {
            for topic in active {
                if Self::send_on(link, ControlMessage::Subscribe { topic }) {
                    sent += 1;
                }
            }
        }

        tracing::debug!(topics = sent, "Connection attached, topics re-issued");
        sent
    }

    /// Forget the outbound link. Subscriptions stay registered.
    pub fn detach_link(&self) {
        self.inner.link.lock().take();
    }

    /// Drop every handler and detach every topic.
    ///
    /// Outstanding handles become no-ops. Returns the number of handlers released.
    pub fn release_all(&self) -> usize {
        let mut topics = self.inner.topics.lock();
        let mut released = 0;
        let mut drained: Vec<(Topic, Vec<HandlerEntry>)> = topics.drain().collect();
        drained.sort_by_key(|(topic, _)| *topic);

        for (topic, handlers) in drained {
            released += handlers.len();
            self.send_control(ControlMessage::Unsubscribe { topic });
        }
        drop(topics);

        tracing::debug!(handlers = released, "All subscriptions released");
        released
    }

    fn send_control(&self, message: ControlMessage) {
        let link = self.inner.link.lock();
        if let Some(link) = link.as_ref() {
            Self::send_on(link, message);
        }
    }

    fn send_on(link: &mpsc::UnboundedSender<ControlMessage>, message: ControlMessage) -> bool {
        let topic = message.topic();
        match link.send(message) {
            Ok(()) => true,
            Err(_) => {
                let err = SyncError::Subscription {
                    topic: topic.as_str().to_string(),
                    reason: "connection closed".into(),
                };
                tracing::warn!(error = %err, "Topic attach deferred to next reconnect");
                false
            }
        }
    }
}

impl RegistryInner {
    fn contains(&self, topic: Topic, id: u64) -> bool {
        self.topics
            .lock()
            .get(&topic)
            .is_some_and(|handlers| handlers.iter().any(|e| e.id == id))
    }

    /// Remove one handler; detaches the topic when it was the last one.
    fn remove(&self, topic: Topic, id: u64) -> bool {
        let mut topics = self.topics.lock();
        let Some(handlers) = topics.get_mut(&topic) else {
            return false;
        };
        let Some(position) = handlers.iter().position(|e| e.id == id) else {
            return false;
        };
        handlers.remove(position);

        if handlers.is_empty() {
            topics.remove(&topic);
            let link = self.link.lock();
            if let Some(link) = link.as_ref() {
                SubscriptionRegistry::send_on(link, ControlMessage::Unsubscribe { topic });
            }
        }
        true
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.active_topics())
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// Disposer returned by [`SubscriptionRegistry::subscribe`].
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is a no-op.
/// Dropping the handle unsubscribes as well.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct SubscriptionHandle {
    registry: Weak<RegistryInner>,
    topic: Topic,
    id: u64,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Remove this handler. Returns `true` only on the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        let removed = self
            .registry
            .upgrade()
            .map(|inner| inner.remove(self.topic, self.id))
            .unwrap_or(false);

        tracing::debug!(topic = %self.topic, handler_id = self.id, removed, "Handler unsubscribed");
        removed
    }

    /// Still registered: not unsubscribed and not swept by `release_all`.
    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::Acquire)
            && self
                .registry
                .upgrade()
                .is_some_and(|inner| inner.contains(self.topic, self.id))
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CourseEnrolledEvent, NotificationEvent};
    use pretty_assertions::assert_eq;

    fn enrolled(count: u64) -> InboundEvent {
        InboundEvent::CourseEnrolled(CourseEnrolledEvent {
            course_id: "c1".into(),
            enrollment_count: count,
        })
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ControlMessage>) -> Vec<ControlMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_topic_attached_once_for_many_subscribers() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach_link(tx);

        let handles: Vec<_> = (0..3)
            .map(|_| registry.subscribe(Topic::CourseEnrolled, |_| {}))
            .collect();

        assert_eq!(registry.ref_count(Topic::CourseEnrolled), 3);
        assert_eq!(
            drain(&mut rx),
            vec![ControlMessage::Subscribe {
                topic: Topic::CourseEnrolled
            }]
        );
        drop(handles);
    }

    #[test]
    fn test_n_subscribes_n_unsubscribes_detaches() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach_link(tx);

        let handles: Vec<_> = (0..4)
            .map(|_| registry.subscribe(Topic::Notification, |_| {}))
            .collect();
        drain(&mut rx);

        for handle in &handles[..3] {
            assert!(handle.unsubscribe());
        }
        assert_eq!(registry.ref_count(Topic::Notification), 1);
        assert_eq!(registry.active_topics(), vec![Topic::Notification]);
        assert!(drain(&mut rx).is_empty());

        assert!(handles[3].unsubscribe());
        assert_eq!(registry.ref_count(Topic::Notification), 0);
        assert!(registry.active_topics().is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![ControlMessage::Unsubscribe {
                topic: Topic::Notification
            }]
        );
    }

    #[test]
    fn test_double_unsubscribe_is_noop() {
        let registry = SubscriptionRegistry::new();
        let first = registry.subscribe(Topic::CourseTrending, |_| {});
        let second = registry.subscribe(Topic::CourseTrending, |_| {});

        assert!(first.unsubscribe());
        assert!(!first.unsubscribe());
        assert_eq!(registry.ref_count(Topic::CourseTrending), 1);
        assert!(second.is_active());
        assert!(!first.is_active());
    }

    #[test]
    fn test_dispatch_is_fifo_by_subscription_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let order = order.clone();
                registry.subscribe(Topic::CourseEnrolled, move |_| order.lock().push(i))
            })
            .collect();

        assert_eq!(registry.dispatch(&enrolled(5)), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        drop(handles);
    }

    #[test]
    fn test_dispatch_only_reaches_matching_topic() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let _handle = registry.subscribe(Topic::Notification, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&enrolled(1));
        registry.dispatch(&InboundEvent::Notification(NotificationEvent {
            title: "t".into(),
            message: "m".into(),
            id: None,
            kind: None,
            action_url: None,
            created_at: None,
        }));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_calls_after_unsubscribe() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let handle = registry.subscribe(Topic::CourseEnrolled, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&enrolled(1));
        handle.unsubscribe();
        registry.dispatch(&enrolled(2));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_link_reissues_active_topics() {
        let registry = SubscriptionRegistry::new();
        let _a = registry.subscribe(Topic::CourseReviewed, |_| {});
        let _b = registry.subscribe(Topic::CourseEnrolled, |_| {});

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(registry.attach_link(tx), 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                ControlMessage::Subscribe {
                    topic: Topic::CourseEnrolled
                },
                ControlMessage::Subscribe {
                    topic: Topic::CourseReviewed
                },
            ]
        );
    }

    #[test]
    fn test_release_all_makes_handles_inert() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach_link(tx);
        let handle = registry.subscribe(Topic::CourseEnrolled, |_| {});
        drain(&mut rx);

        assert_eq!(registry.release_all(), 1);
        assert_eq!(registry.ref_count(Topic::CourseEnrolled), 0);
        assert_eq!(
            drain(&mut rx),
            vec![ControlMessage::Unsubscribe {
                topic: Topic::CourseEnrolled
            }]
        );

        // Re-subscribing after a release must not be undone by the stale handle
        let fresh = registry.subscribe(Topic::CourseEnrolled, |_| {});
        assert!(!handle.unsubscribe());
        assert_eq!(registry.ref_count(Topic::CourseEnrolled), 1);
        drop(fresh);
    }

    #[test]
    fn test_closed_link_keeps_subscription() {
        let registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach_link(tx);
        drop(rx);

        let _handle = registry.subscribe(Topic::CourseEnrolled, |_| {});
        assert_eq!(registry.ref_count(Topic::CourseEnrolled), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = SubscriptionRegistry::new();
        {
            let _handle = registry.subscribe(Topic::CourseEnrolled, |_| {});
            assert_eq!(registry.ref_count(Topic::CourseEnrolled), 1);
        }
        assert_eq!(registry.ref_count(Topic::CourseEnrolled), 0);
    }
}
