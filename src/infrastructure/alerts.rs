//! Platform alert implementations.

use crate::domain::{Notification, NotificationAlerter};

/// Discards every offer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlerter;

impl NotificationAlerter for NoopAlerter {
    fn offer(&self, _notification: &Notification) {}
}

/// Surfaces notifications through the log; used by the headless binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerter;

impl NotificationAlerter for LogAlerter {
    fn offer(&self, notification: &Notification) {
        tracing::info!(
            notification_id = %notification.id,
            kind = %notification.kind,
            title = %notification.title,
            action_url = notification.action_url.as_deref().unwrap_or(""),
            "{}",
            notification.message
        );
    }
}
