//! Notification delivery over the push channel.

use pretty_assertions::assert_eq;
use serde_json::json;

use course_sync::domain::{Notification, NotificationKind, Topic};

use crate::common::{settle, test_settings, TestApp};

fn push_notification(server: &crate::common::ServerConnection, id: &str) {
    server.push(
        Topic::Notification,
        json!({
            "id": id,
            "type": "assignment",
            "title": format!("Assignment {}", id),
            "message": "Due tomorrow",
            "actionUrl": format!("/assignments/{}", id),
        }),
    );
}

#[tokio::test(start_paused = true)]
async fn test_pushed_notification_is_stored_unread() {
    let mut test = TestApp::new();
    let server = test.connect().await;

    push_notification(&server, "n1");
    settle().await;

    let store = test.app.sync.notifications();
    let stored = store.get("n1").unwrap();
    assert_eq!(stored.kind, NotificationKind::Assignment);
    assert_eq!(stored.action_url.as_deref(), Some("/assignments/n1"));
    assert!(stored.is_unread());
    assert_eq!(store.unread_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_push_leaves_store_unchanged() {
    let mut test = TestApp::new();
    let server = test.connect().await;

    push_notification(&server, "n1");
    settle().await;
    let before = test.app.sync.notifications().snapshot();

    push_notification(&server, "n1");
    settle().await;

    assert_eq!(test.app.sync.notifications().snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_evicts_oldest_by_arrival() {
    let mut test = TestApp::new();
    let server = test.connect().await;
    let capacity = test.app.sync.notifications().capacity();

    for i in 0..capacity + 3 {
        push_notification(&server, &format!("n{}", i));
    }
    settle().await;

    let snapshot = test.app.sync.notifications().snapshot();
    assert_eq!(snapshot.items.len(), capacity);
    assert_eq!(snapshot.unread, capacity);
    for evicted in ["n0", "n1", "n2"] {
        assert!(!test.app.sync.notifications().contains(evicted));
    }
    assert_eq!(snapshot.items[0].id, format!("n{}", capacity + 2));
}

#[tokio::test(start_paused = true)]
async fn test_pushed_notification_without_id_gets_one() {
    let mut test = TestApp::new();
    let server = test.connect().await;

    server.push(
        Topic::Notification,
        json!({ "title": "Welcome", "message": "Thanks for joining" }),
    );
    settle().await;

    let snapshot = test.app.sync.notifications().snapshot();
    assert_eq!(snapshot.items.len(), 1);
    assert!(!snapshot.items[0].id.is_empty());
    assert_eq!(snapshot.items[0].kind, NotificationKind::Other);
}

#[tokio::test(start_paused = true)]
async fn test_mark_all_read_with_mixed_ledger() {
    let mut settings = test_settings();
    settings.notifications.capacity = 10;
    let test = TestApp::with_settings(settings);
    let store = test.app.sync.notifications();

    let mut fetched = Vec::new();
    for i in 0..8 {
        let mut notification =
            Notification::new(format!("n{}", i), NotificationKind::Course, "Update", "body");
        notification.read = i >= 5;
        fetched.push(notification);
    }
    store.replace_all(fetched);
    assert_eq!(store.unread_count(), 5);

    assert_eq!(store.mark_all_read(), 5);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.unread, 0);
    assert_eq!(snapshot.items.len(), 8);
    assert!(snapshot.items.iter().all(|n| n.read));
}
