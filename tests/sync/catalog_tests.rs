//! Initial pull of the course catalog and notifications.

use pretty_assertions::assert_eq;
use serde_json::json;

use course_sync::application::services::{
    CatalogService, InitialLoad, COURSES_ENDPOINT, NOTIFICATIONS_ENDPOINT,
};
use course_sync::domain::{HttpMethod, SessionToken, Topic};
use course_sync::shared::SyncError;

use crate::common::{settle, TestApp, TOKEN};

fn catalog() -> serde_json::Value {
    json!({ "courses": [
        { "id": "c1", "title": "Rust", "enrollmentCount": 10, "rating": { "average": 4.5, "count": 8 } },
        { "id": "c2", "title": "Go", "isTrending": true }
    ]})
}

fn ledger() -> serde_json::Value {
    json!([
        { "id": "n2", "type": "assignment", "title": "Essay due", "message": "Friday" },
        { "id": "n1", "type": "course", "title": "New lesson", "message": "Lesson 4", "read": true }
    ])
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_fills_cache_so_events_reconcile() {
    let mut test = TestApp::new();
    let server = test.connect().await;
    test.http.respond(200, catalog());
    test.http.respond(200, ledger());

    let loaded = test.app.load_initial().await;

    assert_eq!(
        loaded,
        InitialLoad {
            courses: Some(2),
            notifications: Some(2)
        }
    );
    let sent = test.http.requests();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r.method == HttpMethod::Get));
    assert_eq!(sent[0].endpoint, COURSES_ENDPOINT);
    assert_eq!(sent[1].endpoint, NOTIFICATIONS_ENDPOINT);
    assert!(sent.iter().all(|r| r.auth == Some(SessionToken::new(TOKEN))));
    assert_eq!(test.app.sync.notifications().unread_count(), 1);

    server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 11 }));
    settle().await;

    let record = test.app.sync.cache().get(&"c1".into()).unwrap();
    assert_eq!(record.enrollment_count, 11);
    assert_eq!(record.rating.count, 8);
    assert!(test.app.sync.transient().get("c1").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_notification_fetch_keeps_ledger() {
    let test = TestApp::new();
    test.app.connect(SessionToken::new(TOKEN)).await;
    test.http.respond(200, ledger());
    test.app.catalog.fetch_notifications().await.unwrap();
    let before = test.app.sync.notifications().snapshot();

    test.http.respond(500, json!({ "message": "database unavailable" }));
    let result = test.app.catalog.fetch_notifications().await;

    match result {
        Err(SyncError::Http(reason)) => assert!(reason.contains("database unavailable")),
        other => panic!("expected http error, got {:?}", other),
    }
    assert_eq!(test.app.sync.notifications().snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn test_course_failure_still_loads_notifications() {
    let test = TestApp::new();
    test.http.fail(SyncError::Http("connection refused".into()));
    test.http.respond(200, ledger());

    let loaded = test.app.load_initial().await;

    assert_eq!(loaded.courses, None);
    assert_eq!(loaded.notifications, Some(2));
    assert!(test.app.sync.cache().snapshot().is_empty());
}
