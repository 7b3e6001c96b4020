//! End-to-end reconciliation, subscription and optimistic mutation scenarios.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use course_sync::application::services::{CourseAdminService, WishlistService, WISHLIST_STORAGE_KEY};
use course_sync::domain::{
    ControlMessage, CoursePatch, HttpMethod, KeyValueStore, SessionToken, TransientKind, Topic,
};
use course_sync::infrastructure::storage::MemoryStore;
use course_sync::shared::SyncError;

use crate::common::{course, settle, test_settings, TestApp};

#[tokio::test(start_paused = true)]
async fn test_enrollment_event_updates_record_and_expires_indicator() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let before = test.app.sync.cache().get(&"c1".into()).unwrap();
    let server = test.connect().await;

    server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 11 }));
    settle().await;

    let after = test.app.sync.cache().get(&"c1".into()).unwrap();
    assert_eq!(after.enrollment_count, 11);
    assert_eq!(after.rating, before.rating);
    assert_eq!(after.is_trending, before.is_trending);
    assert_eq!(after.title, before.title);
    assert_eq!(after.price_cents, before.price_cents);

    let indicator = test.app.sync.transient().get("c1").unwrap();
    assert_eq!(indicator.kind, TransientKind::Enrollment);

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert!(test.app.sync.transient().get("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_enrollment_supersedes_indicator() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let server = test.connect().await;

    server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 11 }));
    settle().await;
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 12 }));
    settle().await;

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let indicator = test.app.sync.transient().get("c1").unwrap();
    assert_eq!(indicator.payload["enrollmentCount"], json!(12));
    assert_eq!(test.app.sync.transient().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_delivery_is_idempotent() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let server = test.connect().await;

    let payload = json!({ "courseId": "c1", "averageRating": 4.9, "reviewCount": 40 });
    server.push(Topic::CourseReviewed, payload.clone());
    settle().await;
    let once = test.app.sync.cache().get(&"c1".into()).unwrap();

    server.push(Topic::CourseReviewed, payload);
    settle().await;
    let twice = test.app.sync.cache().get(&"c1".into()).unwrap();

    assert_eq!(*once, *twice);
    assert_eq!(twice.enrollment_count, 10);
}

#[tokio::test(start_paused = true)]
async fn test_event_for_uncached_course_is_dropped() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let server = test.connect().await;

    server.push(Topic::CourseTrending, json!({ "courseId": "nope", "isTrending": true }));
    settle().await;

    assert_eq!(test.app.sync.cache().snapshot().len(), 1);
    assert!(test.app.sync.transient().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_ref_counting_over_the_wire() {
    let mut test = TestApp::new();
    // Release the built-in handlers so the topic starts unattached
    test.app.sync.shutdown().await;

    let mut server = test.connect().await;
    settle().await;
    assert!(server.drain_controls().is_empty());

    let registry = test.app.sync.registry();
    let handles: Vec<_> = (0..3)
        .map(|_| registry.subscribe(Topic::CourseTrending, |_| {}))
        .collect();
    assert_eq!(registry.ref_count(Topic::CourseTrending), 3);

    handles[0].unsubscribe();
    handles[1].unsubscribe();
    assert_eq!(registry.ref_count(Topic::CourseTrending), 1);

    // Second call on the same handle is a no-op
    assert!(!handles[1].unsubscribe());
    assert_eq!(registry.ref_count(Topic::CourseTrending), 1);

    handles[2].unsubscribe();
    assert_eq!(registry.ref_count(Topic::CourseTrending), 0);
    assert!(!handles[2].unsubscribe());
    settle().await;

    assert_eq!(
        server.drain_controls(),
        vec![
            ControlMessage::Subscribe {
                topic: Topic::CourseTrending
            },
            ControlMessage::Unsubscribe {
                topic: Topic::CourseTrending
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_wishlist_toggle_reverts_membership() {
    let store = Arc::new(MemoryStore::new());
    store.save(WISHLIST_STORAGE_KEY, r#"["a","x"]"#).unwrap();
    let test = TestApp::with_store(test_settings(), store);
    test.app.connect(SessionToken::new("tok")).await;

    for _ in 0..2 {
        let before = test.app.wishlist.ids();
        test.http.respond(422, json!({ "message": "wishlist is full" }));

        let result = test.app.wishlist.toggle(&"x".into()).await;

        match result {
            Err(SyncError::Mutation { reason, .. }) => assert!(reason.contains("wishlist is full")),
            other => panic!("expected mutation error, got {:?}", other),
        }
        assert_eq!(test.app.wishlist.ids(), before);
        assert_eq!(
            test.store.load(WISHLIST_STORAGE_KEY).unwrap().as_deref(),
            Some(r#"["a","x"]"#)
        );
    }

    let sent = test.http.requests();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|r| r.method == HttpMethod::Delete));
    assert!(sent.iter().all(|r| r.auth == Some(SessionToken::new("tok"))));
}

#[tokio::test(start_paused = true)]
async fn test_wishlist_toggle_from_empty_reverts_to_empty() {
    let test = TestApp::new();
    test.http.fail(SyncError::Http("connection reset".into()));

    let result = test.app.wishlist.toggle(&"x".into()).await;

    assert!(result.is_err());
    assert!(!test.app.wishlist.contains(&"x".into()));
    assert_eq!(
        test.store.load(WISHLIST_STORAGE_KEY).unwrap().as_deref(),
        Some("[]")
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_bulk_patch_restores_records_exactly() {
    let mut test = TestApp::new();
    test.app
        .sync
        .cache()
        .load(vec![course("c1", 10), course("c2", 20)]);
    let _server = test.connect().await;
    let before = test.app.sync.cache().snapshot();
    test.http.respond(500, json!({}));

    let result = test
        .app
        .course_admin
        .bulk_patch(&["c1".into(), "c2".into()], CoursePatch::trending(true))
        .await;

    assert!(matches!(result, Err(SyncError::Mutation { .. })));
    let after = test.app.sync.cache().snapshot();
    for id in ["c1", "c2"] {
        assert_eq!(after.get(&id.into()), before.get(&id.into()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_server_update_during_optimistic_patch_is_kept() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let server = test.connect().await;
    let cache = test.app.sync.cache().clone();

    let result = test
        .app
        .course_admin
        .bulk_patch_with(&["c1".into()], CoursePatch::enrollment_count(11), async {
            assert_eq!(cache.get(&"c1".into()).unwrap().enrollment_count, 11);
            server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 15 }));
            settle().await;
            Err::<(), _>("gateway timeout")
        })
        .await;

    assert!(result.is_err());
    assert_eq!(cache.get(&"c1".into()).unwrap().enrollment_count, 15);
}
