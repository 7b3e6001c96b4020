//! Push channel lifecycle tests.

use pretty_assertions::assert_eq;
use serde_json::json;

use course_sync::domain::{ConnectionState, ControlMessage, SessionToken, Topic};

use crate::common::{course, settle, TestApp, TOKEN};

fn subscribes(topics: &[Topic]) -> Vec<ControlMessage> {
    topics
        .iter()
        .map(|topic| ControlMessage::Subscribe { topic: *topic })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_connect_sends_token_and_subscribes_every_topic() {
    let mut test = TestApp::new();
    let mut server = test.connect().await;

    assert_eq!(server.token, SessionToken::new(TOKEN));
    settle().await;
    assert_eq!(server.drain_controls(), subscribes(&Topic::ALL));
    assert_eq!(test.app.sync.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_reconnects_and_resubscribes() {
    let mut test = TestApp::new();
    let mut first = test.connect().await;
    let first_id = test.app.sync.connection().connection_id();
    settle().await;
    first.drain_controls();

    first.close("server restart");
    test.wait_for(ConnectionState::Reconnecting).await;

    let mut second = test.next_server().await;
    test.wait_for(ConnectionState::Connected).await;
    settle().await;

    assert_eq!(second.drain_controls(), subscribes(&Topic::ALL));
    assert_ne!(test.app.sync.connection().connection_id(), first_id);
    assert_eq!(test.transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_events_flow_after_reconnect() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let first = test.connect().await;

    test.transport.fail_next(2);
    drop(first);
    let second = test.next_server().await;
    test.wait_for(ConnectionState::Connected).await;

    second.push(
        Topic::CourseEnrolled,
        json!({ "courseId": "c1", "enrollmentCount": 12 }),
    );
    settle().await;

    assert_eq!(test.transport.attempts(), 4);
    assert_eq!(
        test.app.sync.cache().get(&"c1".into()).unwrap().enrollment_count,
        12
    );
}

#[tokio::test(start_paused = true)]
async fn test_new_token_restarts_channel_keeping_subscriptions() {
    let mut test = TestApp::new();
    let _first = test.connect().await;

    test.app.connect(SessionToken::new("rotated")).await;
    let mut second = test.next_server().await;
    test.wait_for(ConnectionState::Connected).await;
    settle().await;

    assert_eq!(second.token, SessionToken::new("rotated"));
    assert_eq!(second.drain_controls(), subscribes(&Topic::ALL));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_with_same_token_is_ignored() {
    let mut test = TestApp::new();
    let _server = test.connect().await;

    test.app.connect(SessionToken::new(TOKEN)).await;
    settle().await;

    assert_eq!(test.transport.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_do_not_break_the_channel() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let server = test.connect().await;

    server.push_raw("not json at all");
    server.push_raw(r#"{"topic":"course:teleported","payload":{}}"#);
    server.push(Topic::CourseReviewed, json!({ "courseId": "c1", "averageRating": 9.5, "reviewCount": 3 }));
    server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 11 }));
    settle().await;

    let record = test.app.sync.cache().get(&"c1".into()).unwrap();
    assert_eq!(record.enrollment_count, 11);
    assert_eq!(record.rating.average, 4.2);
    assert_eq!(test.app.sync.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_unsubscribes_and_silences_handlers() {
    let mut test = TestApp::new();
    test.app.sync.cache().load(vec![course("c1", 10)]);
    let mut server = test.connect().await;
    settle().await;
    server.drain_controls();

    test.app.shutdown().await;

    let unsubscribed: Vec<ControlMessage> = server.drain_controls();
    assert_eq!(
        unsubscribed,
        Topic::ALL
            .iter()
            .map(|topic| ControlMessage::Unsubscribe { topic: *topic })
            .collect::<Vec<_>>()
    );
    assert_eq!(test.app.sync.state(), ConnectionState::Disconnected);

    server.push(Topic::CourseEnrolled, json!({ "courseId": "c1", "enrollmentCount": 99 }));
    settle().await;
    assert_eq!(
        test.app.sync.cache().get(&"c1".into()).unwrap().enrollment_count,
        10
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_backoff_stops_reconnecting() {
    let mut test = TestApp::new();
    test.transport.fail_next(u32::MAX);
    test.app.connect(SessionToken::new(TOKEN)).await;
    test.wait_for(ConnectionState::Reconnecting).await;

    test.app.shutdown().await;
    let attempts = test.transport.attempts();
    tokio::time::sleep(std::time::Duration::from_secs(120)).await;

    assert_eq!(test.transport.attempts(), attempts);
    assert_eq!(test.app.sync.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_state_changes_are_broadcast_in_order() {
    let mut test = TestApp::new();
    let mut changes = test.app.sync.connection().state_changes();
    test.transport.fail_next(1);

    let _server = test.connect().await;
    test.app.shutdown().await;

    let mut visited = Vec::new();
    while let Ok(change) = changes.try_recv() {
        assert_ne!(change.from, change.to);
        visited.push(change.to);
    }
    assert_eq!(
        visited,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
}
