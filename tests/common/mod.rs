//! Common Test Utilities
//!
//! Channel-backed push transport, scripted HTTP client and application fixtures.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use course_sync::config::Settings;
use course_sync::domain::{
    ConnectionState, ControlMessage, CourseRecord, HttpClient, HttpRequest, HttpResponse,
    InboundFrame, PushChannel, PushTransport, Rating, SessionToken, Topic,
};
use course_sync::infrastructure::storage::MemoryStore;
use course_sync::shared::SyncError;
use course_sync::startup::Application;

pub const TOKEN: &str = "session-token";

/// Server end of one accepted push channel.
pub struct ServerConnection {
    pub token: SessionToken,
    control: mpsc::UnboundedReceiver<ControlMessage>,
    frames: mpsc::UnboundedSender<InboundFrame>,
}

impl ServerConnection {
    /// Push one event frame.
    pub fn push(&self, topic: Topic, payload: Value) {
        let frame = json!({ "topic": topic.as_str(), "payload": payload }).to_string();
        self.push_raw(&frame);
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.frames.send(InboundFrame::Text(text.to_string()));
    }

    /// Server-initiated close
    pub fn close(&self, reason: &str) {
        let _ = self.frames.send(InboundFrame::Closed {
            reason: Some(reason.to_string()),
        });
    }

    pub async fn next_control(&mut self) -> Option<ControlMessage> {
        tokio::time::timeout(Duration::from_secs(5), self.control.recv())
            .await
            .ok()
            .flatten()
    }

    /// Control messages received so far
    pub fn drain_controls(&mut self) -> Vec<ControlMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.control.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Push transport whose connections are handed to the test.
pub struct MockTransport {
    failures: Mutex<u32>,
    attempts: AtomicU32,
    accepted: mpsc::UnboundedSender<ServerConnection>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConnection>) {
        let (accepted, servers) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            failures: Mutex::new(0),
            attempts: AtomicU32::new(0),
            accepted,
        });
        (transport, servers)
    }

    /// Refuse the next `count` handshakes.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock() = count;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn open(&self, token: &SessionToken) -> Result<PushChannel, SyncError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SyncError::Connection("handshake refused".into()));
            }
        }

        let (outbound, control) = mpsc::unbounded_channel();
        let (frames, inbound) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerConnection {
            token: token.clone(),
            control,
            frames,
        });
        Ok(PushChannel { outbound, inbound })
    }
}

/// HTTP client answering from a script; 200 with an empty body when the script is empty.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, SyncError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn respond(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .push_back(Ok(HttpResponse { status, json: body }));
    }

    pub fn fail(&self, error: SyncError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SyncError> {
        self.requests.lock().push(request);
        self.responses.lock().pop_front().unwrap_or(Ok(HttpResponse {
            status: 200,
            json: Value::Null,
        }))
    }
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::defaults().expect("default settings are valid");
    settings.reconnect.base_delay_ms = 100;
    settings.reconnect.max_delay_ms = 1_000;
    settings.reconnect.jitter_factor = 0.0;
    settings.notifications.platform_alerts = false;
    settings
}

pub fn course(id: &str, enrollment_count: u64) -> CourseRecord {
    let mut record = CourseRecord::new(id, format!("Course {}", id));
    record.instructor = Some("Grace Hopper".into());
    record.price_cents = 4_900;
    record.enrollment_count = enrollment_count;
    record.rating = Rating {
        average: 4.2,
        count: 31,
    };
    record
}

/// Application wired to the mock transport, scripted HTTP and memory storage.
pub struct TestApp {
    pub app: Application,
    pub transport: Arc<MockTransport>,
    pub servers: mpsc::UnboundedReceiver<ServerConnection>,
    pub http: Arc<ScriptedHttpClient>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::with_store(settings, Arc::new(MemoryStore::new()))
    }

    /// Build around a pre-seeded store.
    pub fn with_store(settings: Settings, store: Arc<MemoryStore>) -> Self {
        let (transport, servers) = MockTransport::new();
        let http = Arc::new(ScriptedHttpClient::default());
        let app = Application::with_collaborators(
            settings,
            transport.clone(),
            http.clone(),
            store.clone(),
        );
        Self {
            app,
            transport,
            servers,
            http,
            store,
        }
    }

    /// Connect with [`TOKEN`] and return the accepted server side.
    pub async fn connect(&mut self) -> ServerConnection {
        self.app.connect(SessionToken::new(TOKEN)).await;
        let server = self.next_server().await;
        self.wait_for(ConnectionState::Connected).await;
        server
    }

    pub async fn next_server(&mut self) -> ServerConnection {
        tokio::time::timeout(Duration::from_secs(30), self.servers.recv())
            .await
            .expect("no connection accepted in time")
            .expect("transport dropped")
    }

    pub async fn wait_for(&self, state: ConnectionState) {
        tokio::time::timeout(
            Duration::from_secs(30),
            self.app.sync.connection().wait_until(state),
        )
        .await
        .expect("state not reached in time")
        .expect("state channel closed");
    }
}

/// Let the supervisor drain queued frames.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
