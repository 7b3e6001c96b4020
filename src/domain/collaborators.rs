//! Collaborator contracts.
//!
//! The sync core talks to the outside world only through these traits. Concrete
//! adapters live in the infrastructure layer; tests substitute channel-backed or
//! mocked implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::entities::{Notification, SessionToken};
use super::events::ControlMessage;
use crate::shared::error::SyncError;

// ============================================================================
// Push transport
// ============================================================================

/// Frame received from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// JSON text frame carrying one event
    Text(String),
    /// Server closed the channel
    Closed { reason: Option<String> },
    /// Transport-level failure
    Error(String),
}

/// An open push channel.
///
/// Dropping `outbound` asks the transport to close; the inbound receiver yields
/// `None` once the underlying connection is gone.
#[derive(Debug)]
pub struct PushChannel {
    pub outbound: mpsc::UnboundedSender<ControlMessage>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Opens authenticated push channels.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Perform the handshake with `token` attached.
    ///
    /// # Errors
    ///
    /// `SyncError::Connection` when the handshake or transport fails.
    async fn open(&self, token: &SessionToken) -> Result<PushChannel, SyncError>;
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Request handed to the HTTP collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Endpoint path relative to the collaborator's base URL
    pub endpoint: String,
    pub body: Option<serde_json::Value>,
    pub auth: Option<SessionToken>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            auth: None,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: SessionToken) -> Self {
        self.auth = Some(token);
        self
    }
}

/// Response returned by the HTTP collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub json: serde_json::Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn non-2xx responses into `SyncError::Http`.
    pub fn error_for_status(self) -> Result<Self, SyncError> {
        if self.is_success() {
            Ok(self)
        } else {
            let message = self
                .json
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("request rejected");
            Err(SyncError::Http(format!("{} {}", self.status, message)))
        }
    }
}

/// Single-attempt HTTP collaborator. Retries are the collaborator's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SyncError>;
}

// ============================================================================
// Persistent key-value storage
// ============================================================================

/// Small persistent string store (one serialized value per key).
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, SyncError>;
    fn save(&self, key: &str, value: &str) -> Result<(), SyncError>;
}

// ============================================================================
// Platform alerts
// ============================================================================

/// Best-effort platform notification display. Never blocks the store.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationAlerter: Send + Sync {
    fn offer(&self, notification: &Notification);
}
