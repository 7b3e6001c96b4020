//! Sync Error Types
//!
//! Centralized error taxonomy for the realtime synchronization layer.

/// Error type shared by every component of the sync layer
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Handshake or transport failure. Recovered by reconnecting.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A topic could not be attached to the live connection.
    #[error("Subscription error on {topic}: {reason}")]
    Subscription { topic: String, reason: String },

    /// The remote half of an optimistic mutation was rejected.
    #[error("Mutation {key} failed: {reason}")]
    Mutation { key: String, reason: String },

    /// An inbound event was missing required fields or carried invalid values.
    #[error("Malformed event on {topic}: {reason}")]
    MalformedEvent { topic: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Stable label used for log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Connection(_) => "connection",
            SyncError::Subscription { .. } => "subscription",
            SyncError::Mutation { .. } => "mutation",
            SyncError::MalformedEvent { .. } => "malformed_event",
            SyncError::Storage(_) => "storage",
            SyncError::Http(_) => "http",
            SyncError::Config(_) => "config",
            SyncError::Json(_) => "json",
            SyncError::Internal(_) => "internal",
        }
    }

    /// Whether the failure is recovered locally by the connection supervisor.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_) | SyncError::Subscription { .. }
        )
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

/// Convenience alias for results in the sync layer
pub type SyncResult<T> = Result<T, SyncError>;
