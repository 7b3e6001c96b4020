//! Transient UI events.
//!
//! Short-lived indicators ("12 people enrolled just now") derived from
//! reconciled cache updates. Never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of transient indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransientKind {
    Enrollment,
    Review,
    Trending,
    Generic,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrollment => "enrollment",
            Self::Review => "review",
            Self::Trending => "trending",
            Self::Generic => "generic",
        }
    }
}

/// A self-expiring UI event keyed by a domain identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransientEvent {
    pub key: String,
    pub kind: TransientKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TransientEvent {
    pub fn new(key: impl Into<String>, kind: TransientKind, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            kind,
            payload,
            created_at: Utc::now(),
        }
    }
}
