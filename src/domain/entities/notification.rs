//! Notification entity.
//!
//! Records arrive either by push (`notification` topic) or by an initial pull
//! through the HTTP collaborator. After creation only the read flag changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Assignment,
    Course,
    Achievement,
    Reminder,
    Message,
    Alert,
    #[default]
    #[serde(other)]
    Other,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Course => "course",
            Self::Achievement => "achievement",
            Self::Reminder => "reminder",
            Self::Message => "message",
            Self::Alert => "alert",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = std::convert::Infallible;

    /// Case-insensitive; unknown values map to `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "assignment" => Self::Assignment,
            "course" => Self::Course,
            "achievement" => Self::Achievement,
            "reminder" => Self::Reminder,
            "message" => Self::Message,
            "alert" => Self::Alert,
            _ => Self::Other,
        })
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry of the notification ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl Notification {
    /// New unread notification created now.
    pub fn new(
        id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
            read: false,
            action_url: None,
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn is_unread(&self) -> bool {
        !self.read
    }
}
