//! Push-channel event types.
//!
//! Inbound frames are JSON text of the form `{"topic": "...", "payload": {...}}`.
//! They decode into the `InboundEvent` sum type; anything that does not fit is a
//! `MalformedEvent` error and never reaches a store.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::{
    CourseId, CoursePatch, Notification, NotificationKind, Rating, TransientKind,
};
use crate::shared::error::SyncError;

/// Named channel of inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "course:enrolled")]
    CourseEnrolled,
    #[serde(rename = "course:reviewed")]
    CourseReviewed,
    #[serde(rename = "course:trending")]
    CourseTrending,
    #[serde(rename = "notification")]
    Notification,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::CourseEnrolled,
        Topic::CourseReviewed,
        Topic::CourseTrending,
        Topic::Notification,
    ];

    /// Topics that carry course field updates.
    pub const COURSE: [Topic; 3] = [
        Topic::CourseEnrolled,
        Topic::CourseReviewed,
        Topic::CourseTrending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CourseEnrolled => "course:enrolled",
            Topic::CourseReviewed => "course:reviewed",
            Topic::CourseTrending => "course:trending",
            Topic::Notification => "notification",
        }
    }
}

impl FromStr for Topic {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| SyncError::MalformedEvent {
                topic: s.to_string(),
                reason: "unknown topic".into(),
            })
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum InboundEvent {
    #[serde(rename = "course:enrolled")]
    CourseEnrolled(CourseEnrolledEvent),
    #[serde(rename = "course:reviewed")]
    CourseReviewed(CourseReviewedEvent),
    #[serde(rename = "course:trending")]
    CourseTrending(CourseTrendingEvent),
    #[serde(rename = "notification")]
    Notification(NotificationEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrolledEvent {
    pub course_id: CourseId,
    pub enrollment_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReviewedEvent {
    pub course_id: CourseId,
    pub average_rating: f64,
    pub review_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseTrendingEvent {
    pub course_id: CourseId,
    pub is_trending: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl NotificationEvent {
    /// Materialize a ledger entry. Missing ids get a fresh UUID, missing kinds
    /// become `Other`, missing timestamps become "now".
    pub fn into_notification(self) -> Notification {
        Notification {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            kind: self.kind.unwrap_or_default(),
            title: self.title,
            message: self.message,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            read: false,
            action_url: self.action_url,
        }
    }
}

/// Untyped frame used to recover the topic name for error reporting.
#[derive(Debug, Deserialize)]
struct RawFrame {
    topic: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl InboundEvent {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// `SyncError::MalformedEvent` when the frame is not JSON, names an
    /// unknown topic, misses required fields or carries out-of-range values.
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|e| SyncError::MalformedEvent {
            topic: "<unknown>".into(),
            reason: format!("invalid frame: {}", e),
        })?;

        let topic = raw.topic.parse::<Topic>()?;
        let malformed = |e: serde_json::Error| SyncError::MalformedEvent {
            topic: topic.as_str().to_string(),
            reason: e.to_string(),
        };

        let event = match topic {
            Topic::CourseEnrolled => {
                InboundEvent::CourseEnrolled(serde_json::from_value(raw.payload).map_err(malformed)?)
            }
            Topic::CourseReviewed => {
                InboundEvent::CourseReviewed(serde_json::from_value(raw.payload).map_err(malformed)?)
            }
            Topic::CourseTrending => {
                InboundEvent::CourseTrending(serde_json::from_value(raw.payload).map_err(malformed)?)
            }
            Topic::Notification => {
                InboundEvent::Notification(serde_json::from_value(raw.payload).map_err(malformed)?)
            }
        };

        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), SyncError> {
        let invalid = |reason: String| SyncError::MalformedEvent {
            topic: self.topic().as_str().to_string(),
            reason,
        };

        match self {
            InboundEvent::CourseEnrolled(e) => non_empty_id(&e.course_id).map_err(invalid),
            InboundEvent::CourseReviewed(e) => {
                non_empty_id(&e.course_id).map_err(invalid)?;
                Rating::new(e.average_rating, e.review_count)
                    .map(|_| ())
                    .map_err(invalid)
            }
            InboundEvent::CourseTrending(e) => non_empty_id(&e.course_id).map_err(invalid),
            InboundEvent::Notification(e) => {
                if e.title.trim().is_empty() && e.message.trim().is_empty() {
                    return Err(invalid("notification has neither title nor message".into()));
                }
                Ok(())
            }
        }
    }

    /// Get the topic for dispatch
    pub fn topic(&self) -> Topic {
        match self {
            InboundEvent::CourseEnrolled(_) => Topic::CourseEnrolled,
            InboundEvent::CourseReviewed(_) => Topic::CourseReviewed,
            InboundEvent::CourseTrending(_) => Topic::CourseTrending,
            InboundEvent::Notification(_) => Topic::Notification,
        }
    }

    /// Course this event targets, if any
    pub fn course_id(&self) -> Option<&CourseId> {
        match self {
            InboundEvent::CourseEnrolled(e) => Some(&e.course_id),
            InboundEvent::CourseReviewed(e) => Some(&e.course_id),
            InboundEvent::CourseTrending(e) => Some(&e.course_id),
            InboundEvent::Notification(_) => None,
        }
    }

    /// Fields this event carries for the course cache
    pub fn course_patch(&self) -> Option<CoursePatch> {
        match self {
            InboundEvent::CourseEnrolled(e) => Some(CoursePatch::enrollment_count(e.enrollment_count)),
            InboundEvent::CourseReviewed(e) => Some(CoursePatch::rating(Rating {
                average: e.average_rating,
                count: e.review_count,
            })),
            InboundEvent::CourseTrending(e) => Some(CoursePatch::trending(e.is_trending)),
            InboundEvent::Notification(_) => None,
        }
    }

    /// Kind of transient indicator derived from this event
    pub fn transient_kind(&self) -> TransientKind {
        match self {
            InboundEvent::CourseEnrolled(_) => TransientKind::Enrollment,
            InboundEvent::CourseReviewed(_) => TransientKind::Review,
            InboundEvent::CourseTrending(_) => TransientKind::Trending,
            InboundEvent::Notification(_) => TransientKind::Generic,
        }
    }

    /// Payload as a JSON value
    pub fn payload(&self) -> serde_json::Value {
        match self {
            InboundEvent::CourseEnrolled(e) => serde_json::to_value(e).unwrap_or_default(),
            InboundEvent::CourseReviewed(e) => serde_json::to_value(e).unwrap_or_default(),
            InboundEvent::CourseTrending(e) => serde_json::to_value(e).unwrap_or_default(),
            InboundEvent::Notification(e) => serde_json::to_value(e).unwrap_or_default(),
        }
    }
}

fn non_empty_id(id: &CourseId) -> Result<(), String> {
    if id.as_str().trim().is_empty() {
        Err("empty courseId".into())
    } else {
        Ok(())
    }
}

/// Outbound control message sent over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe { topic: Topic },
    Unsubscribe { topic: Topic },
}

impl ControlMessage {
    pub fn topic(&self) -> Topic {
        match self {
            ControlMessage::Subscribe { topic } | ControlMessage::Unsubscribe { topic } => *topic,
        }
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }
}
