//! # Domain Entities
//!
//! Core domain types the sync layer caches and reconciles.
//!
//! ## Core Entities
//!
//! - **CourseRecord**: Cached course with the synchronized fields
//!   (enrollment count, rating, trending flag)
//! - **CoursePatch**: The single merge unit shared by push events and
//!   optimistic writes
//! - **Notification**: Entry of the bounded notification ledger
//!
//! ## Supporting Types
//!
//! - **SessionToken / ConnectionState**: Push-channel lifecycle
//! - **TransientEvent**: Self-expiring UI indicator

mod course;
mod notification;
mod session;
mod transient;

pub use course::{CourseId, CoursePatch, CourseRecord, Rating, MAX_RATING};
pub use notification::{Notification, NotificationKind};
pub use session::{ConnectionState, ConnectionStateChange, SessionToken};
pub use transient::{TransientEvent, TransientKind};
