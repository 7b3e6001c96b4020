//! # Domain Layer
//!
//! The domain layer contains the types the sync core reasons about. It is
//! independent of any transport, storage or runtime concerns.
//!
//! ## Structure
//!
//! - **entities**: Cached records, notifications, session and transient types
//! - **events**: Typed inbound events and outbound control messages
//! - **collaborators**: Contracts for push transport, HTTP, storage and alerts
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or application layers
//! - Collaborator traits define every boundary the core crosses

pub mod collaborators;
pub mod entities;
pub mod events;

// Re-export commonly used types
pub use collaborators::*;
pub use entities::*;
pub use events::*;
