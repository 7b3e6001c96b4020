//! Application Layer
//!
//! The realtime synchronization core and the services built on it. This layer
//! coordinates domain types and reaches the outside world only through the
//! collaborator traits of the domain layer.

pub mod realtime;
pub mod services;
