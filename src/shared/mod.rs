//! Shared Utilities
//!
//! Common utilities used across all layers.

pub mod error;
pub mod backoff;

pub use error::{SyncError, SyncResult};
