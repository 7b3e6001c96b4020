//! Infrastructure Layer
//!
//! Contains implementations of the domain collaborators:
//! - Push transport (WebSocket)
//! - HTTP client (reqwest)
//! - Key-value storage (file and in-memory)
//! - Platform alerts
//! - Prometheus metrics

pub mod alerts;
pub mod http;
pub mod metrics;
pub mod storage;
pub mod transport;
