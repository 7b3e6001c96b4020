//! # Course Sync Library
//!
//! Realtime synchronization layer of a learning-platform client:
//! - Push channel lifecycle with reconnect and topic resubscription
//! - Reconciliation of server events into a copy-on-write course cache
//! - Optimistic mutations with guaranteed rollback
//! - Bounded notification ledger and self-expiring UI events
//!
//! ## Architecture
//!
//! - **Domain Layer**: Entities, typed events and collaborator traits
//! - **Application Layer**: Realtime core and services
//! - **Infrastructure Layer**: WebSocket, HTTP, storage and metrics implementations
//!
//! ## Module Structure
//!
//! ```text
//! course_sync/
//! +-- config/         Configuration management
//! +-- domain/         Entities, events and collaborator traits
//! +-- application/    Realtime core and services
//! +-- infrastructure/ Transport, HTTP, storage, alerts, metrics
//! +-- shared/         Errors and backoff
//! ```

// Configuration module
pub mod config;

// Domain layer - Core types and contracts
pub mod domain;

// Application layer - Realtime core and services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Shared utilities
pub mod shared;

// Application startup and wiring
pub mod startup;

// Telemetry and observability
pub mod telemetry;
