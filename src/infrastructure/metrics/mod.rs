//! Prometheus Metrics Module
//!
//! Provides client-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Push-channel state transitions and current state
//! - Reconciled course events by topic and outcome
//! - Dropped malformed events
//! - Optimistic mutations by outcome
//! - Notification ingests and transient event publications

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::domain::ConnectionState;

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Current push-channel state (1 for the active state, 0 otherwise)
pub static CONNECTION_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("connection_state", "Current push channel state").namespace("course_sync"),
        &["state"],
    )
    .expect("Failed to create CONNECTION_STATE metric")
});

/// Push-channel state transitions
pub static CONNECTION_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "connection_transitions_total",
            "Number of push channel state transitions",
        )
        .namespace("course_sync"),
        &["to"],
    )
    .expect("Failed to create CONNECTION_TRANSITIONS_TOTAL metric")
});

/// Reconciled events by topic and outcome
pub static EVENTS_RECONCILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_reconciled_total", "Inbound events applied to the course cache")
            .namespace("course_sync"),
        &["topic", "outcome"],
    )
    .expect("Failed to create EVENTS_RECONCILED_TOTAL metric")
});

/// Malformed events dropped before reaching a store
pub static EVENTS_MALFORMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_malformed_total", "Inbound frames dropped as malformed")
            .namespace("course_sync"),
        &["topic"],
    )
    .expect("Failed to create EVENTS_MALFORMED_TOTAL metric")
});

/// Optimistic mutations by outcome ("confirmed", "rolled_back", "superseded")
pub static MUTATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mutations_total", "Optimistic mutations by outcome").namespace("course_sync"),
        &["outcome"],
    )
    .expect("Failed to create MUTATIONS_TOTAL metric")
});

/// Notification ingests by outcome ("inserted", "duplicate")
pub static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("notifications_total", "Notification ingests by outcome")
            .namespace("course_sync"),
        &["outcome"],
    )
    .expect("Failed to create NOTIFICATIONS_TOTAL metric")
});

/// Transient events by action ("published", "superseded", "expired")
pub static TRANSIENT_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("transient_events_total", "Transient UI events by action")
            .namespace("course_sync"),
        &["action"],
    )
    .expect("Failed to create TRANSIENT_EVENTS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(CONNECTION_STATE.clone()))
        .expect("Failed to register CONNECTION_STATE");
    registry
        .register(Box::new(CONNECTION_TRANSITIONS_TOTAL.clone()))
        .expect("Failed to register CONNECTION_TRANSITIONS_TOTAL");
    registry
        .register(Box::new(EVENTS_RECONCILED_TOTAL.clone()))
        .expect("Failed to register EVENTS_RECONCILED_TOTAL");
    registry
        .register(Box::new(EVENTS_MALFORMED_TOTAL.clone()))
        .expect("Failed to register EVENTS_MALFORMED_TOTAL");
    registry
        .register(Box::new(MUTATIONS_TOTAL.clone()))
        .expect("Failed to register MUTATIONS_TOTAL");
    registry
        .register(Box::new(NOTIFICATIONS_TOTAL.clone()))
        .expect("Failed to register NOTIFICATIONS_TOTAL");
    registry
        .register(Box::new(TRANSIENT_EVENTS_TOTAL.clone()))
        .expect("Failed to register TRANSIENT_EVENTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record a connection state transition
pub fn record_connection_state(state: ConnectionState) {
    Lazy::force(&REGISTRY);
    for candidate in ConnectionState::ALL {
        CONNECTION_STATE
            .with_label_values(&[candidate.as_str()])
            .set(i64::from(candidate == state));
    }
    CONNECTION_TRANSITIONS_TOTAL
        .with_label_values(&[state.as_str()])
        .inc();
}

/// Helper to record a reconciliation outcome
pub fn record_reconciled(topic: &str, outcome: &str) {
    Lazy::force(&REGISTRY);
    EVENTS_RECONCILED_TOTAL
        .with_label_values(&[topic, outcome])
        .inc();
}

/// Helper to record a dropped malformed event
pub fn record_malformed(topic: &str) {
    Lazy::force(&REGISTRY);
    EVENTS_MALFORMED_TOTAL.with_label_values(&[topic]).inc();
}

/// Helper to record an optimistic mutation outcome
pub fn record_mutation(outcome: &str) {
    Lazy::force(&REGISTRY);
    MUTATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record a notification ingest
pub fn record_notification(outcome: &str) {
    Lazy::force(&REGISTRY);
    NOTIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record a transient event action
pub fn record_transient(action: &str) {
    Lazy::force(&REGISTRY);
    TRANSIENT_EVENTS_TOTAL.with_label_values(&[action]).inc();
}
