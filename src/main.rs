//! # Course Sync
//!
//! Headless realtime client for the learning platform.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Push channel, caches and services
//! - Initial pull of courses and notifications
//! - Feed logging until Ctrl-C

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use course_sync::config::Settings;
use course_sync::domain::SessionToken;
use course_sync::infrastructure::metrics;
use course_sync::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    course_sync::telemetry::init_tracing();

    info!("Starting Course Sync...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        push_url = %settings.push.url,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let token = settings
        .session
        .token
        .clone()
        .map(SessionToken::new)
        .context("No session token configured; set SESSION_TOKEN or APP__SESSION__TOKEN")?;

    let application = Application::build(settings)?;
    let mut states = application.sync.connection().state_changes();
    let mut cache_updates = application.sync.cache().subscribe();
    let mut notifications = application.sync.notifications().subscribe();

    application.connect(token).await;
    let loaded = application.load_initial().await;
    if loaded.is_complete() {
        info!(courses = ?loaded.courses, notifications = ?loaded.notifications, "Initial sync complete");
    } else {
        tracing::warn!(
            courses = ?loaded.courses,
            notifications = ?loaded.notifications,
            "Initial sync incomplete; events for unfetched courses are dropped"
        );
    }
    info!("Client running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = states.recv() => match change {
                Ok(change) => info!(from = %change.from, to = %change.to, "Connection"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "State feed lagged"),
                Err(RecvError::Closed) => break,
            },
            update = cache_updates.recv() => match update {
                Ok(update) => info!(
                    course_id = update.course_id.as_ref().map(|id| id.as_str()).unwrap_or("*"),
                    source = update.source.as_str(),
                    version = update.version,
                    "Course cache updated"
                ),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Cache feed lagged"),
                Err(RecvError::Closed) => break,
            },
            change = notifications.recv() => match change {
                Ok(change) => info!(
                    ?change,
                    unread = application.sync.notifications().unread_count(),
                    "Notifications changed"
                ),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Notification feed lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Shutting down");
    application.shutdown().await;
    tracing::debug!(metrics = %metrics::gather_metrics(), "Final metrics");

    Ok(())
}
