//! Push-channel connection lifecycle.
//!
//! A supervisor task owns the live channel. It performs the handshake, pumps
//! inbound frames into the subscription registry one at a time and reconnects
//! with exponential backoff when the channel fails. Only [`ConnectionManager::teardown`]
//! moves the state to `Disconnected`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::subscription_registry::SubscriptionRegistry;
use crate::config::ReconnectSettings;
use crate::domain::{
    ConnectionState, ConnectionStateChange, InboundEvent, InboundFrame, PushTransport,
    SessionToken,
};
use crate::infrastructure::metrics;
use crate::shared::backoff::Backoff;
use crate::shared::error::SyncError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// State shared between the manager handle and its supervisor task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    connection_id: RwLock<Uuid>,
    last_activity: RwLock<Option<DateTime<Utc>>>,
    token: Mutex<Option<SessionToken>>,
    changes: broadcast::Sender<ConnectionStateChange>,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state,
            connection_id: RwLock::new(Uuid::nil()),
            last_activity: RwLock::new(None),
            token: Mutex::new(None),
            changes,
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `to`, emitting a change if the state differs.
    fn transition(&self, to: ConnectionState) -> bool {
        let mut from = to;
        let changed = self.state.send_if_modified(|state| {
            from = *state;
            if *state == to {
                false
            } else {
                *state = to;
                true
            }
        });
        if !changed {
            return false;
        }

        let change = ConnectionStateChange {
            connection_id: *self.connection_id.read(),
            from,
            to,
            at: Utc::now(),
        };
        tracing::info!(
            connection_id = %change.connection_id,
            from = %from,
            to = %to,
            "Push channel state changed"
        );
        metrics::record_connection_state(to);
        let _ = self.changes.send(change);
        true
    }

    fn touch(&self) {
        *self.last_activity.write() = Some(Utc::now());
    }
}

/// Everything the supervisor task needs.
struct SupervisorContext {
    transport: Arc<dyn PushTransport>,
    registry: SubscriptionRegistry,
    shared: Arc<Shared>,
    reconnect: ReconnectSettings,
    token: SessionToken,
}

/// Handle to a running supervisor task.
struct Supervisor {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Supervisor {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Push channel supervisor panicked");
            }
        }
    }
}

enum PumpExit {
    Shutdown,
    Closed(Option<String>),
    Failed(String),
}

/// Owns the single push channel of a client session.
pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    registry: SubscriptionRegistry,
    reconnect: ReconnectSettings,
    shared: Arc<Shared>,
    supervisor: tokio::sync::Mutex<Option<Supervisor>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        registry: SubscriptionRegistry,
        reconnect: ReconnectSettings,
    ) -> Self {
        Self {
            transport,
            registry,
            reconnect,
            shared: Arc::new(Shared::new()),
            supervisor: tokio::sync::Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    /// Identity of the current (or last) channel; nil before the first handshake.
    pub fn connection_id(&self) -> Uuid {
        *self.shared.connection_id.read()
    }

    /// Time of the last handshake or inbound frame
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_activity.read()
    }

    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionStateChange> {
        self.shared.changes.subscribe()
    }

    /// Resolve once the state equals `target`.
    pub async fn wait_until(&self, target: ConnectionState) -> Result<(), SyncError> {
        let mut rx = self.shared.state.subscribe();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::Internal("connection state channel closed".into()))
    }

    /// Establish the push channel with `token`.
    ///
    /// Returns `false` without doing anything when a channel for an equal
    /// token is already connected or connecting. Otherwise any previous
    /// supervisor is stopped, keeping registered subscriptions, and a new one
    /// is started.
    pub async fn connect(&self, token: SessionToken) -> bool {
        let mut supervisor = self.supervisor.lock().await;

        let same_token = self.shared.token.lock().as_ref() == Some(&token);
        let running = supervisor
            .as_ref()
            .is_some_and(|s| !s.task.is_finished());
        if same_token && running && self.state().is_live() {
            tracing::debug!("Push channel already live for this session");
            return false;
        }

        if let Some(previous) = supervisor.take() {
            tracing::info!("Restarting push channel supervisor");
            previous.stop().await;
            self.registry.detach_link();
        }

        *self.shared.token.lock() = Some(token.clone());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let context = SupervisorContext {
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            shared: self.shared.clone(),
            reconnect: self.reconnect.clone(),
            token,
        };
        let task = tokio::spawn(supervise(context, shutdown_rx));
        *supervisor = Some(Supervisor { shutdown, task });
        true
    }

    /// Close the channel for good.
    ///
    /// Subscriptions are released first so no handler observes events after
    /// teardown starts. Any pending handshake or backoff sleep is cancelled.
    pub async fn teardown(&self) {
        let released = self.registry.release_all();

        let supervisor = self.supervisor.lock().await.take();
        if let Some(supervisor) = supervisor {
            supervisor.stop().await;
        }

        self.registry.detach_link();
        *self.shared.token.lock() = None;
        self.shared.transition(ConnectionState::Disconnected);
        tracing::info!(released, "Push channel torn down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut supervisor) = self.supervisor.try_lock() {
            if let Some(supervisor) = supervisor.take() {
                supervisor.task.abort();
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("connection_id", &self.connection_id())
            .finish()
    }
}

/// Supervisor loop: handshake, pump, back off, repeat until shut down.
async fn supervise(context: SupervisorContext, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::from_settings(&context.reconnect);
    if context.shared.current() != ConnectionState::Reconnecting {
        context.shared.transition(ConnectionState::Connecting);
    }

    loop {
        if *shutdown.borrow() {
            break;
        }

        let opened = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = context.transport.open(&context.token) => result,
        };

        match opened {
            Ok(channel) => {
                backoff.reset();
                let connection_id = Uuid::new_v4();
                *context.shared.connection_id.write() = connection_id;
                context.shared.touch();

                let resubscribed = context.registry.attach_link(channel.outbound.clone());
                context.shared.transition(ConnectionState::Connected);
                tracing::debug!(%connection_id, resubscribed, "Push channel open");

                let exit = pump(&context, channel.inbound, &mut shutdown).await;
                context.registry.detach_link();
                drop(channel.outbound);

                match exit {
                    PumpExit::Shutdown => break,
                    PumpExit::Closed(reason) => tracing::warn!(
                        %connection_id,
                        reason = reason.as_deref().unwrap_or("none"),
                        "Push channel closed"
                    ),
                    PumpExit::Failed(error) => tracing::warn!(
                        %connection_id,
                        error = %error,
                        "Push channel failed"
                    ),
                }
            }
            Err(e) => {
                tracing::warn!(
                    attempt = backoff.attempt(),
                    error = %e,
                    "Push channel handshake failed"
                );
            }
        }

        context.shared.transition(ConnectionState::Reconnecting);
        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("Push channel supervisor stopped");
}

/// Decode and dispatch frames until the channel ends or shutdown is signalled.
async fn pump(
    context: &SupervisorContext,
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpExit {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.changed() => return PumpExit::Shutdown,
            frame = inbound.recv() => frame,
        };

        match frame {
            Some(InboundFrame::Text(text)) => {
                context.shared.touch();
                handle_text(&context.registry, &text);
            }
            Some(InboundFrame::Closed { reason }) => return PumpExit::Closed(reason),
            Some(InboundFrame::Error(error)) => return PumpExit::Failed(error),
            None => return PumpExit::Closed(None),
        }
    }
}

fn handle_text(registry: &SubscriptionRegistry, text: &str) {
    match InboundEvent::decode(text) {
        Ok(event) => {
            let delivered = registry.dispatch(&event);
            if delivered == 0 {
                tracing::trace!(topic = %event.topic(), "Event without handlers");
            }
        }
        Err(SyncError::MalformedEvent { topic, reason }) => {
            tracing::warn!(topic = %topic, reason = %reason, "Dropping malformed event");
            metrics::record_malformed(&topic);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable frame");
            metrics::record_malformed("<unknown>");
        }
    }
}
