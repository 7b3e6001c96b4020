//! WebSocket push transport.
//!
//! One task per connection shuttles control messages out and frames in. The
//! session token travels as an `Authorization: Bearer` header on the upgrade
//! request. Message size limits are enforced by tungstenite while reading, so
//! an oversized frame fails the connection before it is buffered.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use crate::config::PushSettings;
use crate::domain::{ControlMessage, InboundFrame, PushChannel, PushTransport, SessionToken};
use crate::shared::error::SyncError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// `PushTransport` over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    max_message_size: usize,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, max_message_size: usize) -> Self {
        Self {
            url: url.into(),
            max_message_size,
        }
    }

    pub fn from_settings(settings: &PushSettings) -> Self {
        Self::new(settings.url.clone(), settings.max_message_size)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.max_message_size))
            .max_frame_size(Some(self.max_message_size))
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn open(&self, token: &SessionToken) -> Result<PushChannel, SyncError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Connection(format!("invalid push url {}: {}", self.url, e)))?;
        let auth = HeaderValue::from_str(&token.bearer())
            .map_err(|_| SyncError::Connection("session token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (ws, response) = connect_async_with_config(request, Some(self.config()), false)
            .await
            .map_err(|e| SyncError::Connection(format!("handshake failed: {}", e)))?;
        tracing::debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");

        let (outbound, control_rx) = mpsc::unbounded_channel();
        let (frame_tx, inbound) = mpsc::unbounded_channel();
        tokio::spawn(connection_loop(ws, control_rx, frame_tx));

        Ok(PushChannel { outbound, inbound })
    }
}

/// Forward control messages to the socket and socket frames to the channel.
///
/// Ends when the socket closes, the outbound sender is dropped, or the
/// inbound receiver goes away.
async fn connection_loop(
    ws: WsStream,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    frame_tx: mpsc::UnboundedSender<InboundFrame>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            control = control_rx.recv() => {
                let Some(control) = control else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                let text = match control.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode control message");
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    let _ = frame_tx.send(InboundFrame::Error(e.to_string()));
                    break;
                }
            }
            message = ws_rx.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => InboundFrame::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Close(close))) => InboundFrame::Closed {
                        reason: close
                            .map(|c| c.reason.to_string())
                            .filter(|r| !r.is_empty()),
                    },
                    // Ping/pong are answered by tungstenite; binary frames are not part of the protocol
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read failed");
                        InboundFrame::Error(e.to_string())
                    }
                    None => InboundFrame::Closed { reason: None },
                };

                let terminal = !matches!(frame, InboundFrame::Text(_));
                if frame_tx.send(frame).is_err() || terminal {
                    break;
                }
            }
            _ = frame_tx.closed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::debug!("WebSocket connection loop finished");
}
