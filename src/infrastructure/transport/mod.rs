//! Push transport implementations.

mod websocket;

pub use websocket::WebSocketTransport;
