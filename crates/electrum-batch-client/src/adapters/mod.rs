//! Adapters: concrete transports.

pub mod websocket;

pub use websocket::{NodeEndpoint, WebSocketTransport};
