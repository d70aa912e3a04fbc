//! # Outbound Ports
//!
//! The RPC transport the batch client drives: one persistent connection
//! to an electrum node with request/response and push notifications.
//! Reconnect and backoff belong to the transport and surface here only as
//! lifecycle events.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::ClientError;

/// Connection state reported by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    /// No connection and no attempt under way.
    Disconnected = 0,
    /// A connection attempt is under way.
    Connecting = 1,
    /// Requests can be sent.
    Connected = 2,
}

impl ConnectionStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionStatus::Connected,
            1 => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

/// One JSON-RPC request inside a wire batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Request id, unique per connection lifetime.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

/// Events a transport pushes to its owner, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt started.
    Connecting,
    /// The connection is up.
    Connected,
    /// The connection was lost or closed.
    Disconnected,
    /// Subscription push from the server.
    Notification {
        /// Subscribed method
        method: String,
        /// Notification parameters
        params: Vec<Value>,
    },
    /// Response to a request the transport does not track itself
    /// (every request sent through `send_batch`).
    Response {
        /// Request id
        id: u64,
        /// Result or RPC error
        result: Result<Value, ClientError>,
    },
    /// Error frame without a request id.
    ErrorFrame {
        /// JSON-RPC error code
        code: i64,
        /// Server supplied message
        message: String,
    },
}

/// Receiving half of a transport's event stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// RPC transport - outbound port.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Current connection state.
    fn status(&self) -> ConnectionStatus;

    /// Allocate a request id from the connection's shared counter so batch
    /// and direct requests never collide.
    fn next_request_id(&self) -> u64;

    /// Write one batch frame. Responses arrive as `TransportEvent::Response`.
    ///
    /// Must not block and must not call back into the owner.
    fn send_batch(&self, batch: Vec<WireRequest>) -> Result<(), ClientError>;

    /// Send one request and wait for its response.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError>;

    /// Subscribe to a method. The initial status is delivered as a
    /// notification with the status appended to `params`.
    async fn subscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError>;

    /// Cancel a subscription.
    async fn unsubscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError>;

    /// Start connecting; resolves after the first attempt finished.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Close the connection and stop reconnecting.
    async fn disconnect(&self) -> Result<(), ClientError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Produces the result for a request sent to the mock.
pub type MockResponder = Arc<dyn Fn(&str, &[Value]) -> Result<Value, ClientError> + Send + Sync>;

/// In-process transport for tests.
///
/// Records every batch it is asked to send. With `auto_respond` set, each
/// batch is answered immediately through the event stream using the
/// responder.
pub struct MockTransport {
    status: AtomicU8,
    request_id: AtomicU64,
    events: mpsc::UnboundedSender<TransportEvent>,
    responder: Mutex<MockResponder>,
    auto_respond: Mutex<bool>,
    sent: Mutex<Vec<(Instant, Vec<WireRequest>)>>,
    direct: Mutex<Vec<(String, Vec<Value>)>>,
    subscriptions: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockTransport {
    /// Connected mock answering every request with `null`.
    pub fn new() -> (Arc<Self>, TransportEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mock = Self {
            status: AtomicU8::new(ConnectionStatus::Connected as u8),
            request_id: AtomicU64::new(0),
            events: tx,
            responder: Mutex::new(Arc::new(|_, _| Ok(Value::Null))),
            auto_respond: Mutex::new(true),
            sent: Mutex::new(Vec::new()),
            direct: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        };
        (Arc::new(mock), rx)
    }

    /// Replace the responder.
    pub fn set_responder(
        &self,
        responder: impl Fn(&str, &[Value]) -> Result<Value, ClientError> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Arc::new(responder);
    }

    /// Toggle automatic answering of batches.
    pub fn set_auto_respond(&self, enabled: bool) {
        *self.auto_respond.lock() = enabled;
    }

    /// Change the reported status without emitting events.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Push an event to the owner.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Answer a previously sent request by id.
    pub fn respond(&self, id: u64, result: Result<Value, ClientError>) {
        self.emit(TransportEvent::Response { id, result });
    }

    /// Drop the connection: status plus `Disconnected` event.
    pub fn drop_connection(&self) {
        self.set_status(ConnectionStatus::Disconnected);
        self.emit(TransportEvent::Disconnected);
    }

    /// Batches sent so far, with send times.
    pub fn sent_batches(&self) -> Vec<(Instant, Vec<WireRequest>)> {
        self.sent.lock().clone()
    }

    /// Total number of requests sent through batches.
    pub fn sent_request_count(&self) -> usize {
        self.sent.lock().iter().map(|(_, b)| b.len()).sum()
    }

    /// Sent batch requests calling `method`.
    pub fn sent_requests_for(&self, method: &str) -> Vec<WireRequest> {
        self.sent
            .lock()
            .iter()
            .flat_map(|(_, batch)| batch.iter())
            .filter(|req| req.method == method)
            .cloned()
            .collect()
    }

    /// Direct requests sent so far.
    pub fn direct_requests(&self) -> Vec<(String, Vec<Value>)> {
        self.direct.lock().clone()
    }

    /// Active subscriptions.
    pub fn subscriptions(&self) -> Vec<(String, Vec<Value>)> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn send_batch(&self, batch: Vec<WireRequest>) -> Result<(), ClientError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::disconnected());
        }
        self.sent.lock().push((Instant::now(), batch.clone()));
        if *self.auto_respond.lock() {
            let responder = self.responder.lock().clone();
            for req in batch {
                let result = responder(&req.method, &req.params);
                self.respond(req.id, result);
            }
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::disconnected());
        }
        self.direct.lock().push((method.to_string(), params.clone()));
        let responder = self.responder.lock().clone();
        responder(method, &params)
    }

    async fn subscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        let status = self.request(method, params.clone()).await?;
        self.subscriptions
            .lock()
            .push((method.to_string(), params.clone()));
        let mut notification = params;
        notification.push(status);
        self.emit(TransportEvent::Notification {
            method: method.to_string(),
            params: notification,
        });
        Ok(())
    }

    async fn unsubscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        self.subscriptions
            .lock()
            .retain(|(m, p)| !(m == method && *p == params));
        Ok(())
    }

    async fn connect(&self) -> Result<(), ClientError> {
        self.set_status(ConnectionStatus::Connected);
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.drop_connection();
        Ok(())
    }
}
