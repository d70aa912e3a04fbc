//! WebSocket transport to an electrum node (JSON-RPC 2.0 over `ws://`/`wss://`).
//!
//! One connection task owns the socket. Outgoing frames go through an
//! unbounded channel; incoming frames are either routed to a waiting
//! direct request or forwarded to the owner as `TransportEvent`s. The task
//! reconnects with exponential backoff until `disconnect()` is called.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::BatchClientConfig;
use crate::domain::ClientError;
use crate::ports::{ConnectionStatus, Transport, TransportEvent, TransportEvents, WireRequest};

/// Base delay between reconnection attempts (exponential backoff).
const RECONNECT_BASE_DELAY_SECS: u64 = 2;

/// Maximum delay between reconnection attempts.
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Port used when the URL names none.
const DEFAULT_PORT: u16 = 443;

/// Host, port and encryption of an electrum WebSocket endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeEndpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// `wss://` when true.
    pub encrypted: bool,
}

impl NodeEndpoint {
    /// Parse a `ws://` or `wss://` URL; the port defaults to 443.
    pub fn parse(url: &str) -> Result<Self, ClientError> {
        let invalid = || ClientError::InvalidUrl(url.to_string());
        let uri: Uri = url.parse().map_err(|_| invalid())?;
        let encrypted = match uri.scheme_str() {
            Some("wss") => true,
            Some("ws") => false,
            _ => return Err(invalid()),
        };
        let host = uri.host().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let authority = uri.authority().ok_or_else(invalid)?.as_str();
        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        // A colon inside brackets belongs to an IPv6 host, not to the port.
        let port = match host_port.rfind(':') {
            Some(idx) if !host_port[idx..].contains(']') => host_port[idx + 1..]
                .parse::<u16>()
                .map_err(|_| invalid())?,
            _ => DEFAULT_PORT,
        };
        Ok(Self {
            host: host.to_string(),
            port,
            encrypted,
        })
    }

    /// URL to dial.
    pub fn url(&self) -> String {
        let scheme = if self.encrypted { "wss" } else { "ws" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

/// JSON-RPC request frame.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

impl<'a> RpcRequest<'a> {
    fn new(id: u64, method: &'a str, params: &'a [Value]) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Incoming JSON-RPC message: response, notification or id-less error.
#[derive(Debug, Deserialize)]
struct RpcMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Vec<Value>>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcFrame {
    Batch(Vec<RpcMessage>),
    Single(RpcMessage),
}

impl RpcMessage {
    fn into_event(self) -> Option<TransportEvent> {
        match (self.id, self.method, self.error) {
            (None, Some(method), _) => Some(TransportEvent::Notification {
                method,
                params: self.params.unwrap_or_default(),
            }),
            (None, None, Some(error)) => Some(TransportEvent::ErrorFrame {
                code: error.code,
                message: error.message,
            }),
            (Some(id), _, Some(error)) => Some(TransportEvent::Response {
                id,
                result: Err(ClientError::Rpc {
                    code: error.code,
                    message: error.message,
                }),
            }),
            (Some(id), _, None) => Some(TransportEvent::Response {
                id,
                result: Ok(self.result.unwrap_or(Value::Null)),
            }),
            (None, None, None) => None,
        }
    }
}

/// Decode one text frame into events.
fn parse_frame(text: &str) -> Result<Vec<TransportEvent>, ClientError> {
    let frame: RpcFrame =
        serde_json::from_str(text).map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
    let messages = match frame {
        RpcFrame::Batch(messages) => messages,
        RpcFrame::Single(message) => vec![message],
    };
    Ok(messages
        .into_iter()
        .filter_map(RpcMessage::into_event)
        .collect())
}

/// Calculate exponential backoff delay.
fn calculate_backoff_delay(attempts: u32) -> u64 {
    std::cmp::min(
        RECONNECT_BASE_DELAY_SECS.saturating_mul(1 << attempts.min(6)),
        MAX_RECONNECT_DELAY_SECS,
    )
}

type PendingSender = oneshot::Sender<Result<Value, ClientError>>;

/// State shared between the transport handle and its connection task.
struct Shared {
    status: AtomicU8,
    request_id: AtomicU64,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending: DashMap<u64, PendingSender>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn send_frame<S: Serialize + ?Sized>(&self, frame: &S) -> Result<(), ClientError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        let outgoing = self.outgoing.lock();
        let sender = outgoing.as_ref().ok_or_else(ClientError::disconnected)?;
        sender
            .send(Message::Text(text.into()))
            .map_err(|_| ClientError::disconnected())
    }

    async fn request(&self, method: &str, params: &[Value]) -> Result<Value, ClientError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ClientError::disconnected());
        }
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if let Err(e) = self.send_frame(&RpcRequest::new(id, method, params)) {
            self.pending.remove(&id);
            return Err(e);
        }
        rx.await
            .unwrap_or_else(|_| Err(ClientError::Network("Connection closed".into())))
    }

    /// Keep-alive ping; the answer is dropped.
    fn send_ping(&self) {
        let id = self.next_id();
        let (tx, _rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.send_frame(&RpcRequest::new(id, "server.ping", &[])).is_err() {
            self.pending.remove(&id);
        }
    }

    fn handle_text(&self, text: &str) {
        let events = match parse_frame(text) {
            Ok(events) => events,
            Err(e) => {
                warn!("[batch] Dropping unparsable frame: {}", e);
                return;
            }
        };
        for event in events {
            match event {
                TransportEvent::Response { id, result } => match self.pending.remove(&id) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(result);
                    }
                    None => self.emit(TransportEvent::Response { id, result }),
                },
                other => self.emit(other),
            }
        }
    }

    /// Connection gone: fail direct requests and drop the writer.
    fn teardown(&self, was_connected: bool) {
        self.set_status(ConnectionStatus::Disconnected);
        *self.outgoing.lock() = None;
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                let _ = waiter.send(Err(ClientError::Network("Connection closed".into())));
            }
        }
        if was_connected {
            self.emit(TransportEvent::Disconnected);
        }
    }
}

/// Electrum transport over a WebSocket.
pub struct WebSocketTransport {
    endpoint: NodeEndpoint,
    config: BatchClientConfig,
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl WebSocketTransport {
    /// Validate the node URL and create an unconnected transport.
    pub fn new(config: BatchClientConfig) -> Result<(Arc<Self>, TransportEvents), ClientError> {
        let endpoint = NodeEndpoint::parse(&config.node_url)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            status: AtomicU8::new(ConnectionStatus::Disconnected as u8),
            request_id: AtomicU64::new(0),
            outgoing: Mutex::new(None),
            pending: DashMap::new(),
            events: events_tx,
        });
        let transport = Self {
            endpoint,
            config,
            shared,
            shutdown_tx: Mutex::new(None),
        };
        Ok((Arc::new(transport), events_rx))
    }

    /// Endpoint this transport dials.
    pub fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    /// Connection loop with reconnection logic.
    async fn connection_loop(
        shared: Arc<Shared>,
        url: String,
        config: BatchClientConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        first_attempt: oneshot::Sender<Result<(), ClientError>>,
    ) {
        let mut first_attempt = Some(first_attempt);
        let mut reconnect_attempts = 0u32;

        loop {
            shared.set_status(ConnectionStatus::Connecting);
            shared.emit(TransportEvent::Connecting);

            let outcome = tokio::select! {
                outcome = Self::run_connection(&shared, &url, &config, &mut first_attempt) => outcome,
                _ = shutdown_rx.recv() => {
                    let was_connected = shared.status() == ConnectionStatus::Connected;
                    shared.teardown(was_connected);
                    break;
                }
            };

            match outcome {
                Ok(()) => {
                    shared.teardown(true);
                    reconnect_attempts = 0;
                }
                Err(e) => {
                    shared.teardown(false);
                    reconnect_attempts = reconnect_attempts.saturating_add(1);
                    warn!(attempt = reconnect_attempts, "[batch] {}", e);
                    if let Some(tx) = first_attempt.take() {
                        let _ = tx.send(Err(e));
                    }
                }
            }

            let delay_secs = calculate_backoff_delay(reconnect_attempts);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// Run a single connection until the socket closes.
    ///
    /// Errors only when the connection could not be established.
    async fn run_connection(
        shared: &Arc<Shared>,
        url: &str,
        config: &BatchClientConfig,
        first_attempt: &mut Option<oneshot::Sender<Result<(), ClientError>>>,
    ) -> Result<(), ClientError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Network(format!("Failed to connect to {}: {}", url, e)))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        *shared.outgoing.lock() = Some(out_tx);
        shared.set_status(ConnectionStatus::Connected);

        // Version negotiation must be the first request on the connection.
        let handshake = Arc::clone(shared);
        let version_params = vec![
            Value::String(config.client_name.clone()),
            Value::String(config.protocol_version.clone()),
        ];
        tokio::spawn(async move {
            match handshake.request("server.version", &version_params).await {
                Ok(version) => debug!(server_version = %version, "[batch] Negotiated protocol"),
                Err(e) => warn!("[batch] server.version failed: {}", e),
            }
        });

        info!(url = url, "[batch] WebSocket connected");
        shared.emit(TransportEvent::Connected);
        if let Some(tx) = first_attempt.take() {
            let _ = tx.send(Ok(()));
        }

        let period = Duration::from_secs(config.keep_alive_secs.max(1));
        let mut keep_alive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                Some(message) = out_rx.recv() => {
                    if let Err(e) = write.send(message).await {
                        warn!("[batch] WebSocket write failed: {}", e);
                        break;
                    }
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => shared.handle_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("[batch] WebSocket read failed: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                },
                _ = keep_alive.tick() => shared.send_ping(),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    fn next_request_id(&self) -> u64 {
        self.shared.next_id()
    }

    fn send_batch(&self, batch: Vec<WireRequest>) -> Result<(), ClientError> {
        if self.shared.status() != ConnectionStatus::Connected {
            return Err(ClientError::disconnected());
        }
        let frame: Vec<RpcRequest<'_>> = batch
            .iter()
            .map(|req| RpcRequest::new(req.id, &req.method, &req.params))
            .collect();
        self.shared.send_frame(&frame)
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        self.shared.request(method, &params).await
    }

    async fn subscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        let status = self.shared.request(method, &params).await?;
        let mut notification = params;
        notification.push(status);
        self.shared.emit(TransportEvent::Notification {
            method: method.to_string(),
            params: notification,
        });
        Ok(())
    }

    async fn unsubscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        let method = method.replace(".subscribe", ".unsubscribe");
        self.shared.request(&method, &params).await.map(|_| ())
    }

    async fn connect(&self) -> Result<(), ClientError> {
        let (first_tx, first_rx) = oneshot::channel();
        {
            let mut shutdown = self.shutdown_tx.lock();
            if shutdown.is_some() {
                return Ok(());
            }
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
            *shutdown = Some(shutdown_tx);
            tokio::spawn(Self::connection_loop(
                Arc::clone(&self.shared),
                self.endpoint.url(),
                self.config.clone(),
                shutdown_rx,
                first_tx,
            ));
        }
        first_rx
            .await
            .unwrap_or_else(|_| Err(ClientError::Network("Connection task ended".into())))
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let shutdown = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(()).await;
        }
        Ok(())
    }
}
