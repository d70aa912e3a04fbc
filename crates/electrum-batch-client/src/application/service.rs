//! # Batch Client Service
//!
//! Multiplexes logical requests from named, independently rate-limited
//! categories onto wire-level JSON-RPC batches over one transport, and
//! demultiplexes the responses back to the callers.
//!
//! ## Dequeue state machine
//!
//! A category's queue is drained by `dequeue`, re-entered from three places:
//! after `enqueue`, after every request of a dispatched batch settled, and
//! from the category's retry timer. Each pass:
//!
//! 1. stops when the category is paused, and rejects everything with a
//!    network error when the transport is not connected;
//! 2. prunes the rate window and computes the free budget (capped by the
//!    chunk size);
//! 3. with no budget, schedules a retry for when the oldest sample leaves
//!    the window;
//! 4. otherwise moves up to budget unsettled items from `pending_send` to
//!    `pending_response` and sends them as one batch.
//!
//! All queue state lives behind one lock. Caller callbacks are collected as
//! effects while the lock is held and run after it is released.

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use shared_types::{hash_to_hex, hash_transaction_ui_order};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wallet_telemetry::{BATCH_CHUNKS_SENT, BATCH_REQUESTS_SENT, RATE_LIMIT_PAUSES};

use crate::config::{BatchClientConfig, CategoryConfig, RATE_LIMIT_ERROR_CODE};
use crate::domain::{
    AbortGroup, BatchRequestItem, CategoryState, ClientError, Effect, InternalItem,
};
use crate::ports::{
    ConnectionListener, ConnectionStatus, ElectrumApi, Transport, TransportEvent,
    TransportEvents, WireRequest,
};

const TRANSACTION_SUBSCRIBE: &str = "blockchain.transaction.subscribe";
const TRANSACTION_BROADCAST: &str = "blockchain.transaction.broadcast";

type ConfirmationSender = oneshot::Sender<Result<(), ClientError>>;

/// Mutable state guarded by one lock.
#[derive(Default)]
struct ClientState {
    categories: HashMap<String, CategoryState>,
    /// Set while the server-signalled rate-limit cool-down runs.
    rate_limit_pause: Option<JoinHandle<()>>,
    destroyed: bool,
    /// Broadcasts waiting for a transaction status, by txid.
    confirmations: HashMap<String, Vec<ConfirmationSender>>,
}

struct Inner<T: Transport> {
    config: BatchClientConfig,
    transport: Arc<T>,
    state: Mutex<ClientState>,
    listeners: RwLock<Vec<Arc<dyn ConnectionListener>>>,
    next_batch_id: AtomicU64,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    init: OnceCell<()>,
}

/// Batch client over a transport.
///
/// Cheap to clone; clones share one connection and one set of categories.
pub struct BatchClient<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for BatchClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn run_effects(effects: Vec<Effect>) {
    for effect in effects {
        effect();
    }
}

impl<T: Transport> BatchClient<T> {
    /// Create a client and start consuming the transport's events.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: BatchClientConfig, transport: Arc<T>, events: TransportEvents) -> Self {
        let inner = Arc::new(Inner {
            config,
            transport,
            state: Mutex::new(ClientState::default()),
            listeners: RwLock::new(Vec::new()),
            next_batch_id: AtomicU64::new(1),
            event_loop: Mutex::new(None),
            init: OnceCell::new(),
        });
        let handle = tokio::spawn(run_event_loop(Arc::downgrade(&inner), events));
        *inner.event_loop.lock() = Some(handle);
        Self { inner }
    }

    /// Register a lifecycle and notification observer.
    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Wait for the first connection attempt.
    ///
    /// A failed attempt is logged, not returned; the transport keeps
    /// reconnecting on its own.
    pub async fn init(&self) -> Result<(), ClientError> {
        self.inner.ensure_alive()?;
        self.inner
            .init
            .get_or_init(|| async {
                if let Err(e) = self.inner.transport.connect().await {
                    warn!("[batch] Initial connect attempt to electrum has failed: {}", e);
                }
            })
            .await;
        Ok(())
    }

    /// Shut the client down.
    ///
    /// Rejects everything outstanding, clears every timer and disconnects.
    /// Calling it again is a no-op.
    pub async fn destroy(&self) {
        let effects = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            if let Some(timer) = state.rate_limit_pause.take() {
                timer.abort();
            }
            let mut effects = Vec::new();
            for category in state.categories.values_mut() {
                category.clear_retry();
                effects.extend(category.reject_all(&ClientError::Destroyed));
            }
            for (_, waiters) in state.confirmations.drain() {
                for waiter in waiters {
                    let _ = waiter.send(Err(ClientError::Destroyed));
                }
            }
            effects
        };
        run_effects(effects);
        if let Err(e) = self.inner.transport.disconnect().await {
            warn!("[batch] Disconnect during destroy failed: {}", e);
        }
        if let Some(handle) = self.inner.event_loop.lock().take() {
            handle.abort();
        }
        info!("[batch] Client destroyed");
    }

    /// Current transport state.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.transport.status()
    }

    /// True when a category with this name exists.
    pub fn has_category(&self, name: &str) -> bool {
        self.inner.state.lock().categories.contains_key(name)
    }

    /// Unsettled items of a category, or `None` for an unknown name.
    pub fn outstanding(&self, name: &str) -> Option<usize> {
        self.inner
            .state
            .lock()
            .categories
            .get(name)
            .map(CategoryState::outstanding)
    }

    /// True while the rate-limit cool-down runs.
    pub fn is_rate_limit_paused(&self) -> bool {
        self.inner.state.lock().rate_limit_pause.is_some()
    }
}

async fn run_event_loop<T: Transport>(inner: Weak<Inner<T>>, mut events: TransportEvents) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
}

impl<T: Transport> Inner<T> {
    fn ensure_alive(&self) -> Result<(), ClientError> {
        if self.state.lock().destroyed {
            return Err(ClientError::Destroyed);
        }
        Ok(())
    }

    fn listeners(&self) -> Vec<Arc<dyn ConnectionListener>> {
        self.listeners.read().clone()
    }

    fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connecting => {
                info!("[batch] Connecting to the electrum node");
                self.listeners().iter().for_each(|l| l.on_connecting());
            }
            TransportEvent::Connected => {
                info!("[batch] Connection to the electrum node is established");
                self.listeners().iter().for_each(|l| l.on_connected());
            }
            TransportEvent::Disconnected => {
                info!("[batch] Connection to the electrum node is lost");
                self.on_disconnected();
                self.listeners().iter().for_each(|l| l.on_disconnected());
            }
            TransportEvent::Notification { method, params } => {
                self.check_confirmation(&method, &params);
                self.listeners()
                    .iter()
                    .for_each(|l| l.on_notification(&method, &params));
            }
            TransportEvent::Response { id, result } => self.on_response(id, result),
            TransportEvent::ErrorFrame { code, message } => {
                if code == RATE_LIMIT_ERROR_CODE {
                    self.on_rate_limited();
                } else {
                    warn!(code, "[batch] electrum-client error: {}", message);
                }
            }
        }
    }

    fn on_disconnected(&self) {
        let effects = {
            let mut state = self.state.lock();
            if let Some(timer) = state.rate_limit_pause.take() {
                timer.abort();
            }
            let error = ClientError::Network("Connection to the electrum node is lost".into());
            let mut effects = Vec::new();
            for category in state.categories.values_mut() {
                category.clear_retry();
                category.pause = false;
                effects.extend(category.reject_all(&error));
            }
            for (_, waiters) in state.confirmations.drain() {
                for waiter in waiters {
                    let _ = waiter.send(Err(ClientError::Network(
                        "Client disconnected before broadcast confirmation".into(),
                    )));
                }
            }
            effects
        };
        run_effects(effects);
    }

    fn check_confirmation(&self, method: &str, params: &[Value]) {
        if method != TRANSACTION_SUBSCRIBE {
            return;
        }
        let (Some(txhash), Some(status)) = (params.first().and_then(Value::as_str), params.get(1))
        else {
            return;
        };
        if status.is_null() {
            return;
        }
        let waiters = self.state.lock().confirmations.remove(txhash);
        for waiter in waiters.into_iter().flatten() {
            let _ = waiter.send(Ok(()));
        }
    }

    fn on_response(self: &Arc<Self>, id: u64, result: Result<Value, ClientError>) {
        let mut effects: Vec<Effect> = Vec::new();
        let mut batch_done = None;
        {
            let mut state = self.state.lock();
            let found = state
                .categories
                .values_mut()
                .find_map(|category| category.take_item(id).map(|item| (category, item)));
            let Some((category, mut item)) = found else {
                debug!(request_id = id, "[batch] Response for unknown request id");
                return;
            };
            match result {
                Ok(value) => {
                    if let Some(observer) = item.on_response.clone() {
                        let raw = value.clone();
                        effects.push(Box::new(move || observer(&raw)));
                    }
                    effects.extend(item.resolve(value));
                }
                Err(error) => effects.extend(item.reject(error)),
            }
            if let Some(batch_id) = item.batch_id {
                if let Some(remaining) = category.inflight_batches.get_mut(&batch_id) {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        category.inflight_batches.remove(&batch_id);
                        batch_done = Some(category.name.clone());
                    }
                }
            }
        }
        run_effects(effects);
        if let Some(name) = batch_done {
            self.dequeue(&name);
        }
    }

    fn on_rate_limited(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.destroyed || state.rate_limit_pause.is_some() {
            return;
        }
        let pause = self.config.rate_limit_pause();
        warn!(
            pause_secs = pause.as_secs(),
            "[batch] Batch rate limit reached, pausing all categories"
        );
        RATE_LIMIT_PAUSES.inc();
        for category in state.categories.values_mut() {
            category.pause = true;
        }
        let weak = Arc::downgrade(self);
        state.rate_limit_pause = Some(tokio::spawn(async move {
            tokio::time::sleep(pause).await;
            if let Some(inner) = weak.upgrade() {
                inner.resume_after_rate_limit();
            }
        }));
    }

    fn resume_after_rate_limit(self: &Arc<Self>) {
        let names: Vec<String> = {
            let mut state = self.state.lock();
            state.rate_limit_pause = None;
            state
                .categories
                .values_mut()
                .map(|category| {
                    category.requeue_in_flight();
                    category.pause = false;
                    category.name.clone()
                })
                .collect()
        };
        info!(categories = names.len(), "[batch] Resuming after rate limit pause");
        for name in names {
            self.dequeue(&name);
        }
    }

    fn dequeue(self: &Arc<Self>, name: &str) {
        let effects = {
            let mut state = self.state.lock();
            let Some(category) = state.categories.get_mut(name) else {
                return;
            };
            if category.pause {
                return;
            }
            if self.transport.status() != ConnectionStatus::Connected {
                category.reject_all(&ClientError::disconnected())
            } else {
                self.dispatch_chunk(category)
            }
        };
        run_effects(effects);
    }

    fn dispatch_chunk(self: &Arc<Self>, category: &mut CategoryState) -> Vec<Effect> {
        let now = Instant::now();
        let budget = category.window.available(now, self.config.max_chunk_size);
        if budget == 0 {
            let waiting = category.pending_send.iter().any(|item| !item.ended());
            if waiting && category.retry.is_none() {
                let delay = category.window.retry_delay(now, self.config.retry_margin());
                debug!(
                    category = %category.name,
                    delay_ms = delay.as_millis() as u64,
                    "[batch] Rate window exhausted, scheduling retry"
                );
                self.schedule_retry(category, delay);
            }
            return Vec::new();
        }

        let mut chunk: Vec<InternalItem> = Vec::new();
        while chunk.len() < budget {
            let Some(item) = category.pending_send.pop_front() else {
                break;
            };
            if !item.ended() {
                chunk.push(item);
            }
        }
        if chunk.is_empty() {
            return Vec::new();
        }

        let batch_id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let wire: Vec<WireRequest> = chunk
            .iter_mut()
            .map(|item| {
                item.batch_id = Some(batch_id);
                WireRequest {
                    id: item.request_id,
                    method: item.method.clone(),
                    params: item.params.clone(),
                }
            })
            .collect();
        let size = wire.len();
        category.inflight_batches.insert(batch_id, size);
        category.window.record(now, size);
        category.pending_response.extend(chunk);

        debug!(
            category = %category.name,
            count = size,
            "[batch] Sending batch requests"
        );
        BATCH_REQUESTS_SENT
            .with_label_values(&[category.name.as_str()])
            .inc_by(size as f64);
        BATCH_CHUNKS_SENT
            .with_label_values(&[category.name.as_str()])
            .inc();

        match self.transport.send_batch(wire) {
            Ok(()) => Vec::new(),
            Err(error) => category.reject_all(&error),
        }
    }

    fn schedule_retry(self: &Arc<Self>, category: &mut CategoryState, delay: std::time::Duration) {
        let weak = Arc::downgrade(self);
        let name = category.name.clone();
        category.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(category) = inner.state.lock().categories.get_mut(&name) {
                category.retry = None;
            }
            inner.dequeue(&name);
        }));
    }

    fn spawn_abort_watcher(
        self: &Arc<Self>,
        name: String,
        ids: Vec<u64>,
        token: CancellationToken,
        group: Arc<AbortGroup>,
    ) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let effects = inner
                        .state
                        .lock()
                        .categories
                        .get_mut(&name)
                        .map(|category| category.reject_ids(&ids, &ClientError::Aborted))
                        .unwrap_or_default();
                    debug!(category = %name, rejected = effects.len(), "[batch] Batch aborted");
                    run_effects(effects);
                }
                _ = group.all_settled() => {}
            }
        });
    }
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.get_mut().take() {
            handle.abort();
        }
        let state = self.state.get_mut();
        if let Some(timer) = state.rate_limit_pause.take() {
            timer.abort();
        }
        for category in state.categories.values_mut() {
            category.clear_retry();
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport> ElectrumApi for BatchClient<T> {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        self.inner.ensure_alive()?;
        self.inner.transport.request(method, params).await
    }

    async fn subscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        self.inner.ensure_alive()?;
        self.inner.transport.subscribe(method, params).await
    }

    async fn unsubscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError> {
        self.inner.ensure_alive()?;
        self.inner.transport.unsubscribe(method, params).await
    }

    fn create_batch_sender_category(
        &self,
        name: &str,
        config: CategoryConfig,
    ) -> Result<(), ClientError> {
        if config.rate_limit.max == 0 || config.rate_limit.interval_ms == 0 {
            return Err(ClientError::InvalidCategory(format!(
                "{}: max and interval must be positive",
                name
            )));
        }
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(ClientError::Destroyed);
        }
        if state.categories.contains_key(name) {
            return Err(ClientError::CategoryExists(name.to_string()));
        }
        let mut category = CategoryState::new(name, config);
        // Joins a running rate-limit pause; the resume timer releases it.
        category.pause = state.rate_limit_pause.is_some();
        state.categories.insert(name.to_string(), category);
        debug!(
            category = name,
            max = config.rate_limit.max,
            interval_ms = config.rate_limit.interval_ms,
            "[batch] Created batch sender category"
        );
        Ok(())
    }

    fn enqueue_batch_requests(
        &self,
        category: &str,
        items: Vec<BatchRequestItem>,
        abort: Option<CancellationToken>,
    ) -> Result<(), ClientError> {
        self.inner.ensure_alive()?;
        if !self.has_category(category) {
            return Err(ClientError::UnknownCategory(category.to_string()));
        }
        if abort.as_ref().is_some_and(CancellationToken::is_cancelled) {
            for item in items {
                (item.on_reject)(ClientError::Aborted);
            }
            return Ok(());
        }

        let group = abort.as_ref().map(|_| AbortGroup::new(items.len()));
        let mut ids = Vec::with_capacity(items.len());
        {
            let mut state = self.inner.state.lock();
            let Some(queue) = state.categories.get_mut(category) else {
                return Err(ClientError::UnknownCategory(category.to_string()));
            };
            for item in items {
                let id = self.inner.transport.next_request_id();
                ids.push(id);
                queue
                    .pending_send
                    .push_back(InternalItem::new(id, item, group.clone()));
            }
        }
        if let (Some(token), Some(group)) = (abort, group) {
            self.inner
                .spawn_abort_watcher(category.to_string(), ids, token, group);
        }
        self.inner.dequeue(category);
        Ok(())
    }

    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        wait_for_confirmation: bool,
    ) -> Result<String, ClientError> {
        let txhash = hash_to_hex(&hash_transaction_ui_order(tx_bytes));
        let txhex = hex::encode(tx_bytes);
        if !wait_for_confirmation {
            self.request(TRANSACTION_BROADCAST, vec![json!(txhex)])
                .await?;
            return Ok(txhash);
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .state
            .lock()
            .confirmations
            .entry(txhash.clone())
            .or_default()
            .push(tx);

        let subscribed = self
            .subscribe(TRANSACTION_SUBSCRIBE, vec![json!(txhash)])
            .await;
        if let Err(e) = subscribed {
            self.inner.state.lock().confirmations.remove(&txhash);
            return Err(e);
        }
        if let Err(e) = self
            .request(TRANSACTION_BROADCAST, vec![json!(txhex)])
            .await
        {
            self.inner.state.lock().confirmations.remove(&txhash);
            let _ = self
                .unsubscribe(TRANSACTION_SUBSCRIBE, vec![json!(txhash)])
                .await;
            return Err(e);
        }

        let outcome = rx.await.unwrap_or_else(|_| {
            Err(ClientError::Network(
                "Client disconnected before broadcast confirmation".into(),
            ))
        });
        outcome?;
        if let Err(e) = self
            .unsubscribe(TRANSACTION_SUBSCRIBE, vec![json!(txhash)])
            .await
        {
            debug!(txhash = %txhash, "[batch] Unsubscribe after confirmation failed: {}", e);
        }
        Ok(txhash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockTransport;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    type Receiver = oneshot::Receiver<Result<Value, ClientError>>;

    fn setup() -> (BatchClient<MockTransport>, Arc<MockTransport>) {
        let (mock, events) = MockTransport::new();
        let client = BatchClient::new(BatchClientConfig::for_testing(), mock.clone(), events);
        (client, mock)
    }

    fn items(count: usize) -> (Vec<BatchRequestItem>, Vec<Receiver>) {
        (0..count)
            .map(|i| BatchRequestItem::with_channel("blockchain.transaction.get", vec![json!(i)]))
            .unzip()
    }

    /// Let spawned tasks run; with a paused clock this only advances time
    /// once every task is idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn test_create_category_twice_fails() {
        let (client, _mock) = setup();
        client
            .create_batch_sender_category("idx", CategoryConfig::new(10, 1000))
            .unwrap();
        assert_eq!(
            client.create_batch_sender_category("idx", CategoryConfig::new(10, 1000)),
            Err(ClientError::CategoryExists("idx".into()))
        );
        assert!(matches!(
            client.create_batch_sender_category("zero", CategoryConfig::new(0, 1000)),
            Err(ClientError::InvalidCategory(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_category_is_validation_error() {
        let (client, _mock) = setup();
        let (batch, _rx) = items(1);
        let err = client
            .enqueue_batch_requests("missing", batch, None)
            .unwrap_err();
        assert_eq!(err, ClientError::UnknownCategory("missing".into()));
        assert_eq!(err.kind(), shared_types::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_responses_reach_callers_in_order() {
        let (client, mock) = setup();
        mock.set_responder(|_, params| Ok(json!({ "echo": params[0] })));
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let (batch, receivers) = items(3);
        client.enqueue_batch_requests("idx", batch, None).unwrap();

        for (i, rx) in receivers.into_iter().enumerate() {
            assert_eq!(rx.await.unwrap(), Ok(json!({ "echo": i })));
        }
        let sent = mock.sent_batches();
        assert_eq!(sent.len(), 1);
        let ids: Vec<u64> = sent[0].1.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(client.outstanding("idx"), Some(0));
    }

    #[tokio::test]
    async fn test_on_response_runs_before_resolve() {
        let (client, mock) = setup();
        mock.set_responder(|_, _| Ok(json!("raw")));
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();
        let seen = order.clone();
        let resolved = order.clone();
        let item = BatchRequestItem::new(
            "server.ping",
            vec![],
            move |value| {
                resolved.lock().push(format!("resolve:{}", value));
                let _ = done_tx.send(());
            },
            |_| {},
        )
        .on_response(move |value| seen.lock().push(format!("response:{}", value)));
        client.enqueue_batch_requests("idx", vec![item], None).unwrap();
        done_rx.await.unwrap();
        assert_eq!(
            *order.lock(),
            vec!["response:\"raw\"".to_string(), "resolve:\"raw\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rpc_error_rejects_item() {
        let (client, mock) = setup();
        mock.set_responder(|_, _| {
            Err(ClientError::Rpc {
                code: 2,
                message: "missing transaction".into(),
            })
        });
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let (batch, mut receivers) = items(1);
        client.enqueue_batch_requests("idx", batch, None).unwrap();
        let result = receivers.remove(0).await.unwrap();
        assert!(matches!(result, Err(ClientError::Rpc { code: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_respect_rate_window() {
        let (client, mock) = setup();
        client
            .create_batch_sender_category("idx", CategoryConfig::new(4, 1_000))
            .unwrap();
        let (batch, receivers) = items(10);
        client.enqueue_batch_requests("idx", batch, None).unwrap();
        for rx in receivers {
            assert!(rx.await.unwrap().is_ok());
        }

        let sent = mock.sent_batches();
        let sizes: Vec<usize> = sent.iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        for pair in sent.windows(2) {
            let gap = pair[1].0.duration_since(pair[0].0);
            assert!(gap >= Duration::from_millis(1_000), "gap {:?}", gap);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_size_caps_batches() {
        let (client, mock) = setup();
        client
            .create_batch_sender_category("idx", CategoryConfig::new(500, 20_000))
            .unwrap();
        // for_testing() caps chunks at 10
        let (batch, receivers) = items(25);
        client.enqueue_batch_requests("idx", batch, None).unwrap();
        for rx in receivers {
            assert!(rx.await.unwrap().is_ok());
        }
        let sizes: Vec<usize> = mock.sent_batches().iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_already_aborted_rejects_without_sending() {
        let (client, mock) = setup();
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let (batch, receivers) = items(3);
        client
            .enqueue_batch_requests("idx", batch, Some(token))
            .unwrap();
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(ClientError::Aborted));
        }
        assert_eq!(mock.sent_request_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_rejects_only_unsettled_items() {
        let (client, mock) = setup();
        mock.set_auto_respond(false);
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let token = CancellationToken::new();
        let (batch, mut receivers) = items(3);
        client
            .enqueue_batch_requests("idx", batch, Some(token.clone()))
            .unwrap();

        let first_id = mock.sent_batches()[0].1[0].id;
        mock.respond(first_id, Ok(json!("done")));
        let first = receivers.remove(0).await.unwrap();
        assert_eq!(first, Ok(json!("done")));

        token.cancel();
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(ClientError::Aborted));
        }
        assert_eq!(client.outstanding("idx"), Some(0));
    }

    #[tokio::test]
    async fn test_late_response_after_abort_still_observed() {
        let (client, mock) = setup();
        mock.set_auto_respond(false);
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        let (item, rx) = BatchRequestItem::with_channel("m", vec![]);
        let item = item.on_response(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let token = CancellationToken::new();
        client
            .enqueue_batch_requests("idx", vec![item], Some(token.clone()))
            .unwrap();
        token.cancel();
        assert_eq!(rx.await.unwrap(), Err(ClientError::Aborted));

        let id = mock.sent_batches()[0].1[0].id;
        mock.respond(id, Ok(json!(1)));
        settle().await;
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_rejects_everything() {
        let (client, mock) = setup();
        mock.set_auto_respond(false);
        client
            .create_batch_sender_category("a", CategoryConfig::new(2, 60_000))
            .unwrap();
        client
            .create_batch_sender_category("b", CategoryConfig::new(100, 1000))
            .unwrap();
        let (batch_a, rx_a) = items(5);
        let (batch_b, rx_b) = items(2);
        client.enqueue_batch_requests("a", batch_a, None).unwrap();
        client.enqueue_batch_requests("b", batch_b, None).unwrap();

        mock.drop_connection();
        for rx in rx_a.into_iter().chain(rx_b) {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), shared_types::ErrorKind::Network);
        }
        assert_eq!(client.outstanding("a"), Some(0));
        assert_eq!(client.outstanding("b"), Some(0));
    }

    #[tokio::test]
    async fn test_enqueue_while_disconnected_fails_items() {
        let (client, mock) = setup();
        mock.set_status(ConnectionStatus::Disconnected);
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let (batch, receivers) = items(2);
        client.enqueue_batch_requests("idx", batch, None).unwrap();
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(ClientError::disconnected()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_frame_pauses_and_resends() {
        let (client, mock) = setup();
        mock.set_auto_respond(false);
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let (batch, receivers) = items(2);
        client.enqueue_batch_requests("idx", batch, None).unwrap();
        assert_eq!(mock.sent_batches().len(), 1);

        mock.emit(TransportEvent::ErrorFrame {
            code: RATE_LIMIT_ERROR_CODE,
            message: "batch limit".into(),
        });
        settle().await;
        assert!(client.is_rate_limit_paused());

        // Queued while paused: nothing goes out
        let (late, late_rx) = items(1);
        client.enqueue_batch_requests("idx", late, None).unwrap();
        assert_eq!(mock.sent_batches().len(), 1);

        // A second frame during the pause is ignored
        mock.emit(TransportEvent::ErrorFrame {
            code: RATE_LIMIT_ERROR_CODE,
            message: "batch limit".into(),
        });
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!client.is_rate_limit_paused());

        let sent = mock.sent_batches();
        assert_eq!(sent.len(), 2);
        let resent: Vec<u64> = sent[1].1.iter().map(|r| r.id).collect();
        let original: Vec<u64> = sent[0].1.iter().map(|r| r.id).collect();
        assert_eq!(&resent[..2], &original[..]);
        assert_eq!(resent.len(), 3);

        for req in &sent[1].1 {
            mock.respond(req.id, Ok(json!("ok")));
        }
        for rx in receivers.into_iter().chain(late_rx) {
            assert_eq!(rx.await.unwrap(), Ok(json!("ok")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_retry_and_pause_timers() {
        let (client, mock) = setup();
        client
            .create_batch_sender_category("a", CategoryConfig::new(2, 60_000))
            .unwrap();
        client
            .create_batch_sender_category("b", CategoryConfig::new(100, 1_000))
            .unwrap();
        let (batch, receivers) = items(5);
        client.enqueue_batch_requests("a", batch, None).unwrap();
        settle().await;
        // Two answered, three waiting on the retry timer
        assert_eq!(mock.sent_batches().len(), 1);
        assert!(client.inner.state.lock().categories["a"].retry.is_some());

        mock.emit(TransportEvent::ErrorFrame {
            code: RATE_LIMIT_ERROR_CODE,
            message: "batch limit".into(),
        });
        settle().await;
        assert!(client.is_rate_limit_paused());

        mock.drop_connection();
        settle().await;
        assert!(!client.is_rate_limit_paused());
        {
            let state = client.inner.state.lock();
            assert!(state
                .categories
                .values()
                .all(|category| category.retry.is_none() && !category.pause));
        }
        let mut failed = 0;
        for rx in receivers {
            if let Err(err) = rx.await.unwrap() {
                assert_eq!(err.kind(), shared_types::ErrorKind::Network);
                failed += 1;
            }
        }
        assert_eq!(failed, 3);

        // Back online: nothing is held back and no stale timer fires
        mock.set_status(ConnectionStatus::Connected);
        mock.emit(TransportEvent::Connected);
        let (batch, receivers) = items(1);
        client.enqueue_batch_requests("b", batch, None).unwrap();
        assert_eq!(mock.sent_batches().len(), 2);
        for rx in receivers {
            assert!(rx.await.unwrap().is_ok());
        }
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(mock.sent_batches().len(), 2);
        assert_eq!(client.outstanding("a"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_category_created_during_pause_waits_for_resume() {
        let (client, mock) = setup();
        mock.emit(TransportEvent::ErrorFrame {
            code: RATE_LIMIT_ERROR_CODE,
            message: "batch limit".into(),
        });
        settle().await;
        assert!(client.is_rate_limit_paused());

        client
            .create_batch_sender_category("late", CategoryConfig::new(100, 1_000))
            .unwrap();
        let (batch, receivers) = items(2);
        client.enqueue_batch_requests("late", batch, None).unwrap();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(mock.sent_batches().is_empty());
        assert_eq!(client.outstanding("late"), Some(2));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!client.is_rate_limit_paused());
        assert_eq!(mock.sent_batches().len(), 1);
        for rx in receivers {
            assert!(rx.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_destroy_rejects_and_blocks_further_use() {
        let (client, mock) = setup();
        mock.set_auto_respond(false);
        client
            .create_batch_sender_category("idx", CategoryConfig::new(100, 1000))
            .unwrap();
        let (batch, receivers) = items(2);
        client.enqueue_batch_requests("idx", batch, None).unwrap();

        client.destroy().await;
        client.destroy().await;
        for rx in receivers {
            assert_eq!(rx.await.unwrap(), Err(ClientError::Destroyed));
        }
        let (batch, _rx) = items(1);
        assert_eq!(
            client.enqueue_batch_requests("idx", batch, None),
            Err(ClientError::Destroyed)
        );
        assert_eq!(client.init().await, Err(ClientError::Destroyed));
        assert_eq!(
            client.request("server.ping", vec![]).await,
            Err(ClientError::Destroyed)
        );
    }

    struct CountingListener {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
        notifications: AtomicUsize,
    }

    impl ConnectionListener for CountingListener {
        fn on_connected(&self) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_disconnected(&self) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_notification(&self, _method: &str, _params: &[Value]) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_listener_receives_lifecycle_events() {
        let (client, mock) = setup();
        let listener = Arc::new(CountingListener {
            connected: AtomicUsize::new(0),
            disconnected: AtomicUsize::new(0),
            notifications: AtomicUsize::new(0),
        });
        client.add_listener(listener.clone());
        client.init().await.unwrap();
        mock.emit(TransportEvent::Notification {
            method: "blockchain.headers.subscribe".into(),
            params: vec![json!({"height": 1})],
        });
        mock.drop_connection();
        settle().await;
        assert_eq!(listener.connected.load(Ordering::SeqCst), 1);
        assert_eq!(listener.notifications.load(Ordering::SeqCst), 1);
        assert_eq!(listener.disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_without_wait_returns_txid() {
        let (client, mock) = setup();
        let tx = vec![0x02, 0x00, 0x00, 0x00];
        let txid = client.broadcast(&tx, false).await.unwrap();
        assert_eq!(txid, hash_to_hex(&hash_transaction_ui_order(&tx)));
        let direct = mock.direct_requests();
        assert_eq!(direct[0].0, TRANSACTION_BROADCAST);
        assert_eq!(direct[0].1, vec![json!("02000000")]);
    }

    #[tokio::test]
    async fn test_broadcast_waits_for_status() {
        let (client, mock) = setup();
        let tx = vec![0x01, 0x02, 0x03];
        let txid = hash_to_hex(&hash_transaction_ui_order(&tx));

        let waiter = {
            let client = client.clone();
            let tx = tx.clone();
            tokio::spawn(async move { client.broadcast(&tx, true).await })
        };
        settle().await;
        assert!(!waiter.is_finished());
        assert_eq!(mock.subscriptions().len(), 1);

        mock.emit(TransportEvent::Notification {
            method: TRANSACTION_SUBSCRIBE.into(),
            params: vec![json!(txid), json!(800_000)],
        });
        assert_eq!(waiter.await.unwrap(), Ok(txid));
        assert!(mock.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_fails_on_disconnect() {
        let (client, mock) = setup();
        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.broadcast(&[0xaa], true).await })
        };
        settle().await;
        mock.drop_connection();
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), shared_types::ErrorKind::Network);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        /// Bursts enqueued at arbitrary times go out in chunks no larger
        /// than the chunk cap, and no window of `interval` carries more
        /// than `max` requests.
        #[test]
        fn prop_client_batches_respect_rate_and_chunk_size(
            max in 1usize..30,
            interval_ms in 100u64..3_000,
            bursts in proptest::collection::vec((0u64..2_000, 1usize..25), 1..8),
        ) {
            let expected: usize = bursts.iter().map(|(_, count)| count).sum();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let sent = runtime.block_on(async {
                let (client, mock) = setup();
                client
                    .create_batch_sender_category("idx", CategoryConfig::new(max, interval_ms))
                    .unwrap();
                let mut receivers = Vec::new();
                for (delay_ms, count) in bursts {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let (batch, rx) = items(count);
                    client.enqueue_batch_requests("idx", batch, None).unwrap();
                    receivers.extend(rx);
                }
                for rx in receivers {
                    assert!(rx.await.unwrap().is_ok());
                }
                mock.sent_batches()
            });

            let cap = BatchClientConfig::for_testing().max_chunk_size.min(max);
            let interval = Duration::from_millis(interval_ms);
            proptest::prop_assert_eq!(sent.iter().map(|(_, b)| b.len()).sum::<usize>(), expected);
            for (i, (t0, batch)) in sent.iter().enumerate() {
                proptest::prop_assert!(batch.len() <= cap, "chunk of {}", batch.len());
                let in_window: usize = sent[i..]
                    .iter()
                    .take_while(|(t, _)| *t < *t0 + interval)
                    .map(|(_, b)| b.len())
                    .sum();
                proptest::prop_assert!(in_window <= max, "window from {:?} held {}", t0, in_window);
            }
        }
    }
}
