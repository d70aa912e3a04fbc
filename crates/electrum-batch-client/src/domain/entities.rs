//! # Domain Entities
//!
//! Request items submitted by callers and the per-category queue state
//! owned by the batch client.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use super::errors::ClientError;
use super::rate_window::RateWindow;
use crate::config::CategoryConfig;

/// Called with the result of a successful request.
pub type ResolveFn = Box<dyn FnOnce(Value) + Send>;
/// Called when a request fails, is aborted or the connection drops.
pub type RejectFn = Box<dyn FnOnce(ClientError) + Send>;
/// Observes every raw successful response, even after the item settled.
pub type ResponseFn = Arc<dyn Fn(&Value) + Send + Sync>;

/// A logical request submitted to a batch sender category.
pub struct BatchRequestItem {
    /// Electrum method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    pub(crate) on_resolve: ResolveFn,
    pub(crate) on_reject: RejectFn,
    pub(crate) on_response: Option<ResponseFn>,
}

impl BatchRequestItem {
    /// Create an item with explicit settle callbacks.
    pub fn new(
        method: impl Into<String>,
        params: Vec<Value>,
        on_resolve: impl FnOnce(Value) + Send + 'static,
        on_reject: impl FnOnce(ClientError) + Send + 'static,
    ) -> Self {
        Self {
            method: method.into(),
            params,
            on_resolve: Box::new(on_resolve),
            on_reject: Box::new(on_reject),
            on_response: None,
        }
    }

    /// Create an item whose outcome is delivered on a oneshot channel.
    pub fn with_channel(
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> (Self, oneshot::Receiver<Result<Value, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        let resolve_tx = Arc::new(Mutex::new(Some(tx)));
        let reject_tx = Arc::clone(&resolve_tx);
        let item = Self::new(
            method,
            params,
            move |value| {
                if let Some(tx) = resolve_tx.lock().take() {
                    let _ = tx.send(Ok(value));
                }
            },
            move |error| {
                if let Some(tx) = reject_tx.lock().take() {
                    let _ = tx.send(Err(error));
                }
            },
        );
        (item, rx)
    }

    /// Attach a raw response observer.
    ///
    /// The observer runs before `on_resolve` and also for responses that
    /// arrive after the item was aborted.
    pub fn on_response(mut self, observer: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_response = Some(Arc::new(observer));
        self
    }
}

impl std::fmt::Debug for BatchRequestItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequestItem")
            .field("method", &self.method)
            .finish()
    }
}

/// Counts the unsettled items of one `enqueue` call so the abort watcher
/// can exit once nothing is left to cancel.
#[derive(Default)]
pub struct AbortGroup {
    remaining: AtomicUsize,
    done: Notify,
}

impl AbortGroup {
    /// Group tracking `size` items.
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(size),
            done: Notify::new(),
        })
    }

    /// Mark one item settled.
    pub fn settle_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.notify_one();
        }
    }

    /// Wait until every item of the group has settled.
    pub async fn all_settled(&self) {
        if self.remaining.load(Ordering::Acquire) == 0 {
            return;
        }
        self.done.notified().await;
    }
}

/// Settle callbacks of a queued item; `None` once the item has ended.
pub(crate) struct Settle {
    on_resolve: ResolveFn,
    on_reject: RejectFn,
}

/// A deferred callback invocation, run after the state lock is released.
pub(crate) type Effect = Box<dyn FnOnce() + Send>;

/// Request item after it has been assigned an id.
pub(crate) struct InternalItem {
    pub request_id: u64,
    pub method: String,
    pub params: Vec<Value>,
    pub on_response: Option<ResponseFn>,
    pub batch_id: Option<u64>,
    settle: Option<Settle>,
    group: Option<Arc<AbortGroup>>,
}

impl InternalItem {
    pub fn new(request_id: u64, item: BatchRequestItem, group: Option<Arc<AbortGroup>>) -> Self {
        Self {
            request_id,
            method: item.method,
            params: item.params,
            on_response: item.on_response,
            batch_id: None,
            settle: Some(Settle {
                on_resolve: item.on_resolve,
                on_reject: item.on_reject,
            }),
            group,
        }
    }

    /// True once resolved or rejected.
    pub fn ended(&self) -> bool {
        self.settle.is_none()
    }

    fn finish(&mut self) -> Option<Settle> {
        let settle = self.settle.take()?;
        if let Some(group) = &self.group {
            group.settle_one();
        }
        Some(settle)
    }

    /// Resolve once; later calls are no-ops.
    pub fn resolve(&mut self, value: Value) -> Option<Effect> {
        let settle = self.finish()?;
        Some(Box::new(move || (settle.on_resolve)(value)))
    }

    /// Reject once; later calls are no-ops.
    pub fn reject(&mut self, error: ClientError) -> Option<Effect> {
        let settle = self.finish()?;
        Some(Box::new(move || (settle.on_reject)(error)))
    }
}

/// Queue state of one named batch sender category.
///
/// An unsettled item lives in exactly one of `pending_send` and
/// `pending_response`.
pub(crate) struct CategoryState {
    pub name: String,
    pub window: RateWindow,
    pub pending_send: VecDeque<InternalItem>,
    pub pending_response: Vec<InternalItem>,
    pub pause: bool,
    pub retry: Option<JoinHandle<()>>,
    /// Unanswered request count per dispatched wire batch.
    pub inflight_batches: HashMap<u64, usize>,
}

impl CategoryState {
    pub fn new(name: &str, config: CategoryConfig) -> Self {
        Self {
            name: name.to_string(),
            window: RateWindow::new(config.rate_limit),
            pending_send: VecDeque::new(),
            pending_response: Vec::new(),
            pause: false,
            retry: None,
            inflight_batches: HashMap::new(),
        }
    }

    /// Cancel the scheduled retry, if any.
    pub fn clear_retry(&mut self) {
        if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }

    /// Reject every outstanding item and empty both queues.
    pub fn reject_all(&mut self, error: &ClientError) -> Vec<Effect> {
        let mut effects = Vec::new();
        for mut item in self.pending_response.drain(..) {
            effects.extend(item.reject(error.clone()));
        }
        for mut item in self.pending_send.drain(..) {
            effects.extend(item.reject(error.clone()));
        }
        self.inflight_batches.clear();
        effects
    }

    /// Reject the unsettled items with the given ids, leaving them queued
    /// so late responses still reach `on_response`.
    pub fn reject_ids(&mut self, ids: &[u64], error: &ClientError) -> Vec<Effect> {
        self.pending_send
            .iter_mut()
            .chain(self.pending_response.iter_mut())
            .filter(|item| ids.contains(&item.request_id))
            .filter_map(|item| item.reject(error.clone()))
            .collect()
    }

    /// Move in-flight items back to the front of the send queue.
    pub fn requeue_in_flight(&mut self) {
        let mut requeued: VecDeque<InternalItem> = self
            .pending_response
            .drain(..)
            .map(|mut item| {
                item.batch_id = None;
                item
            })
            .collect();
        requeued.append(&mut self.pending_send);
        self.pending_send = requeued;
        self.inflight_batches.clear();
    }

    /// Remove the item answering `request_id` from whichever queue holds it.
    pub fn take_item(&mut self, request_id: u64) -> Option<InternalItem> {
        if let Some(pos) = self
            .pending_response
            .iter()
            .position(|item| item.request_id == request_id)
        {
            return Some(self.pending_response.remove(pos));
        }
        let pos = self
            .pending_send
            .iter()
            .position(|item| item.request_id == request_id)?;
        self.pending_send.remove(pos)
    }

    /// Number of unsettled items across both queues.
    pub fn outstanding(&self) -> usize {
        self.pending_send
            .iter()
            .chain(self.pending_response.iter())
            .filter(|item| !item.ended())
            .count()
    }
}
