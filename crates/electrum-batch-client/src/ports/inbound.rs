//! # Inbound Ports
//!
//! What the batch client offers to the rest of the wallet.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::CategoryConfig;
use crate::domain::{BatchRequestItem, ClientError};

/// Electrum API - inbound port.
#[async_trait]
pub trait ElectrumApi: Send + Sync {
    /// Send one request directly, bypassing batch categories.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError>;

    /// Subscribe to a method.
    async fn subscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError>;

    /// Cancel a subscription.
    async fn unsubscribe(&self, method: &str, params: Vec<Value>) -> Result<(), ClientError>;

    /// Register a named, independently rate-limited category.
    ///
    /// Fails with `CategoryExists` when the name is taken.
    fn create_batch_sender_category(
        &self,
        name: &str,
        config: CategoryConfig,
    ) -> Result<(), ClientError>;

    /// Queue items on a category.
    ///
    /// With an already-cancelled `abort` every item is rejected with
    /// `Aborted` and nothing is queued. A later cancellation rejects only
    /// the items not settled yet.
    fn enqueue_batch_requests(
        &self,
        category: &str,
        items: Vec<BatchRequestItem>,
        abort: Option<CancellationToken>,
    ) -> Result<(), ClientError>;

    /// Broadcast a raw transaction and return its txid (UI-order hex).
    ///
    /// With `wait_for_confirmation` set, resolves only once the node
    /// reports a status for the transaction.
    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        wait_for_confirmation: bool,
    ) -> Result<String, ClientError>;
}

/// Observer of connection lifecycle and push notifications.
///
/// Registered explicitly on the client; every hook defaults to a no-op.
pub trait ConnectionListener: Send + Sync {
    /// Connection established.
    fn on_connected(&self) {}

    /// Connection lost. Subscriptions are not restored automatically.
    fn on_disconnected(&self) {}

    /// Connection attempt started.
    fn on_connecting(&self) {}

    /// Subscription notification.
    fn on_notification(&self, _method: &str, _params: &[Value]) {}
}
