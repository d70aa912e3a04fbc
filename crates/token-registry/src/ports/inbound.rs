//! # Inbound Ports
//!
//! How callers ask for token identities and observe the outcome.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{RegistryError, TokenIdentity};

/// Progress of an identity request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for a free fetch slot or for a client.
    Pending,
    /// Being fetched.
    Loading,
}

/// Observer of one identity request.
///
/// Receives status changes (`None` once the request ended), then exactly
/// one of `on_resolve` or `on_reject`.
pub trait TokenIdentityListener: Send + Sync {
    /// Request status changed.
    fn on_status_change(&self, status: Option<RequestStatus>);

    /// Request finished; `None` means the token has no registry record.
    fn on_resolve(&self, identity: Option<TokenIdentity>);

    /// Request failed.
    fn on_reject(&self, error: RegistryError);
}

/// Token identity requests - inbound port.
pub trait TokenIdentityLoader: Send + Sync {
    /// Request the identity of `token_id`. Requests for a token already
    /// pending or loading share its fetch.
    fn request_identity(&self, token_id: &str, listener: Arc<dyn TokenIdentityListener>);
}

// =============================================================================
// Recording listener
// =============================================================================

/// Everything a listener was told.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListenerLog {
    /// Status changes in order.
    pub statuses: Vec<Option<RequestStatus>>,
    /// Resolved values.
    pub resolved: Vec<Option<TokenIdentity>>,
    /// Rejections.
    pub rejected: Vec<RegistryError>,
}

/// Listener that records its notifications.
#[derive(Default)]
pub struct RecordingListener {
    log: Mutex<ListenerLog>,
    done: tokio::sync::Notify,
}

impl RecordingListener {
    /// New listener behind an `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of the log.
    pub fn log(&self) -> ListenerLog {
        self.log.lock().clone()
    }

    /// Whether the request finished.
    pub fn finished(&self) -> bool {
        let log = self.log.lock();
        !log.resolved.is_empty() || !log.rejected.is_empty()
    }

    /// Wait until the request finished.
    pub async fn wait(&self) -> ListenerLog {
        loop {
            let notified = self.done.notified();
            if self.finished() {
                return self.log();
            }
            notified.await;
        }
    }
}

impl TokenIdentityListener for RecordingListener {
    fn on_status_change(&self, status: Option<RequestStatus>) {
        self.log.lock().statuses.push(status);
    }

    fn on_resolve(&self, identity: Option<TokenIdentity>) {
        self.log.lock().resolved.push(identity);
        self.done.notify_waiters();
    }

    fn on_reject(&self, error: RegistryError) {
        self.log.lock().rejected.push(error);
        self.done.notify_waiters();
    }
}
