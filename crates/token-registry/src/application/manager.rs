//! # Token Registry Manager
//!
//! Resolves token identities with bounded concurrency.
//!
//! Requests wait in `pending` until a client is connected and one of
//! `max_concurrent` slots in `running` is free, then move over in FIFO
//! order. A request for a token already pending or running joins that
//! entry: the fetch happens once and its outcome is fanned out to every
//! listener.
//!
//! ## Resolution of one token
//!
//! 1. resolve the authentication chain of the token id;
//! 2. keep the entries carrying a metadata pointer; none means no record;
//! 3. newest first, for up to `max_attempts` entries: load the document
//!    (store cache first, then the first https URL), verify its hash,
//!    parse it and pick the snapshot valid now. A failure falls back to the
//!    next older entry; the last failure is returned.

use chrono::{DateTime, Utc};
use electrum_batch_client::ConnectionListener;
use parking_lot::Mutex;
use shared_types::{hash_from_hex, short_hex, ErrorKind, KeyValueStore};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wallet_telemetry::REGISTRY_FETCHES;

use bcmr_authchain::{AuthChainProvider, BcmrPointer};

use crate::adapters::{ContentCache, TokenBcmrContentsRecord};
use crate::config::RegistryConfig;
use crate::domain::{
    identity_from_snapshot, pull_identity_snapshot, rewrite_url, validate_registry,
    IdentitySnapshot, Registry, RegistryError, TokenIdentity,
};
use crate::ports::{ContentFetcher, RequestStatus, TokenIdentityListener, TokenIdentityLoader};

type Listeners = Vec<Arc<dyn TokenIdentityListener>>;

struct FetchRequest {
    token_id: String,
    listeners: Listeners,
}

#[derive(Default)]
struct ManagerState {
    pending: VecDeque<FetchRequest>,
    running: Vec<FetchRequest>,
    client_available: bool,
}

struct Inner<P, F, S: KeyValueStore> {
    config: RegistryConfig,
    provider: Arc<P>,
    fetcher: Arc<F>,
    cache: ContentCache<S>,
    state: Mutex<ManagerState>,
}

/// Identity snapshot together with the pointer it was read through.
struct LoadedIdentity {
    snapshot: IdentitySnapshot,
    pointer: BcmrPointer,
}

/// Token registry manager.
///
/// Cheap to clone; clones share queues and slots.
pub struct TokenRegistryManager<P, F, S: KeyValueStore> {
    inner: Arc<Inner<P, F, S>>,
}

impl<P, F, S: KeyValueStore> Clone for TokenRegistryManager<P, F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, F, S> TokenRegistryManager<P, F, S>
where
    P: AuthChainProvider + 'static,
    F: ContentFetcher + 'static,
    S: KeyValueStore + 'static,
{
    /// Create a manager. No request runs before `on_client_connected`.
    pub fn new(config: RegistryConfig, provider: Arc<P>, fetcher: Arc<F>, store: Arc<S>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                fetcher,
                cache: ContentCache::new(store),
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// A client became available; start pending requests.
    pub fn on_client_connected(&self) {
        self.inner.state.lock().client_available = true;
        self.dequeue();
    }

    /// The client went away; pending requests wait for the next one.
    pub fn on_client_disconnected(&self) {
        self.inner.state.lock().client_available = false;
    }

    /// Requests waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Requests being fetched.
    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    fn dequeue(&self) {
        let now = Utc::now();
        let mut started = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if !state.client_available {
                return;
            }
            while state.running.len() < self.inner.config.max_concurrent {
                let Some(request) = state.pending.pop_front() else {
                    break;
                };
                started.push((request.token_id.clone(), request.listeners.clone()));
                state.running.push(request);
            }
        }

        for (token_id, listeners) in started {
            for listener in &listeners {
                listener.on_status_change(Some(RequestStatus::Loading));
            }
            let manager = self.clone();
            tokio::spawn(async move {
                let result = manager.fetch_token_identity(&token_id, now).await;
                manager.finish(&token_id, result);
            });
        }
    }

    fn finish(&self, token_id: &str, result: Result<Option<TokenIdentity>, RegistryError>) {
        let listeners = {
            let mut state = self.inner.state.lock();
            match state.running.iter().position(|r| r.token_id == token_id) {
                Some(idx) => state.running.remove(idx).listeners,
                None => Vec::new(),
            }
        };
        for listener in &listeners {
            listener.on_status_change(None);
        }
        self.dequeue();

        let outcome = match &result {
            Ok(Some(_)) => "found",
            Ok(None) => "no_record",
            Err(_) => "error",
        };
        REGISTRY_FETCHES.with_label_values(&[outcome]).inc();
        match result {
            Ok(identity) => {
                for listener in &listeners {
                    listener.on_resolve(identity.clone());
                }
            }
            Err(e) => {
                for listener in &listeners {
                    listener.on_reject(e.clone());
                }
            }
        }
    }

    /// Resolve one token; `None` when it has no registry record.
    pub async fn fetch_token_identity(
        &self,
        token_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<TokenIdentity>, RegistryError> {
        let loaded = match self.load_identity_snapshot(token_id, at).await {
            Ok(loaded) => loaded,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        identity_from_snapshot(
            token_id,
            &loaded.pointer.content_hash,
            loaded.snapshot,
            &self.inner.config.ipfs_endpoint,
        )
        .map(Some)
        .ok_or(RegistryError::MissingToken)
    }

    async fn load_identity_snapshot(
        &self,
        token_id: &str,
        at: DateTime<Utc>,
    ) -> Result<LoadedIdentity, RegistryError> {
        if !self.inner.state.lock().client_available {
            return Err(RegistryError::ClientUnavailable);
        }
        let authbase =
            hash_from_hex(token_id).map_err(|e| RegistryError::InvalidTokenId(e.to_string()))?;
        let chain = self
            .inner
            .provider
            .fetch_auth_chain(&authbase, self.inner.config.max_indexing_cost)
            .await?;
        let pointers = chain.pointers_newest_first();
        if pointers.is_empty() {
            return Err(RegistryError::NoRecord);
        }

        let attempts = pointers.len().min(self.inner.config.max_attempts.max(1));
        let mut last_error = RegistryError::NoRecord;
        for (attempt, (txhash, pointer)) in pointers.into_iter().take(attempts).enumerate() {
            let result = match self.fetch_token_bcmr(token_id, pointer).await {
                Ok(registry) => pull_identity_snapshot(&registry, token_id, at),
                Err(e) => Err(e),
            };
            match result {
                Ok(snapshot) => {
                    return Ok(LoadedIdentity {
                        snapshot,
                        pointer: pointer.clone(),
                    })
                }
                Err(e) => {
                    if attempt + 1 < attempts {
                        warn!(
                            token_id,
                            txhash = %short_hex(txhash),
                            "[registry] Failed to register a bcmr token, trying earlier bcmr: {}",
                            e
                        );
                    }
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Load and verify the document behind `pointer`, cache first.
    async fn fetch_token_bcmr(
        &self,
        token_id: &str,
        pointer: &BcmrPointer,
    ) -> Result<Registry, RegistryError> {
        match self.inner.cache.get(token_id, &pointer.content_hash).await {
            Ok(Some(record)) => match validate_registry(&record.content, &pointer.content_hash) {
                Ok(registry) => return Ok(registry),
                Err(e) => warn!(token_id, "[registry] Cached registry is unusable: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!(token_id, "[registry] Load from registry cache failed: {}", e),
        }

        let urls: Vec<String> = pointer
            .urls
            .iter()
            .map(|url| rewrite_url(url, &self.inner.config.ipfs_endpoint))
            .collect();
        let content = self.fetch_contents(&urls).await?;
        let registry = validate_registry(&content, &pointer.content_hash)?;

        let record = TokenBcmrContentsRecord {
            content,
            urls: pointer.urls.clone(),
            content_hash: pointer.content_hash,
            token_id: token_id.to_string(),
        };
        if let Err(e) = self.inner.cache.put(&record).await {
            warn!(token_id, "[registry] Save to registry cache failed: {}", e);
        }
        Ok(registry)
    }

    async fn fetch_contents(&self, urls: &[String]) -> Result<Vec<u8>, RegistryError> {
        let url = urls
            .iter()
            .find(|url| url.starts_with("https://"))
            .ok_or(RegistryError::NoHttpsUrl)?;
        debug!(url = %url, "[registry] Fetching registry document");
        let response = self.inner.fetcher.fetch(url).await?;
        if response.status != 200 {
            let excerpt: String = String::from_utf8_lossy(&response.body)
                .chars()
                .take(self.inner.config.excerpt_len)
                .collect();
            return Err(RegistryError::HttpStatus {
                url: url.clone(),
                status: response.status,
                excerpt,
            });
        }
        Ok(response.body)
    }
}

impl<P, F, S> TokenIdentityLoader for TokenRegistryManager<P, F, S>
where
    P: AuthChainProvider + 'static,
    F: ContentFetcher + 'static,
    S: KeyValueStore + 'static,
{
    fn request_identity(&self, token_id: &str, listener: Arc<dyn TokenIdentityListener>) {
        let status = {
            let mut state = self.inner.state.lock();
            if let Some(running) = state.running.iter_mut().find(|r| r.token_id == token_id) {
                running.listeners.push(Arc::clone(&listener));
                RequestStatus::Loading
            } else {
                match state.pending.iter_mut().find(|r| r.token_id == token_id) {
                    Some(pending) => pending.listeners.push(Arc::clone(&listener)),
                    None => state.pending.push_back(FetchRequest {
                        token_id: token_id.to_string(),
                        listeners: vec![Arc::clone(&listener)],
                    }),
                }
                RequestStatus::Pending
            }
        };
        listener.on_status_change(Some(status));
        self.dequeue();
    }
}

impl<P, F, S> ConnectionListener for TokenRegistryManager<P, F, S>
where
    P: AuthChainProvider + 'static,
    F: ContentFetcher + 'static,
    S: KeyValueStore + 'static,
{
    fn on_connected(&self) {
        info!("[registry] Electrum client connected");
        self.on_client_connected();
    }

    fn on_disconnected(&self) {
        info!("[registry] Electrum client disconnected");
        self.on_client_disconnected();
    }
}
