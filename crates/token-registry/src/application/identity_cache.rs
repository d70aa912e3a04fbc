//! # Token Identity Cache
//!
//! The wallet's view of token identities: one entry per token id, filled
//! asynchronously by a `TokenIdentityLoader` and kept for a validity window.
//!
//! An entry is served as-is while a request for it is in flight, or while
//! it holds a result (an identity, or "no record") that has not expired.
//! Otherwise reading it sends a new request. A failed request leaves the
//! error on the entry and is retried on the next read.

use parking_lot::Mutex;
use shared_types::NATIVE_BCH_TOKEN_ID;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::domain::{native_bch_identity, RegistryError, TokenIdentity};
use crate::ports::{RequestStatus, TokenIdentityListener, TokenIdentityLoader};

/// Loading state of one entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoaderState {
    /// Status of the request in flight, if any.
    pub request_status: Option<RequestStatus>,
    /// The last request found no registry record.
    pub has_no_record: bool,
    /// The last request failed.
    pub load_error: Option<RegistryError>,
    /// When the current result expires.
    pub valid_until: Option<Instant>,
}

impl LoaderState {
    fn is_fresh(&self, value: &Option<TokenIdentity>, now: Instant) -> bool {
        if self.request_status.is_some() {
            return true;
        }
        let unexpired = self.valid_until.is_some_and(|until| until > now);
        unexpired && (self.has_no_record || value.is_some())
    }
}

/// Identity of a token plus its loading state.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenIdentityWithState {
    /// Last resolved identity.
    pub value: Option<TokenIdentity>,
    /// `None` for the native token, which never loads.
    pub loader_state: Option<LoaderState>,
}

type Entry = Arc<Mutex<TokenIdentityWithState>>;

/// Cache of token identities backed by a loader.
pub struct TokenIdentityCache<L: TokenIdentityLoader> {
    loader: Arc<L>,
    entries: Mutex<HashMap<String, Entry>>,
    valid_for: Duration,
}

impl<L: TokenIdentityLoader> TokenIdentityCache<L> {
    /// Cache whose results stay valid for `valid_for`.
    pub fn new(loader: Arc<L>, valid_for: Duration) -> Self {
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
            valid_for,
        }
    }

    /// Current state of `token_id`, requesting it when missing or stale.
    pub fn get(&self, token_id: &str) -> TokenIdentityWithState {
        if token_id == NATIVE_BCH_TOKEN_ID {
            return TokenIdentityWithState {
                value: Some(native_bch_identity()),
                loader_state: None,
            };
        }

        let now = Instant::now();
        let entry = Arc::clone(self.entries.lock().entry(token_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(TokenIdentityWithState {
                value: None,
                loader_state: Some(LoaderState::default()),
            }))
        }));
        {
            let mut current = entry.lock();
            let fresh = current
                .loader_state
                .as_ref()
                .is_some_and(|state| state.is_fresh(&current.value, now));
            if fresh {
                return current.clone();
            }
            current.loader_state = Some(LoaderState::default());
        }
        self.send_load_request(token_id, &entry);
        let snapshot = entry.lock().clone();
        snapshot
    }

    /// Forget the result for `token_id` and request it again.
    ///
    /// Unknown token ids are ignored.
    pub fn reload(&self, token_id: &str) {
        let Some(entry) = self.entries.lock().get(token_id).cloned() else {
            return;
        };
        entry.lock().loader_state = Some(LoaderState::default());
        self.send_load_request(token_id, &entry);
    }

    /// Number of tracked tokens.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no token is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn send_load_request(&self, token_id: &str, entry: &Entry) {
        let listener = Arc::new(EntryListener {
            token_id: token_id.to_string(),
            entry: Arc::clone(entry),
            valid_for: self.valid_for,
        });
        self.loader.request_identity(token_id, listener);
    }
}

/// Writes request outcomes back into a cache entry.
struct EntryListener {
    token_id: String,
    entry: Entry,
    valid_for: Duration,
}

impl EntryListener {
    fn with_state(&self, update: impl FnOnce(&mut Option<TokenIdentity>, &mut LoaderState)) {
        let mut entry = self.entry.lock();
        let TokenIdentityWithState {
            value,
            loader_state,
        } = &mut *entry;
        update(value, loader_state.get_or_insert_with(LoaderState::default));
    }
}

impl TokenIdentityListener for EntryListener {
    fn on_status_change(&self, status: Option<RequestStatus>) {
        self.with_state(|_, state| state.request_status = status);
    }

    fn on_resolve(&self, identity: Option<TokenIdentity>) {
        let valid_until = Instant::now() + self.valid_for;
        self.with_state(|value, state| {
            state.has_no_record = identity.is_none();
            state.load_error = None;
            state.valid_until = Some(valid_until);
            *value = identity;
        });
    }

    fn on_reject(&self, error: RegistryError) {
        warn!(token_id = %self.token_id, "[registry] Token load failed: {}", error);
        self.with_state(|_, state| state.load_error = Some(error));
    }
}
