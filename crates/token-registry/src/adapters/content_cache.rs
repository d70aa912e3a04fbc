//! # Registry Content Cache
//!
//! Verified registry documents kept in the keyed persistent store under
//! `token:<token id>|hash:<content hash hex>`.

use serde::{Deserialize, Serialize};
use shared_types::{decode_record, encode_record, hash_to_hex, Hash, KeyValueStore, StoreError};
use std::sync::Arc;

/// A cached registry document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBcmrContentsRecord {
    /// Raw document bytes.
    pub content: Vec<u8>,
    /// URLs as announced on chain.
    pub urls: Vec<String>,
    /// Hash the document was verified against.
    pub content_hash: Hash,
    /// Token the document was fetched for.
    pub token_id: String,
}

/// Key of the cached document for `(token_id, content_hash)`.
pub fn content_key(token_id: &str, content_hash: &Hash) -> String {
    format!("token:{}|hash:{}", token_id, hash_to_hex(content_hash))
}

/// Store-backed document cache.
pub struct ContentCache<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ContentCache<S> {
    /// Wrap a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Cached document, if any.
    pub async fn get(
        &self,
        token_id: &str,
        content_hash: &Hash,
    ) -> Result<Option<TokenBcmrContentsRecord>, StoreError> {
        self.store
            .get(&content_key(token_id, content_hash))
            .await?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    /// Store a verified document.
    pub async fn put(&self, record: &TokenBcmrContentsRecord) -> Result<(), StoreError> {
        self.store
            .put(
                &content_key(&record.token_id, &record.content_hash),
                encode_record(record)?,
            )
            .await
    }
}
