//! # Keyed Persistent Store Port
//!
//! Abstract transactional key-value store over lexicographically ordered
//! string keys. Components compose their own keys (`authchain:<hex>`,
//! `lbc:<hex>><hex>`, `zop:<hex>`, `token:<id>|hash:<hex>`) and encode
//! records with `bincode`.
//!
//! Production: provided by the host application.
//! Testing: `InMemoryKVStore` (below).

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreError;

/// Key/value pairs returned by a prefix scan, in key order.
pub type ScanResult = Vec<(String, Vec<u8>)>;

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: String, value: Vec<u8> },
    /// Delete a key.
    Delete { key: String },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<String>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Abstract interface for key-value database operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either all operations in the batch are applied, or none are.
    async fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// All pairs whose key starts with `prefix`, in key order.
    async fn prefix_scan(&self, prefix: &str) -> Result<ScanResult, StoreError>;

    /// All keys starting with `prefix`, in key order.
    async fn prefix_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .prefix_scan(prefix)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}

/// Encode a record for storage.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(record).map_err(|e| StoreError::SerializationError {
        message: e.to_string(),
    })
}

/// Decode a stored record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::SerializationError {
        message: e.to_string(),
    })
}

/// In-memory key-value store for tests and ephemeral sessions.
///
/// Atomicity comes from applying a whole batch under one write lock.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKVStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKVStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn prefix_scan(&self, prefix: &str) -> Result<ScanResult, StoreError> {
        let data = self.data.read();
        let results = data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(results)
    }
}
