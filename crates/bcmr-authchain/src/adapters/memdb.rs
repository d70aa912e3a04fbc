//! # Authchain Memo Store
//!
//! Key layout over the keyed persistent store:
//!
//! | Key | Value |
//! |-----|-------|
//! | `authchain:<genesis-hex>` | `AuthChainFetchMem` |
//! | `lbc:<lbc-hex>><txid-hex>` | `AuthChainMemTransaction` |
//! | `zop:<txid-hex>` | hash of the transaction spending output #0 of `txid` |

use std::collections::HashSet;
use std::sync::Arc;

use shared_types::{
    decode_record, encode_record, hash_to_hex, BatchOperation, Hash, KeyValueStore, StoreError,
};

use crate::domain::{AuthChainFetchMem, AuthChainMemTransaction};

/// Key of the memo for `authbase`.
pub fn authchain_key(authbase: &Hash) -> String {
    format!("authchain:{}", hash_to_hex(authbase))
}

/// Prefix shared by every transaction indexed for `bytecode`.
pub fn lbc_prefix(bytecode: &[u8]) -> String {
    format!("lbc:{}>", hex::encode(bytecode))
}

/// Key of one indexed transaction.
pub fn lbc_key(bytecode: &[u8], txhash: &Hash) -> String {
    format!("{}{}", lbc_prefix(bytecode), hash_to_hex(txhash))
}

/// Key of the zeroth-output spender of `txhash`.
pub fn zop_key(txhash: &Hash) -> String {
    format!("zop:{}", hash_to_hex(txhash))
}

/// Typed access to the resolver's records.
pub struct AuthChainMemDb<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> Clone for AuthChainMemDb<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> AuthChainMemDb<S> {
    /// Wrap a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Load the memo for `authbase`.
    pub async fn get_auth_chain(
        &self,
        authbase: &Hash,
    ) -> Result<Option<AuthChainFetchMem>, StoreError> {
        self.store
            .get(&authchain_key(authbase))
            .await?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    /// Replace the memo for `authbase`.
    pub async fn set_auth_chain(
        &self,
        authbase: &Hash,
        memo: &AuthChainFetchMem,
    ) -> Result<(), StoreError> {
        self.store
            .put(&authchain_key(authbase), encode_record(memo)?)
            .await
    }

    /// Transaction known to spend output #0 of `txhash`.
    pub async fn get_zeroth_spender(&self, txhash: &Hash) -> Result<Option<Hash>, StoreError> {
        self.store
            .get(&zop_key(txhash))
            .await?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    /// Indexed transaction `txhash` under `bytecode`.
    pub async fn get_lbc_transaction(
        &self,
        bytecode: &[u8],
        txhash: &Hash,
    ) -> Result<Option<AuthChainMemTransaction>, StoreError> {
        self.store
            .get(&lbc_key(bytecode, txhash))
            .await?
            .map(|bytes| decode_record(&bytes))
            .transpose()
    }

    /// Keys of every transaction indexed under `bytecode`.
    pub async fn lbc_transaction_keys(&self, bytecode: &[u8]) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .store
            .prefix_keys(&lbc_prefix(bytecode))
            .await?
            .into_iter()
            .collect())
    }

    /// Index a transaction together with its zeroth-output spend links.
    pub async fn put_lbc_transaction(
        &self,
        bytecode: &[u8],
        tx: &AuthChainMemTransaction,
    ) -> Result<(), StoreError> {
        let spender = encode_record(&tx.txhash)?;
        let mut operations = Vec::with_capacity(tx.zeroth_utxo_txhash_list.len() + 1);
        operations.push(BatchOperation::put(
            lbc_key(bytecode, &tx.txhash),
            encode_record(tx)?,
        ));
        for spent in &tx.zeroth_utxo_txhash_list {
            operations.push(BatchOperation::put(zop_key(spent), spender.clone()));
        }
        self.store.atomic_batch_write(operations).await
    }
}
