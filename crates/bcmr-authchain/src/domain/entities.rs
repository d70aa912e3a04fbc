//! # Authentication Chain Entities
//!
//! Records the resolver keeps in the store, and the result it hands out.

use serde::{Deserialize, Serialize};
use shared_types::Hash;

use super::bcmr::BcmrPointer;

/// One link of a memoized chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChainMemItem {
    /// Transaction hash (UI order).
    pub txhash: Hash,
    /// Locking bytecode of every output, needed to continue the walk.
    pub outputs_bytecode: Vec<Vec<u8>>,
    /// Metadata pointer announced by this transaction.
    pub bcmr: Option<BcmrPointer>,
    /// Confirmation height, unknown for the genesis and for unconfirmed links.
    pub height: Option<u64>,
}

impl AuthChainMemItem {
    /// Height to start the next history query from.
    pub fn history_from_height(&self) -> u64 {
        self.height.unwrap_or(0)
    }
}

/// Memo for one genesis transaction, stored under `authchain:<hex>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChainFetchMem {
    /// Links from the genesis to the newest known one.
    pub chain: Vec<AuthChainMemItem>,
    /// Remote calls spent producing this memo.
    pub indexing_cost: u64,
}

/// A transaction seen in the history of a locking bytecode, stored under
/// `lbc:<lbc-hex>><txid-hex>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChainMemTransaction {
    /// Transaction hash (UI order).
    pub txhash: Hash,
    /// Hashes of the transactions whose output #0 this one spends.
    pub zeroth_utxo_txhash_list: Vec<Hash>,
    /// Locking bytecode of every output.
    pub outputs_bytecode: Vec<Vec<u8>>,
    /// Height as reported by the node (zero or negative when unconfirmed).
    pub height: i64,
}

impl AuthChainMemTransaction {
    /// Whether this transaction spends output #0 of `txhash`.
    pub fn spends_zeroth_output_of(&self, txhash: &Hash) -> bool {
        self.zeroth_utxo_txhash_list.contains(txhash)
    }

    /// Turn into a chain link.
    pub fn into_chain_item(self, bcmr: Option<BcmrPointer>) -> AuthChainMemItem {
        AuthChainMemItem {
            txhash: self.txhash,
            bcmr,
            height: u64::try_from(self.height).ok().filter(|h| *h > 0),
            outputs_bytecode: self.outputs_bytecode,
        }
    }
}

/// One entry of a resolved chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChainEntry {
    /// Transaction hash (UI order).
    pub txhash: Hash,
    /// Pointer announced by this transaction.
    pub bcmr: Option<BcmrPointer>,
}

/// Result of one resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAuthChainResult {
    /// Chain from genesis to the newest link found.
    pub chain: Vec<AuthChainEntry>,
    /// Cost counter after the walk.
    pub indexing_cost: u64,
    /// Budget the walk ran under.
    pub budget: u64,
}

impl FetchAuthChainResult {
    pub(crate) fn from_memo(memo: &AuthChainFetchMem, budget: u64) -> Self {
        Self {
            chain: memo
                .chain
                .iter()
                .map(|item| AuthChainEntry {
                    txhash: item.txhash,
                    bcmr: item.bcmr.clone(),
                })
                .collect(),
            indexing_cost: memo.indexing_cost,
            budget,
        }
    }

    /// The walk stopped on its budget; more links may exist.
    pub fn budget_exhausted(&self) -> bool {
        self.indexing_cost > self.budget
    }

    /// Entries carrying a pointer, newest first.
    pub fn pointers_newest_first(&self) -> Vec<(&Hash, &BcmrPointer)> {
        self.chain
            .iter()
            .rev()
            .filter_map(|entry| entry.bcmr.as_ref().map(|bcmr| (&entry.txhash, bcmr)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer(tag: u8) -> BcmrPointer {
        BcmrPointer {
            content_hash: [tag; 32],
            urls: vec![],
        }
    }

    #[test]
    fn test_unconfirmed_height_is_dropped() {
        let tx = AuthChainMemTransaction {
            txhash: [1; 32],
            zeroth_utxo_txhash_list: vec![[0; 32]],
            outputs_bytecode: vec![],
            height: -1,
        };
        assert!(tx.spends_zeroth_output_of(&[0; 32]));
        assert!(!tx.spends_zeroth_output_of(&[1; 32]));
        assert_eq!(tx.clone().into_chain_item(None).height, None);

        let confirmed = AuthChainMemTransaction { height: 812, ..tx };
        assert_eq!(confirmed.into_chain_item(None).height, Some(812));
    }

    #[test]
    fn test_pointers_newest_first() {
        let result = FetchAuthChainResult {
            chain: vec![
                AuthChainEntry {
                    txhash: [1; 32],
                    bcmr: Some(pointer(1)),
                },
                AuthChainEntry {
                    txhash: [2; 32],
                    bcmr: None,
                },
                AuthChainEntry {
                    txhash: [3; 32],
                    bcmr: Some(pointer(3)),
                },
            ],
            indexing_cost: 4,
            budget: 4,
        };
        let pointers = result.pointers_newest_first();
        assert_eq!(pointers.len(), 2);
        assert_eq!(pointers[0].0, &[3; 32]);
        assert_eq!(pointers[1].1, &pointer(1));
        assert!(!result.budget_exhausted());
    }
}
