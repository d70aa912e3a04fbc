//! # Authentication Chain Resolver
//!
//! Walks a token's authentication chain: starting at the genesis
//! transaction, each next link is the transaction spending output #0 of the
//! previous one.
//!
//! ## Walk
//!
//! For the chain's current tail:
//!
//! 1. a spender recorded in the `zop:` index is used directly (no cost);
//! 2. otherwise the address of the tail's output #0 is derived (a
//!    non-standard script ends the walk), its history is fetched (cost 1),
//!    and every transaction not indexed yet for that script is requested
//!    through the `bcmr-indexer` batch category (cost 1 each);
//! 3. the first fetched transaction spending output #0 of the tail becomes
//!    the next link and the rest of the batch is aborted.
//!
//! The walk stops when no spender exists, or once the cost counter passes
//! the budget. The memo is persisted on every new link and every
//! `persist_every` cost increments, so a later call resumes where this one
//! stopped.
//!
//! Resolutions for the same genesis are serialized through a keyed lock.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{
    decode_transaction, hash_from_hex, hash_to_hex, locking_bytecode_to_cash_address, short_hex,
    Hash, KeyValueStore, CASHADDR_MAINNET_PREFIX,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wallet_telemetry::AUTHCHAIN_INDEXING_COST;

use electrum_batch_client::{
    BatchRequestItem, CancellationToken, CategoryConfig, ClientError, ElectrumApi,
};

use crate::adapters::{lbc_key, AuthChainMemDb};
use crate::application::keyed_lock::KeyedLocks;
use crate::config::AuthChainConfig;
use crate::domain::{
    parse_bcmr_from_bytecodes, AuthChainError, AuthChainFetchMem, AuthChainMemItem,
    AuthChainMemTransaction, FetchAuthChainResult,
};
use crate::ports::AuthChainProvider;

const TRANSACTION_GET: &str = "blockchain.transaction.get";
const ADDRESS_GET_HISTORY: &str = "blockchain.address.get_history";

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    tx_hash: String,
    height: i64,
}

/// Events produced by the batch callbacks of one history scan.
enum ScanEvent {
    Response {
        txid: String,
        height: i64,
        raw: Value,
    },
    Settled(Result<(), ClientError>),
}

/// Working copy of one genesis' memo during a walk.
struct Walk<'a> {
    authbase: &'a Hash,
    memo: AuthChainFetchMem,
    budget: u64,
}

impl Walk<'_> {
    fn over_budget(&self) -> bool {
        self.memo.indexing_cost > self.budget
    }
}

/// Resolver over an electrum client and a keyed store.
pub struct AuthChainResolver<C: ElectrumApi, S: KeyValueStore> {
    client: Arc<C>,
    memdb: AuthChainMemDb<S>,
    config: AuthChainConfig,
    locks: KeyedLocks<Hash>,
}

impl<C: ElectrumApi, S: KeyValueStore> AuthChainResolver<C, S> {
    /// Create a resolver, registering its batch category on `client`.
    ///
    /// An existing category of the same name is reused.
    pub fn new(client: Arc<C>, store: Arc<S>, config: AuthChainConfig) -> Result<Self, AuthChainError> {
        match client.create_batch_sender_category(&config.category_name, CategoryConfig::bcmr_indexer())
        {
            Ok(()) | Err(ClientError::CategoryExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            client,
            memdb: AuthChainMemDb::new(store),
            config,
            locks: KeyedLocks::new(),
        })
    }

    /// Memo store used by this resolver.
    pub fn memdb(&self) -> &AuthChainMemDb<S> {
        &self.memdb
    }

    /// Resolve the chain of `authbase`, spending at most about `budget`
    /// remote calls (zero selects the configured default).
    pub async fn fetch_auth_chain(
        &self,
        authbase: &Hash,
        budget: u64,
    ) -> Result<FetchAuthChainResult, AuthChainError> {
        let budget = self.config.effective_budget(budget);
        let _guard = self.locks.lock(*authbase).await;

        let memo = match self.memdb.get_auth_chain(authbase).await? {
            Some(memo) => memo,
            None => self.seed_memo(authbase).await?,
        };
        let mut walk = Walk {
            authbase,
            memo,
            budget,
        };
        let mut tail = walk
            .memo
            .chain
            .last()
            .cloned()
            .ok_or_else(|| AuthChainError::InvalidMemo("memo has an empty chain".into()))?;

        while !walk.over_budget() {
            let first_lbc = tail
                .outputs_bytecode
                .first()
                .cloned()
                .ok_or_else(|| AuthChainError::MissingZerothOutput(hash_to_hex(&tail.txhash)))?;

            let mut successor = match self.memdb.get_zeroth_spender(&tail.txhash).await? {
                Some(spender) => self.memdb.get_lbc_transaction(&first_lbc, &spender).await?,
                None => None,
            };
            if successor.is_none() {
                let address = match locking_bytecode_to_cash_address(&first_lbc, CASHADDR_MAINNET_PREFIX) {
                    Ok(address) => address,
                    Err(e) => {
                        info!(
                            authbase = %hash_to_hex(authbase),
                            "[authchain] Chain ends at a non-standard output: {}",
                            e
                        );
                        break;
                    }
                };
                successor = self.scan_history(&mut walk, &tail, &first_lbc, &address).await?;
            }
            let Some(next) = successor else {
                break;
            };

            let bcmr = parse_bcmr_from_bytecodes(&next.outputs_bytecode);
            tail = next.into_chain_item(bcmr);
            debug!(
                authbase = %short_hex(authbase),
                txhash = %hash_to_hex(&tail.txhash),
                length = walk.memo.chain.len() + 1,
                "[authchain] New chain link"
            );
            walk.memo.chain.push(tail.clone());
            self.memdb.set_auth_chain(authbase, &walk.memo).await?;
        }

        Ok(FetchAuthChainResult::from_memo(&walk.memo, budget))
    }

    async fn seed_memo(&self, authbase: &Hash) -> Result<AuthChainFetchMem, AuthChainError> {
        let txid = hash_to_hex(authbase);
        let raw = self
            .client
            .request(TRANSACTION_GET, vec![json!(txid), json!(false)])
            .await?;
        let tx = decode_raw_transaction(&txid, &raw)?;
        let outputs_bytecode = tx.outputs_bytecode();
        let memo = AuthChainFetchMem {
            chain: vec![AuthChainMemItem {
                txhash: *authbase,
                bcmr: parse_bcmr_from_bytecodes(&outputs_bytecode),
                outputs_bytecode,
                height: None,
            }],
            indexing_cost: 1,
        };
        AUTHCHAIN_INDEXING_COST.inc();
        self.memdb.set_auth_chain(authbase, &memo).await?;
        Ok(memo)
    }

    async fn add_indexing_cost(&self, walk: &mut Walk<'_>) {
        walk.memo.indexing_cost += 1;
        AUTHCHAIN_INDEXING_COST.inc();
        if self.config.persist_every > 0 && walk.memo.indexing_cost % self.config.persist_every == 0
        {
            if let Err(e) = self.memdb.set_auth_chain(walk.authbase, &walk.memo).await {
                warn!("[authchain] Failed to persist indexing progress: {}", e);
            }
        }
    }

    /// Look for the spender of `tail`'s output #0 in the history of its
    /// address, indexing every new transaction seen on the way.
    async fn scan_history(
        &self,
        walk: &mut Walk<'_>,
        tail: &AuthChainMemItem,
        first_lbc: &[u8],
        address: &str,
    ) -> Result<Option<AuthChainMemTransaction>, AuthChainError> {
        let indexed = self.memdb.lbc_transaction_keys(first_lbc).await?;
        let history = self
            .client
            .request(
                ADDRESS_GET_HISTORY,
                vec![json!(address), json!(tail.history_from_height()), json!(-1)],
            )
            .await?;
        self.add_indexing_cost(walk).await;
        let history: Vec<HistoryEntry> = serde_json::from_value(history)
            .map_err(|e| AuthChainError::malformed(ADDRESS_GET_HISTORY, e))?;

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let abort = CancellationToken::new();
        let mut items = Vec::new();
        for entry in history {
            let unseen = hash_from_hex(&entry.tx_hash)
                .map(|txhash| !indexed.contains(&lbc_key(first_lbc, &txhash)))
                .unwrap_or(true);
            if unseen {
                items.push(scan_item(entry, &events_tx));
            }
        }
        drop(events_tx);
        if items.is_empty() {
            return Ok(None);
        }

        let expected = items.len();
        debug!(
            authbase = %short_hex(walk.authbase),
            address,
            requests = expected,
            "[authchain] Scanning address history"
        );
        self.client
            .enqueue_batch_requests(&self.config.category_name, items, Some(abort.clone()))?;

        let mut successor = None;
        let mut failure = None;
        let mut settled = 0;
        while settled < expected {
            let Some(event) = events.recv().await else {
                break;
            };
            match event {
                ScanEvent::Response { txid, height, raw } => {
                    if failure.is_some() {
                        continue;
                    }
                    if let Err(e) = self
                        .index_response(walk, tail, first_lbc, &abort, &mut successor, &txid, height, &raw)
                        .await
                    {
                        abort.cancel();
                        failure = Some(e);
                    }
                }
                ScanEvent::Settled(Ok(())) => settled += 1,
                ScanEvent::Settled(Err(e)) => {
                    settled += 1;
                    if !e.is_aborted() && failure.is_none() {
                        abort.cancel();
                        failure = Some(e.into());
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(successor),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn index_response(
        &self,
        walk: &mut Walk<'_>,
        tail: &AuthChainMemItem,
        first_lbc: &[u8],
        abort: &CancellationToken,
        successor: &mut Option<AuthChainMemTransaction>,
        txid: &str,
        height: i64,
        raw: &Value,
    ) -> Result<(), AuthChainError> {
        self.add_indexing_cost(walk).await;
        if walk.over_budget() {
            abort.cancel();
        }
        let tx = decode_raw_transaction(txid, raw)?;
        let txhash = hash_from_hex(txid).map_err(|source| AuthChainError::Decode {
            txid: txid.to_string(),
            source,
        })?;
        let record = AuthChainMemTransaction {
            txhash,
            zeroth_utxo_txhash_list: tx.zeroth_outpoint_txhashes(),
            outputs_bytecode: tx.outputs_bytecode(),
            height,
        };
        if successor.is_none() && record.spends_zeroth_output_of(&tail.txhash) {
            *successor = Some(record.clone());
            abort.cancel();
        }
        self.memdb.put_lbc_transaction(first_lbc, &record).await?;
        Ok(())
    }
}

fn scan_item(entry: HistoryEntry, events: &mpsc::UnboundedSender<ScanEvent>) -> BatchRequestItem {
    let on_resolve = events.clone();
    let on_reject = events.clone();
    let on_response = events.clone();
    let HistoryEntry { tx_hash, height } = entry;
    BatchRequestItem::new(
        TRANSACTION_GET,
        vec![json!(tx_hash), json!(false)],
        move |_| {
            let _ = on_resolve.send(ScanEvent::Settled(Ok(())));
        },
        move |e| {
            let _ = on_reject.send(ScanEvent::Settled(Err(e)));
        },
    )
    .on_response(move |raw| {
        let _ = on_response.send(ScanEvent::Response {
            txid: tx_hash.clone(),
            height,
            raw: raw.clone(),
        });
    })
}

fn decode_raw_transaction(
    txid: &str,
    raw: &Value,
) -> Result<shared_types::Transaction, AuthChainError> {
    let hex_str = raw
        .as_str()
        .ok_or_else(|| AuthChainError::malformed(TRANSACTION_GET, "expected a hex string"))?;
    let bytes = hex::decode(hex_str).map_err(|e| AuthChainError::Decode {
        txid: txid.to_string(),
        source: shared_types::DecodeError::InvalidHex(e.to_string()),
    })?;
    decode_transaction(&bytes).map_err(|source| AuthChainError::Decode {
        txid: txid.to_string(),
        source,
    })
}

#[async_trait]
impl<C: ElectrumApi, S: KeyValueStore> AuthChainProvider for AuthChainResolver<C, S> {
    async fn fetch_auth_chain(
        &self,
        authbase: &Hash,
        budget: u64,
    ) -> Result<FetchAuthChainResult, AuthChainError> {
        AuthChainResolver::fetch_auth_chain(self, authbase, budget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BcmrPointer;
    use crate::testing::{p2pkh, ChainFixture};
    use electrum_batch_client::{BatchClient, BatchClientConfig, MockTransport};
    use shared_types::InMemoryKVStore;

    struct Harness {
        resolver: AuthChainResolver<BatchClient<MockTransport>, InMemoryKVStore>,
        transport: Arc<MockTransport>,
        store: Arc<InMemoryKVStore>,
    }

    fn harness(fixture: &ChainFixture) -> Harness {
        let (transport, events) = MockTransport::new();
        transport.set_responder(fixture.responder());
        let client = Arc::new(BatchClient::new(
            BatchClientConfig::for_testing(),
            Arc::clone(&transport),
            events,
        ));
        let store = Arc::new(InMemoryKVStore::new());
        let resolver =
            AuthChainResolver::new(client, Arc::clone(&store), AuthChainConfig::default()).unwrap();
        Harness {
            resolver,
            transport,
            store,
        }
    }

    fn pointer(tag: u8) -> BcmrPointer {
        BcmrPointer {
            content_hash: [tag; 32],
            urls: vec![format!("https://example.com/{tag}.json")],
        }
    }

    fn tx_gets(transport: &MockTransport) -> usize {
        transport.sent_requests_for(TRANSACTION_GET).len()
    }

    #[tokio::test]
    async fn test_follows_zeroth_output_spends() {
        let mut fixture = ChainFixture::new();
        let links = fixture.build_chain(&[Some(pointer(1)), None, Some(pointer(3))]);
        let h = harness(&fixture);

        let result = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();

        let hashes: Vec<Hash> = result.chain.iter().map(|e| e.txhash).collect();
        assert_eq!(hashes, links);
        assert_eq!(result.chain[0].bcmr, Some(pointer(1)));
        assert_eq!(result.chain[1].bcmr, None);
        assert_eq!(result.chain[2].bcmr, Some(pointer(3)));
        assert!(!result.budget_exhausted());
        assert_eq!(result.budget, 1000);
    }

    #[tokio::test]
    async fn test_genesis_without_spender() {
        let mut fixture = ChainFixture::new();
        let links = fixture.build_chain(&[Some(pointer(7))]);
        let h = harness(&fixture);

        let result = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();
        assert_eq!(result.chain.len(), 1);
        assert_eq!(result.chain[0].bcmr, Some(pointer(7)));
        // genesis fetch, one history page, the genesis again from that page
        assert_eq!(result.indexing_cost, 3);
    }

    #[tokio::test]
    async fn test_second_resolution_is_idempotent() {
        let mut fixture = ChainFixture::new();
        let links = fixture.build_chain(&[Some(pointer(1)), Some(pointer(2)), None]);
        let h = harness(&fixture);

        let first = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();
        let fetched = tx_gets(&h.transport);
        let second = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();

        assert_eq!(first.chain, second.chain);
        assert!(second.indexing_cost <= first.indexing_cost);
        assert_eq!(tx_gets(&h.transport), fetched);
    }

    #[tokio::test]
    async fn test_small_budget_returns_prefix_and_resumes() {
        let mut fixture = ChainFixture::new();
        let links = fixture.build_chain(&[None, None, None, None, None, None]);
        let h = harness(&fixture);

        let partial = h.resolver.fetch_auth_chain(&links[0], 3).await.unwrap();
        assert!(partial.budget_exhausted());
        assert!(partial.chain.len() < links.len());
        let prefix: Vec<Hash> = partial.chain.iter().map(|e| e.txhash).collect();
        assert_eq!(prefix, links[..prefix.len()].to_vec());

        let full = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();
        let hashes: Vec<Hash> = full.chain.iter().map(|e| e.txhash).collect();
        assert_eq!(hashes, links);
    }

    #[tokio::test]
    async fn test_non_standard_output_ends_walk() {
        let mut fixture = ChainFixture::new();
        let genesis = fixture.add_transaction(&[], vec![vec![0x51], p2pkh(1)], 10);
        let h = harness(&fixture);

        let result = h.resolver.fetch_auth_chain(&genesis, 0).await.unwrap();
        assert_eq!(result.chain.len(), 1);
        assert_eq!(result.indexing_cost, 1);
        assert!(h
            .transport
            .direct_requests()
            .iter()
            .all(|(method, _)| method != ADDRESS_GET_HISTORY));
    }

    #[tokio::test]
    async fn test_missing_zeroth_output_is_error() {
        let mut fixture = ChainFixture::new();
        let genesis = fixture.add_transaction(&[], vec![], 10);
        let h = harness(&fixture);

        let err = h.resolver.fetch_auth_chain(&genesis, 0).await.unwrap_err();
        assert!(matches!(err, AuthChainError::MissingZerothOutput(_)));
    }

    #[tokio::test]
    async fn test_undecodable_history_transaction_is_fatal() {
        let mut fixture = ChainFixture::new();
        let links = fixture.build_chain(&[None, None]);
        fixture.corrupt(&links[1]);
        let h = harness(&fixture);

        let err = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap_err();
        assert!(matches!(err, AuthChainError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_known_spender_is_used_without_requests() {
        let mut fixture = ChainFixture::new();
        let links = fixture.build_chain(&[None, None]);
        let h = harness(&fixture);

        h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();
        // Drop the memo but keep the transaction index.
        h.store
            .atomic_batch_write(vec![shared_types::BatchOperation::delete(
                crate::adapters::authchain_key(&links[0]),
            )])
            .await
            .unwrap();
        let history_calls = h.transport.direct_requests().len();

        let result = h.resolver.fetch_auth_chain(&links[0], 0).await.unwrap();
        assert_eq!(result.chain.len(), 2);
        // Genesis fetch and the tail's history page only.
        assert_eq!(h.transport.direct_requests().len(), history_calls + 2);
    }
}
