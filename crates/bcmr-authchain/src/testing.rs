//! Synthetic authentication chains.
//!
//! `ChainFixture` builds real, decodable transactions and answers
//! `blockchain.transaction.get` and `blockchain.address.get_history` for
//! them, so the resolver can run over `MockTransport` end to end.

use serde_json::{json, Value};
use shared_types::{
    hash_to_hex, hash_transaction_ui_order, locking_bytecode_to_cash_address, Hash, Input,
    Output, Transaction, CASHADDR_MAINNET_PREFIX,
};
use std::collections::HashMap;

use electrum_batch_client::ClientError;

use crate::domain::{encode_bcmr_op_return, BcmrPointer};

/// P2PKH locking bytecode paying a hash filled with `seed`.
pub fn p2pkh(seed: u8) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(&[seed; 20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

/// In-memory chain of transactions with per-address histories.
#[derive(Clone, Debug, Default)]
pub struct ChainFixture {
    raw: HashMap<String, String>,
    outputs: HashMap<Hash, Vec<Vec<u8>>>,
    histories: HashMap<String, Vec<(String, i64)>>,
    next_locktime: u32,
    next_address: u32,
}

impl ChainFixture {
    /// Empty fixture.
    pub fn new() -> Self {
        Self::default()
    }

    /// A P2PKH script not used before in this fixture.
    pub fn fresh_address(&mut self) -> Vec<u8> {
        self.next_address += 1;
        let mut hash = [0x11u8; 20];
        hash[16..].copy_from_slice(&self.next_address.to_be_bytes());
        let mut script = vec![0x76, 0xa9, 0x14];
        script.extend_from_slice(&hash);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    /// Add a transaction spending `inputs` (txhash, output index) and
    /// paying to `outputs`, confirmed at `height`.
    ///
    /// The transaction is listed in the history of every standard address
    /// it spends from or pays to.
    pub fn add_transaction(
        &mut self,
        inputs: &[(Hash, u32)],
        outputs: Vec<Vec<u8>>,
        height: i64,
    ) -> Hash {
        let tx = Transaction {
            version: 2,
            inputs: inputs
                .iter()
                .map(|(txhash, index)| Input {
                    outpoint_txhash: *txhash,
                    outpoint_index: *index,
                    unlocking_bytecode: Vec::new(),
                    sequence: u32::MAX,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|bytecode| Output {
                    value_satoshis: 1_000,
                    locking_bytecode: bytecode.clone(),
                    token: None,
                })
                .collect(),
            locktime: self.next_locktime,
        };
        self.next_locktime += 1;

        let bytes = tx.encode();
        let txhash = hash_transaction_ui_order(&bytes);
        let txid = hash_to_hex(&txhash);

        let mut touched: Vec<Vec<u8>> = inputs
            .iter()
            .filter_map(|(spent, index)| {
                self.outputs
                    .get(spent)
                    .and_then(|outs| outs.get(*index as usize))
                    .cloned()
            })
            .collect();
        touched.extend(outputs.iter().cloned());
        for bytecode in touched {
            if let Ok(address) = locking_bytecode_to_cash_address(&bytecode, CASHADDR_MAINNET_PREFIX)
            {
                let history = self.histories.entry(address).or_default();
                if !history.iter().any(|(seen, _)| *seen == txid) {
                    history.push((txid.clone(), height));
                }
            }
        }

        self.raw.insert(txid, hex::encode(bytes));
        self.outputs.insert(txhash, outputs);
        txhash
    }

    /// Build a chain with one link per entry; each link pays output #0 to
    /// a fresh address and announces the given pointer, if any.
    pub fn build_chain(&mut self, pointers: &[Option<BcmrPointer>]) -> Vec<Hash> {
        let mut links: Vec<Hash> = Vec::with_capacity(pointers.len());
        for (index, pointer) in pointers.iter().enumerate() {
            let mut outputs = vec![self.fresh_address()];
            if let Some(pointer) = pointer {
                outputs.push(encode_bcmr_op_return(pointer));
            }
            let inputs: Vec<(Hash, u32)> = links.last().map(|prev| vec![(*prev, 0)]).unwrap_or_default();
            links.push(self.add_transaction(&inputs, outputs, 100 + index as i64));
        }
        links
    }

    /// Make the raw form of `txhash` undecodable.
    pub fn corrupt(&mut self, txhash: &Hash) {
        if let Some(raw) = self.raw.get_mut(&hash_to_hex(txhash)) {
            raw.truncate(20);
        }
    }

    /// Responder for `MockTransport::set_responder`.
    pub fn responder(
        &self,
    ) -> impl Fn(&str, &[Value]) -> Result<Value, ClientError> + Send + Sync + 'static {
        let raw = self.raw.clone();
        let histories = self.histories.clone();
        move |method, params| match method {
            "blockchain.transaction.get" => {
                let txid = params.first().and_then(Value::as_str).unwrap_or_default();
                raw.get(txid).map(|hex| json!(hex)).ok_or_else(|| ClientError::Rpc {
                    code: 2,
                    message: format!("No transaction matching {txid}"),
                })
            }
            "blockchain.address.get_history" => {
                let address = params.first().and_then(Value::as_str).unwrap_or_default();
                let from_height = params.get(1).and_then(Value::as_i64).unwrap_or(0);
                let entries: Vec<Value> = histories
                    .get(address)
                    .map(|history| {
                        history
                            .iter()
                            .filter(|(_, height)| *height <= 0 || *height >= from_height)
                            .map(|(txid, height)| json!({ "tx_hash": txid, "height": height }))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Value::Array(entries))
            }
            _ => Ok(Value::Null),
        }
    }
}
