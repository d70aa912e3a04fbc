//! # Transaction Wire Codec
//!
//! Decodes the standard transaction serialization, including the CashToken
//! prefix carried inside an output's locking bytecode field.
//!
//! Outpoint hashes and token categories are returned in UI order (reversed
//! from wire order) so they compare directly with txids reported by nodes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::Hash;
use crate::errors::DecodeError;

/// Marker byte that starts a token prefix in an output's locking field.
const PREFIX_TOKEN: u8 = 0xef;
const TOKEN_HAS_AMOUNT: u8 = 0x10;
const TOKEN_HAS_NFT: u8 = 0x20;
const TOKEN_HAS_COMMITMENT_LENGTH: u8 = 0x40;
const TOKEN_RESERVED_BIT: u8 = 0x80;

/// A decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction version.
    pub version: u32,
    /// Inputs in order.
    pub inputs: Vec<Input>,
    /// Outputs in order.
    pub outputs: Vec<Output>,
    /// Locktime.
    pub locktime: u32,
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Hash of the transaction being spent (UI order).
    pub outpoint_txhash: Hash,
    /// Index of the output being spent.
    pub outpoint_index: u32,
    /// Unlocking bytecode.
    pub unlocking_bytecode: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Value in satoshis.
    pub value_satoshis: u64,
    /// Locking bytecode with any token prefix removed.
    pub locking_bytecode: Vec<u8>,
    /// Token data, when the output carries a token prefix.
    pub token: Option<TokenPrefix>,
}

/// CashToken data attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPrefix {
    /// Token category (UI order).
    pub category: Hash,
    /// Fungible amount (zero when absent).
    pub amount: u64,
    /// NFT capability and commitment, when present.
    pub nft: Option<(u8, Vec<u8>)>,
}

impl Transaction {
    /// Hashes of every transaction whose output #0 this transaction spends.
    pub fn zeroth_outpoint_txhashes(&self) -> Vec<Hash> {
        self.inputs
            .iter()
            .filter(|input| input.outpoint_index == 0)
            .map(|input| input.outpoint_txhash)
            .collect()
    }

    /// Locking bytecode of every output.
    pub fn outputs_bytecode(&self) -> Vec<Vec<u8>> {
        self.outputs
            .iter()
            .map(|output| output.locking_bytecode.clone())
            .collect()
    }

    /// Serialize back to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend(input.outpoint_txhash.iter().rev());
            out.extend_from_slice(&input.outpoint_index.to_le_bytes());
            write_compact_size(&mut out, input.unlocking_bytecode.len() as u64);
            out.extend_from_slice(&input.unlocking_bytecode);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value_satoshis.to_le_bytes());
            let mut field = Vec::new();
            if let Some(token) = &output.token {
                encode_token_prefix(&mut field, token);
            }
            field.extend_from_slice(&output.locking_bytecode);
            write_compact_size(&mut out, field.len() as u64);
            out.extend_from_slice(&field);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }
}

/// Compute the txid of raw transaction bytes (double SHA-256, UI order).
pub fn hash_transaction_ui_order(tx_bytes: &[u8]) -> Hash {
    let first = Sha256::digest(tx_bytes);
    let second = Sha256::digest(first);
    let mut hash: Hash = second.into();
    hash.reverse();
    hash
}

/// Decode raw transaction bytes.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, DecodeError> {
    let mut reader = Reader::new(bytes);
    let version = reader.read_u32("version")?;

    let input_count = reader.read_compact_size("input count")?;
    let mut inputs = Vec::new();
    for _ in 0..input_count {
        let outpoint_txhash = reader.read_hash_reversed("outpoint hash")?;
        let outpoint_index = reader.read_u32("outpoint index")?;
        let script_len = reader.read_compact_size("unlocking bytecode length")?;
        let unlocking_bytecode = reader.read_bytes(script_len as usize, "unlocking bytecode")?;
        let sequence = reader.read_u32("sequence")?;
        inputs.push(Input {
            outpoint_txhash,
            outpoint_index,
            unlocking_bytecode,
            sequence,
        });
    }

    let output_count = reader.read_compact_size("output count")?;
    let mut outputs = Vec::new();
    for _ in 0..output_count {
        let value_satoshis = reader.read_u64("value")?;
        let field_len = reader.read_compact_size("locking bytecode length")?;
        let field = reader.read_bytes(field_len as usize, "locking bytecode")?;
        let (token, locking_bytecode) = split_token_prefix(&field)?;
        outputs.push(Output {
            value_satoshis,
            locking_bytecode,
            token,
        });
    }

    let locktime = reader.read_u32("locktime")?;
    if reader.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(Transaction {
        version,
        inputs,
        outputs,
        locktime,
    })
}

fn split_token_prefix(field: &[u8]) -> Result<(Option<TokenPrefix>, Vec<u8>), DecodeError> {
    if field.first() != Some(&PREFIX_TOKEN) {
        return Ok((None, field.to_vec()));
    }
    let mut reader = Reader::new(&field[1..]);
    let category = reader.read_hash_reversed("token category")?;
    let bitfield = reader.read_bytes(1, "token bitfield")?[0];
    if bitfield & TOKEN_RESERVED_BIT != 0 {
        return Err(DecodeError::InvalidTokenPrefix(
            "reserved bit is set".to_string(),
        ));
    }
    let has_nft = bitfield & TOKEN_HAS_NFT != 0;
    let has_amount = bitfield & TOKEN_HAS_AMOUNT != 0;
    let has_commitment = bitfield & TOKEN_HAS_COMMITMENT_LENGTH != 0;
    if !has_nft && !has_amount {
        return Err(DecodeError::InvalidTokenPrefix(
            "token prefix carries neither nft nor amount".to_string(),
        ));
    }
    if has_commitment && !has_nft {
        return Err(DecodeError::InvalidTokenPrefix(
            "commitment without nft".to_string(),
        ));
    }
    let commitment = if has_commitment {
        let len = reader.read_compact_size("token commitment length")?;
        reader.read_bytes(len as usize, "token commitment")?
    } else {
        Vec::new()
    };
    let amount = if has_amount {
        reader.read_compact_size("token amount")?
    } else {
        0
    };
    let nft = has_nft.then(|| (bitfield & 0x0f, commitment));
    let locking_bytecode = reader.rest().to_vec();
    Ok((
        Some(TokenPrefix {
            category,
            amount,
            nft,
        }),
        locking_bytecode,
    ))
}

fn encode_token_prefix(out: &mut Vec<u8>, token: &TokenPrefix) {
    out.push(PREFIX_TOKEN);
    out.extend(token.category.iter().rev());
    let mut bitfield = 0u8;
    if token.amount > 0 {
        bitfield |= TOKEN_HAS_AMOUNT;
    }
    if let Some((capability, commitment)) = &token.nft {
        bitfield |= TOKEN_HAS_NFT | (capability & 0x0f);
        if !commitment.is_empty() {
            bitfield |= TOKEN_HAS_COMMITMENT_LENGTH;
        }
    }
    out.push(bitfield);
    if let Some((_, commitment)) = &token.nft {
        if !commitment.is_empty() {
            write_compact_size(out, commitment.len() as u64);
            out.extend_from_slice(commitment);
        }
    }
    if token.amount > 0 {
        write_compact_size(out, token.amount);
    }
}

fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEnd {
                field,
                offset: self.offset,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(len, field)?.to_vec())
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, field)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, field)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_hash_reversed(&mut self, field: &'static str) -> Result<Hash, DecodeError> {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(self.take(32, field)?);
        hash.reverse();
        Ok(hash)
    }

    fn read_compact_size(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        let first = self.take(1, field)?[0];
        Ok(match first {
            0xfd => {
                let mut buf = [0u8; 2];
                buf.copy_from_slice(self.take(2, field)?);
                u16::from_le_bytes(buf) as u64
            }
            0xfe => self.read_u32(field)? as u64,
            0xff => self.read_u64(field)?,
            n => n as u64,
        })
    }
}
