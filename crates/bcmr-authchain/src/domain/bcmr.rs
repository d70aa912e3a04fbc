//! # BCMR Metadata Pointers
//!
//! A pointer lives in a null-data output:
//!
//! ```text
//! OP_RETURN <"BCMR"> <content_hash: 32 bytes> <url>*
//! ```
//!
//! Pushes use direct pushes (0x01..=0x4b), PUSHDATA1 or PUSHDATA2.
//! PUSHDATA4 is refused. Any other opcode between pushes is skipped.

use serde::{Deserialize, Serialize};
use shared_types::Hash;
use thiserror::Error;

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const MAX_DIRECT_PUSH: u8 = 0x4b;

/// Signature identifying a BCMR pointer.
pub const BCMR_SIGNATURE: &[u8; 4] = b"BCMR";

/// Metadata pointer: content hash of the registry document plus the URLs
/// it may be downloaded from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BcmrPointer {
    /// SHA-256 of the registry document.
    pub content_hash: Hash,
    /// Candidate locations, as written on chain.
    pub urls: Vec<String>,
}

/// Reasons a locking bytecode is not a BCMR pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BcmrParseError {
    /// Script does not start with OP_RETURN.
    #[error("Expecting OP_RETURN at index 0")]
    NotOpReturn,

    /// A push runs past the end of the script.
    #[error("Invalid push size at index {offset}: {size}")]
    InvalidPushSize {
        /// Offset of the push data
        offset: usize,
        /// Declared size
        size: usize,
    },

    /// OP_PUSHDATA4 is not accepted in pointers.
    #[error("OP_PUSHDATA4 is not allowed at index {0}")]
    PushData4(usize),

    /// Fewer than two pushes.
    #[error("Expecting at least two data pushes")]
    TooFewPushes,

    /// First push is not "BCMR".
    #[error("Missing BCMR signature")]
    SignatureMissing,

    /// Second push is not 32 bytes long.
    #[error("Content hash must be 32 bytes, got {0}")]
    InvalidContentHash(usize),
}

/// Split a null-data script into its data pushes.
pub fn parse_op_return_pushes(bytecode: &[u8]) -> Result<Vec<Vec<u8>>, BcmrParseError> {
    if bytecode.first() != Some(&OP_RETURN) {
        return Err(BcmrParseError::NotOpReturn);
    }
    let mut pushes = Vec::new();
    let mut i = 1;
    while i < bytecode.len() {
        let opcode = bytecode[i];
        i += 1;
        let size = match opcode {
            OP_PUSHDATA1 => {
                let size = *bytecode
                    .get(i)
                    .ok_or(BcmrParseError::InvalidPushSize { offset: i, size: 1 })?
                    as usize;
                i += 1;
                size
            }
            OP_PUSHDATA2 => {
                let raw = bytecode
                    .get(i..i + 2)
                    .ok_or(BcmrParseError::InvalidPushSize { offset: i, size: 2 })?;
                i += 2;
                u16::from_le_bytes([raw[0], raw[1]]) as usize
            }
            OP_PUSHDATA4 => return Err(BcmrParseError::PushData4(i - 1)),
            0x01..=MAX_DIRECT_PUSH => opcode as usize,
            _ => continue,
        };
        if size > bytecode.len() - i {
            return Err(BcmrParseError::InvalidPushSize { offset: i, size });
        }
        pushes.push(bytecode[i..i + size].to_vec());
        i += size;
    }
    Ok(pushes)
}

/// Parse a BCMR pointer out of one locking bytecode.
pub fn parse_bcmr_op_return(bytecode: &[u8]) -> Result<BcmrPointer, BcmrParseError> {
    let pushes = parse_op_return_pushes(bytecode)?;
    if pushes.len() < 2 {
        return Err(BcmrParseError::TooFewPushes);
    }
    if pushes[0].as_slice() != BCMR_SIGNATURE {
        return Err(BcmrParseError::SignatureMissing);
    }
    let content_hash: Hash = pushes[1]
        .as_slice()
        .try_into()
        .map_err(|_| BcmrParseError::InvalidContentHash(pushes[1].len()))?;
    let urls = pushes[2..]
        .iter()
        .map(|push| String::from_utf8_lossy(push).into_owned())
        .collect();
    Ok(BcmrPointer { content_hash, urls })
}

/// First pointer found among a transaction's outputs, if any.
pub fn parse_bcmr_from_bytecodes<B: AsRef<[u8]>>(outputs: &[B]) -> Option<BcmrPointer> {
    outputs
        .iter()
        .find_map(|bytecode| parse_bcmr_op_return(bytecode.as_ref()).ok())
}

/// Encode one data push with the smallest push opcode.
pub fn encode_push(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 3);
    match data.len() {
        0 => out.push(0x00),
        n if n <= MAX_DIRECT_PUSH as usize => out.push(n as u8),
        n if n <= u8::MAX as usize => {
            out.push(OP_PUSHDATA1);
            out.push(n as u8);
        }
        n => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(n.min(u16::MAX as usize) as u16).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
    out
}

/// Build the null-data script announcing `pointer`.
pub fn encode_bcmr_op_return(pointer: &BcmrPointer) -> Vec<u8> {
    let mut script = vec![OP_RETURN];
    script.extend(encode_push(BCMR_SIGNATURE));
    script.extend(encode_push(&pointer.content_hash));
    for url in &pointer.urls {
        script.extend(encode_push(url.as_bytes()));
    }
    script
}
