//! # Core Domain Entities
//!
//! Hashes and token identifiers as they travel between components.
//!
//! Transaction hashes are kept in "UI order" (the byte order of the hex
//! txid reported by electrum nodes), not in wire order.

use crate::errors::DecodeError;

/// A 32-byte hash (transaction id or SHA-256 content hash).
pub type Hash = [u8; 32];

/// A fungible token identifier: the hex txid of the token's genesis
/// (authbase) transaction.
pub type TokenId = String;

/// Token id used for the chain's native coin.
pub const NATIVE_BCH_TOKEN_ID: &str = "BCH";

/// Encode a hash as lowercase hex.
pub fn hash_to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Parse a 64-character hex string into a hash.
pub fn hash_from_hex(value: &str) -> Result<Hash, DecodeError> {
    let bytes = hex::decode(value).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| DecodeError::InvalidLength {
            expected: 32,
            got: bytes.len(),
        })
}

/// Short printable form of a hash for log lines.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}
