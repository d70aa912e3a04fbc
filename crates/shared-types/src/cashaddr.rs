//! # CashAddr Encoding
//!
//! Maps standard locking bytecode (P2PKH, P2SH20, P2SH32) to a CashAddr
//! string, as accepted by electrum `blockchain.address.*` methods.

use crate::errors::AddressError;

/// Address prefix used on mainnet.
pub const CASHADDR_MAINNET_PREFIX: &str = "bitcoincash";

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const VERSION_P2PKH: u8 = 0x00;
const VERSION_P2SH20: u8 = 0x08;
const VERSION_P2SH32: u8 = 0x0b;

/// Encode a locking bytecode as a CashAddr address.
///
/// Returns `AddressError::NonStandard` when the script has no standard
/// address form; callers treat that as "no address to follow".
pub fn locking_bytecode_to_cash_address(
    bytecode: &[u8],
    prefix: &str,
) -> Result<String, AddressError> {
    let (version, hash) = match bytecode {
        // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        [0x76, 0xa9, 0x14, hash @ .., 0x88, 0xac] if hash.len() == 20 => (VERSION_P2PKH, hash),
        // OP_HASH160 <20> OP_EQUAL
        [0xa9, 0x14, hash @ .., 0x87] if hash.len() == 20 => (VERSION_P2SH20, hash),
        // OP_HASH256 <32> OP_EQUAL
        [0xaa, 0x20, hash @ .., 0x87] if hash.len() == 32 => (VERSION_P2SH32, hash),
        _ => return Err(AddressError::NonStandard(hex::encode(bytecode))),
    };

    let mut payload = Vec::with_capacity(hash.len() + 1);
    payload.push(version);
    payload.extend_from_slice(hash);
    let data = convert_bits_8_to_5(&payload);

    let mut checksum_input: Vec<u8> = prefix.bytes().map(|b| b & 0x1f).collect();
    checksum_input.push(0);
    checksum_input.extend_from_slice(&data);
    checksum_input.extend_from_slice(&[0u8; 8]);
    let checksum = polymod(&checksum_input);

    let mut address = String::with_capacity(prefix.len() + 1 + data.len() + 8);
    address.push_str(prefix);
    address.push(':');
    for value in &data {
        address.push(CHARSET[*value as usize] as char);
    }
    for i in 0..8 {
        let value = ((checksum >> (5 * (7 - i))) & 0x1f) as usize;
        address.push(CHARSET[value] as char);
    }
    Ok(address)
}

fn convert_bits_8_to_5(data: &[u8]) -> Vec<u8> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * 8 / 5 + 1);
    for byte in data {
        acc = (acc << 8) | *byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 0x1f) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 0x1f) as u8);
    }
    out
}

fn polymod(values: &[u8]) -> u64 {
    const GENERATORS: [u64; 5] = [
        0x98f2bc8e61,
        0x79b76d99e2,
        0xf33e5fb3c4,
        0xae2eabe2a8,
        0x1e4f43e470,
    ];
    let mut c: u64 = 1;
    for value in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ (*value as u64);
        for (i, generator) in GENERATORS.iter().enumerate() {
            if c0 & (1 << i) != 0 {
                c ^= generator;
            }
        }
    }
    c ^ 1
}
