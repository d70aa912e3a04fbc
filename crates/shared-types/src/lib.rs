//! # Shared Types Crate
//!
//! Types and ports shared by the batch client, the authentication-chain
//! resolver and the token registry.
//!
//! ## Contents
//!
//! - **Entities**: `Hash`, `TokenId`, hex helpers
//! - **Transaction**: wire decoding of transactions (inputs, outputs, token prefix)
//! - **CashAddr**: locking bytecode to standard address encoding
//! - **Store**: the `KeyValueStore` port and the `InMemoryKVStore` fake
//! - **Errors**: the error kinds every component maps onto

pub mod cashaddr;
pub mod entities;
pub mod errors;
pub mod store;
pub mod transaction;

pub use cashaddr::{locking_bytecode_to_cash_address, CASHADDR_MAINNET_PREFIX};
pub use entities::*;
pub use errors::*;
pub use store::{decode_record, encode_record, BatchOperation, InMemoryKVStore, KeyValueStore, ScanResult};
pub use transaction::{
    decode_transaction, hash_transaction_ui_order, Input, Output, TokenPrefix, Transaction,
};
