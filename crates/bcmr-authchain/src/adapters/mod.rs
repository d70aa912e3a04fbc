//! Adapters layer: the memo store over the keyed persistent store.

pub mod memdb;

pub use memdb::{authchain_key, lbc_key, lbc_prefix, zop_key, AuthChainMemDb};
