//! # BCMR Authentication Chain
//!
//! Resolves the authentication chain of a token and the BCMR metadata
//! pointers announced along it.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! A token's genesis transaction starts its authentication chain; every
//! transaction spending output #0 of the current link extends it. Links may
//! carry a null-data output pointing at a registry document:
//!
//! ```text
//! OP_RETURN <"BCMR"> <sha256(document)> <url>*
//! ```
//!
//! The resolver walks the chain through the electrum batch client and
//! memoizes everything it learns in the keyed persistent store, bounded by
//! an indexing cost budget per call.
//!
//! ## Module Structure
//!
//! ```text
//! bcmr-authchain/
//! ├── domain/          # Pointer parsing, memo records, errors
//! ├── ports/           # AuthChainProvider (inbound)
//! ├── application/     # AuthChainResolver, per-genesis locks
//! ├── adapters/        # Memo store key layout
//! ├── testing.rs       # ChainFixture for mock-transport runs
//! └── config.rs        # AuthChainConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod testing;

// Re-exports
pub use adapters::AuthChainMemDb;
pub use application::{AuthChainResolver, KeyedLocks};
pub use config::{AuthChainConfig, BCMR_INDEXER_CATEGORY, DEFAULT_MAX_INDEXING_COST};
pub use domain::{
    encode_bcmr_op_return, parse_bcmr_from_bytecodes, parse_bcmr_op_return,
    parse_op_return_pushes, AuthChainEntry, AuthChainError, AuthChainFetchMem, AuthChainMemItem,
    AuthChainMemTransaction, BcmrParseError, BcmrPointer, FetchAuthChainResult,
};
pub use ports::{AuthChainProvider, MockAuthChainProvider};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
