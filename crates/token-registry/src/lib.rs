//! # Token Registry
//!
//! Turns a token id into a display identity (name, symbol, decimals,
//! icon) by following the BCMR pointers on the token's authentication
//! chain and downloading the registry document they announce.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Flow
//!
//! 1. Resolve the authentication chain (`AuthChainProvider`).
//! 2. Try the newest pointer first; fall back to older ones.
//! 3. Download the document over HTTPS, rewriting `ipfs://` to a gateway.
//! 4. Check its SHA-256 against the pointer and cache it.
//! 5. Pick the identity snapshot valid at the requested time.
//!
//! Requests for the same token are coalesced; at most
//! `RegistryConfig::max_concurrent` run at once and none run while the
//! electrum client is disconnected.
//!
//! ## Module Structure
//!
//! ```text
//! token-registry/
//! ├── domain/          # Registry document, identity, errors
//! ├── ports/           # TokenIdentityLoader (in), ContentFetcher (out)
//! ├── application/     # TokenRegistryManager, TokenIdentityCache
//! ├── adapters/        # reqwest fetcher, document cache
//! └── config.rs        # RegistryConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{content_key, ContentCache, HttpContentFetcher, TokenBcmrContentsRecord};
pub use application::{LoaderState, TokenIdentityCache, TokenIdentityWithState, TokenRegistryManager};
pub use config::{RegistryConfig, DEFAULT_IPFS_ENDPOINT, IDENTITY_VALID_SECS};
pub use domain::{
    identity_from_snapshot, is_verified, native_bch_identity, pull_identity_snapshot,
    rewrite_url, validate_registry, IdentitySnapshot, Registry, RegistryError, TokenCategory,
    TokenIdentity,
};
pub use ports::{
    ContentFetcher, FetchResponse, ListenerLog, MockContentFetcher, RecordingListener,
    RequestStatus, TokenIdentityListener, TokenIdentityLoader,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
