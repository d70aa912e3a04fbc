//! Application layer: the registry manager and the wallet-facing cache.

pub mod identity_cache;
pub mod manager;

pub use identity_cache::{LoaderState, TokenIdentityCache, TokenIdentityWithState};
pub use manager::TokenRegistryManager;
