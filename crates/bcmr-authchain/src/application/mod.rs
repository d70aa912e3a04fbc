//! Application layer: the resolver and its per-genesis locking.

pub mod keyed_lock;
pub mod service;

pub use keyed_lock::{KeyedLockGuard, KeyedLocks};
pub use service::AuthChainResolver;
