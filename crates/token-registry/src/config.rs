//! Registry manager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway used for `ipfs://` URLs.
pub const DEFAULT_IPFS_ENDPOINT: &str = "https://ipfs.io/ipfs/";

/// How long a resolved identity stays valid.
pub const IDENTITY_VALID_SECS: u64 = 6 * 3600;

/// Configuration for the token registry manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Prefix substituted for the `ipfs://` scheme.
    pub ipfs_endpoint: String,
    /// Identity fetches running at once.
    pub max_concurrent: usize,
    /// Chain entries tried per token, newest first.
    pub max_attempts: usize,
    /// Lifetime of a cached identity in seconds.
    pub identity_valid_secs: u64,
    /// HTTP timeout for registry documents.
    pub fetch_timeout_secs: u64,
    /// Characters of a failed response body kept in the error.
    pub excerpt_len: usize,
    /// Indexing cost budget passed to the chain resolver (0 = its default).
    pub max_indexing_cost: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ipfs_endpoint: DEFAULT_IPFS_ENDPOINT.to_string(),
            max_concurrent: 20,
            max_attempts: 3,
            identity_valid_secs: IDENTITY_VALID_SECS,
            fetch_timeout_secs: 30,
            excerpt_len: 200,
            max_indexing_cost: 0,
        }
    }
}

impl RegistryConfig {
    /// Low concurrency so tests can observe queueing.
    pub fn for_testing() -> Self {
        Self {
            max_concurrent: 2,
            fetch_timeout_secs: 5,
            ..Self::default()
        }
    }

    /// Builder: replace the IPFS gateway.
    pub fn with_ipfs_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ipfs_endpoint = endpoint.into();
        self
    }

    /// Identity lifetime.
    pub fn identity_valid_for(&self) -> Duration {
        Duration::from_secs(self.identity_valid_secs)
    }

    /// HTTP timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
