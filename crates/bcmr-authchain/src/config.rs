//! Resolver configuration.

use serde::{Deserialize, Serialize};

/// Batch category the resolver registers on the client.
pub const BCMR_INDEXER_CATEGORY: &str = "bcmr-indexer";

/// Default upper bound on remote calls spent per resolution.
pub const DEFAULT_MAX_INDEXING_COST: u64 = 1000;

/// Configuration for the authentication-chain resolver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthChainConfig {
    /// Budget used when a caller passes zero.
    pub max_indexing_cost: u64,
    /// Name of the batch category used for transaction lookups.
    pub category_name: String,
    /// Persist the memo every this many cost increments.
    pub persist_every: u64,
}

impl Default for AuthChainConfig {
    fn default() -> Self {
        Self {
            max_indexing_cost: DEFAULT_MAX_INDEXING_COST,
            category_name: BCMR_INDEXER_CATEGORY.to_string(),
            persist_every: 100,
        }
    }
}

impl AuthChainConfig {
    /// Small budget and frequent persistence for tests.
    pub fn for_testing() -> Self {
        Self {
            max_indexing_cost: 50,
            persist_every: 5,
            ..Self::default()
        }
    }

    /// The budget to use for a call: `requested`, or the default when zero.
    pub fn effective_budget(&self, requested: u64) -> u64 {
        if requested > 0 {
            requested
        } else {
            self.max_indexing_cost
        }
    }
}
