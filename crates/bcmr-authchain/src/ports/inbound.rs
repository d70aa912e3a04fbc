//! # Inbound Ports
//!
//! What the resolver offers to the token registry.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::Hash;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::{AuthChainError, FetchAuthChainResult};

/// Authentication chain lookup - inbound port.
#[async_trait]
pub trait AuthChainProvider: Send + Sync {
    /// Resolve the chain starting at `authbase`. A zero `budget` selects
    /// the provider's default.
    async fn fetch_auth_chain(
        &self,
        authbase: &Hash,
        budget: u64,
    ) -> Result<FetchAuthChainResult, AuthChainError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Provider answering from a fixed table.
///
/// Unknown genesis hashes resolve to an empty chain.
#[derive(Default)]
pub struct MockAuthChainProvider {
    chains: Mutex<HashMap<Hash, Result<FetchAuthChainResult, AuthChainError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockAuthChainProvider {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `authbase` with `result`.
    pub fn insert(&self, authbase: Hash, result: Result<FetchAuthChainResult, AuthChainError>) {
        self.chains.lock().insert(authbase, result);
    }

    /// Delay every answer.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of lookups served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthChainProvider for MockAuthChainProvider {
    async fn fetch_auth_chain(
        &self,
        authbase: &Hash,
        budget: u64,
    ) -> Result<FetchAuthChainResult, AuthChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.chains
            .lock()
            .get(authbase)
            .cloned()
            .unwrap_or_else(|| {
                Ok(FetchAuthChainResult {
                    chain: Vec::new(),
                    indexing_cost: 0,
                    budget,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let mock = MockAuthChainProvider::new();
        mock.insert([1; 32], Err(AuthChainError::InvalidMemo("broken".into())));

        assert!(mock.fetch_auth_chain(&[1; 32], 0).await.is_err());
        let empty = mock.fetch_auth_chain(&[2; 32], 5).await.unwrap();
        assert!(empty.chain.is_empty());
        assert_eq!(empty.budget, 5);
        assert_eq!(mock.calls(), 2);
    }
}
