//! # Batch Client Configuration
//!
//! Connection settings for the electrum node and the per-category rate
//! limits used by the batch sender.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default electrum node used by the wallet.
pub const DEFAULT_NODE_URL: &str = "wss://electrum.imaginary.cash:50004/";

/// Error code the server uses for a batch rate-limit violation.
pub const RATE_LIMIT_ERROR_CODE: i64 = 4;

/// Batch client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchClientConfig {
    /// WebSocket URL of the electrum node (`ws://` or `wss://`).
    pub node_url: String,

    /// Cool-down after the server signals a rate-limit breach.
    pub rate_limit_pause_secs: u64,

    /// Upper bound on the number of requests in one wire batch.
    pub max_chunk_size: usize,

    /// Margin added to a scheduled retry once the window is exhausted.
    /// Also the minimum retry delay.
    pub retry_margin_ms: u64,

    /// Interval between `server.ping` keep-alives.
    pub keep_alive_secs: u64,

    /// Client name announced in `server.version`.
    pub client_name: String,

    /// Protocol version announced in `server.version`.
    pub protocol_version: String,
}

impl Default for BatchClientConfig {
    fn default() -> Self {
        Self {
            node_url: DEFAULT_NODE_URL.to_string(),
            rate_limit_pause_secs: 30,
            max_chunk_size: 100,
            retry_margin_ms: 200,
            keep_alive_secs: 30,
            client_name: "electrum-cash".to_string(),
            protocol_version: "1.4.3".to_string(),
        }
    }
}

impl BatchClientConfig {
    /// Create a config for testing (short pauses, small chunks).
    pub fn for_testing() -> Self {
        Self {
            node_url: "ws://127.0.0.1:50003/".to_string(),
            rate_limit_pause_secs: 30,
            max_chunk_size: 10,
            retry_margin_ms: 200,
            keep_alive_secs: 5,
            ..Default::default()
        }
    }

    /// Point the client at another node.
    pub fn with_node_url(mut self, url: impl Into<String>) -> Self {
        self.node_url = url.into();
        self
    }

    /// Rate-limit cool-down as a duration.
    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_secs(self.rate_limit_pause_secs)
    }

    /// Retry margin as a duration.
    pub fn retry_margin(&self) -> Duration {
        Duration::from_millis(self.retry_margin_ms)
    }
}

/// Sliding-window budget: at most `max` requests per `interval_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub max: usize,
    /// Window length in milliseconds.
    pub interval_ms: u64,
}

impl RateLimit {
    /// Window length as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Parameters of one batch sender category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Rate budget of the category.
    pub rate_limit: RateLimit,
}

impl CategoryConfig {
    /// Category with the given budget.
    pub fn new(max: usize, interval_ms: u64) -> Self {
        Self {
            rate_limit: RateLimit { max, interval_ms },
        }
    }

    /// Budget used by the authentication-chain indexer.
    pub fn bcmr_indexer() -> Self {
        Self::new(500, 20_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BatchClientConfig::default();
        assert_eq!(config.node_url, DEFAULT_NODE_URL);
        assert_eq!(config.max_chunk_size, 100);
        assert_eq!(config.rate_limit_pause(), Duration::from_secs(30));
        assert_eq!(config.retry_margin(), Duration::from_millis(200));
    }

    #[test]
    fn test_bcmr_indexer_budget() {
        let category = CategoryConfig::bcmr_indexer();
        assert_eq!(category.rate_limit.max, 500);
        assert_eq!(category.rate_limit.interval(), Duration::from_secs(20));
    }
}
