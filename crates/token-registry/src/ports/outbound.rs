//! # Outbound Ports
//!
//! Registry document download. Selecting the URL and judging the status
//! is the manager's job; the fetcher only performs the GET.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::RegistryError;

/// Response to a document GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

/// Document download - outbound port.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// GET `url`. Transport failures are errors; any status is a response.
    async fn fetch(&self, url: &str) -> Result<FetchResponse, RegistryError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Fetcher serving fixed bodies; unknown URLs answer 404.
#[derive(Default)]
pub struct MockContentFetcher {
    responses: Mutex<HashMap<String, FetchResponse>>,
    requests: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockContentFetcher {
    /// Empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `url`.
    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.serve_status(url, 200, body);
    }

    /// Serve `body` with `status` at `url`.
    pub fn serve_status(&self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        self.responses.lock().insert(
            url.into(),
            FetchResponse {
                status,
                body: body.into(),
            },
        );
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of GETs performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ContentFetcher for MockContentFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(url.to_string());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or(FetchResponse {
                status: 404,
                body: b"not found".to_vec(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_and_records() {
        let fetcher = MockContentFetcher::new();
        fetcher.serve("https://a/doc.json", "{}");
        assert_eq!(fetcher.fetch("https://a/doc.json").await.unwrap().status, 200);
        assert_eq!(fetcher.fetch("https://a/other").await.unwrap().status, 404);
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.requests()[1], "https://a/other");
    }
}
