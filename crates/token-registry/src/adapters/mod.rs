//! Adapters layer: HTTPS download and the store-backed document cache.

pub mod content_cache;
pub mod http;

pub use content_cache::{content_key, ContentCache, TokenBcmrContentsRecord};
pub use http::HttpContentFetcher;
