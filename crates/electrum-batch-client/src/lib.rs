//! # Electrum Batch Client
//!
//! Batching, rate-limited request multiplexer over a single electrum RPC
//! connection.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Callers submit logical requests to named *categories*. Each category has
//! its own sliding-window budget (`max` requests per `interval`). The client
//! coalesces queued requests into wire-level JSON-RPC batches that fit the
//! budget, and routes each response back to the request it answers.
//!
//! | Situation | Behaviour |
//! |-----------|-----------|
//! | Window exhausted | Retry scheduled for when the oldest batch leaves the window |
//! | Server rate-limit frame (code 4) | All categories pause 30 s, in-flight work is re-queued |
//! | Disconnect | Every outstanding item rejected with a network error |
//! | Abort signal | Only unsettled items rejected |
//!
//! ## Module Structure
//!
//! ```text
//! electrum-batch-client/
//! ├── domain/          # Request items, category queues, rate window, errors
//! ├── ports/           # ElectrumApi (inbound) + Transport (outbound)
//! ├── application/     # BatchClient
//! ├── adapters/        # WebSocketTransport
//! └── config.rs        # BatchClientConfig, CategoryConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{NodeEndpoint, WebSocketTransport};
pub use application::BatchClient;
pub use config::{
    BatchClientConfig, CategoryConfig, RateLimit, DEFAULT_NODE_URL, RATE_LIMIT_ERROR_CODE,
};
pub use domain::{AbortGroup, BatchRequestItem, ClientError, RateSample, RateWindow};
pub use ports::{
    ConnectionListener, ConnectionStatus, ElectrumApi, MockTransport, Transport, TransportEvent,
    TransportEvents, WireRequest,
};
pub use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
