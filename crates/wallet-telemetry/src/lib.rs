//! # Wallet Telemetry
//!
//! Logging and metrics for the batch client, the authentication-chain
//! resolver and the token registry.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wallet_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config).expect("Failed to init logging");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `token-registry` | Service name in log lines |
//! | `BCMR_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `BCMR_JSON_LOGS` | `false` | Emit JSON formatted logs |
//! | `BCMR_CONSOLE_OUTPUT` | `true` | Write logs to stderr at all |

#![warn(missing_docs)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_text, AUTHCHAIN_INDEXING_COST, BATCH_CHUNKS_SENT, BATCH_REQUESTS_SENT,
    RATE_LIMIT_PAUSES, REGISTRY_FETCHES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Log subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Metrics could not be gathered or encoded.
    #[error("Failed to encode metrics: {0}")]
    Metrics(String),

    /// Bad configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Helper to create structured log entries with a consistent component field.
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(component = $component, $($($field)*,)? $msg)
    };
    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(component = $component, $($($field)*,)? $msg)
    };
    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(component = $component, $($($field)*,)? $msg)
    };
    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(component = $component, $($($field)*,)? $msg)
    };
}
