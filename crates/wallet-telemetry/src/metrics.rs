//! Prometheus metrics for the token registry components.
//!
//! All metrics follow the naming convention: `bcmr_<component>_<metric>_total`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Metrics registry shared by every component
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BATCH_REQUESTS_SENT.clone()),
            Box::new(BATCH_CHUNKS_SENT.clone()),
            Box::new(RATE_LIMIT_PAUSES.clone()),
            Box::new(AUTHCHAIN_INDEXING_COST.clone()),
            Box::new(REGISTRY_FETCHES.clone()),
        ];
        for collector in collectors {
            // Names are unique constants; a clash is a programming error
            // surfaced by the unit test below.
            let _ = registry.register(collector);
        }
        registry
    };

    // =========================================================================
    // BATCH CLIENT
    // =========================================================================

    /// Requests dispatched through batch categories
    pub static ref BATCH_REQUESTS_SENT: CounterVec = CounterVec::new(
        Opts::new("bcmr_batch_requests_sent_total", "Requests dispatched in wire batches"),
        &["category"]
    ).expect("metric creation failed");

    /// Wire batches dispatched
    pub static ref BATCH_CHUNKS_SENT: CounterVec = CounterVec::new(
        Opts::new("bcmr_batch_chunks_sent_total", "Wire batches dispatched"),
        &["category"]
    ).expect("metric creation failed");

    /// Server-signalled rate-limit pauses
    pub static ref RATE_LIMIT_PAUSES: Counter = Counter::new(
        "bcmr_rate_limit_pauses_total",
        "Times the server signalled a batch rate-limit breach"
    ).expect("metric creation failed");

    // =========================================================================
    // AUTHCHAIN RESOLVER
    // =========================================================================

    /// Remote calls spent walking authentication chains
    pub static ref AUTHCHAIN_INDEXING_COST: Counter = Counter::new(
        "bcmr_authchain_indexing_cost_total",
        "Remote calls spent resolving authentication chains"
    ).expect("metric creation failed");

    // =========================================================================
    // TOKEN REGISTRY
    // =========================================================================

    /// Identity resolutions by outcome (found, no_record, error)
    pub static ref REGISTRY_FETCHES: CounterVec = CounterVec::new(
        Opts::new("bcmr_registry_fetches_total", "Token identity resolutions"),
        &["outcome"]
    ).expect("metric creation failed");
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_registered() {
        BATCH_REQUESTS_SENT.with_label_values(&["test"]).inc_by(2.0);
        RATE_LIMIT_PAUSES.inc();
        let text = gather_text().unwrap();
        assert!(text.contains("bcmr_batch_requests_sent_total"));
        assert!(text.contains("bcmr_rate_limit_pauses_total"));
    }
}
