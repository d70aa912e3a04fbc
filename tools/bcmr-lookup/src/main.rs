//! bcmr-lookup: resolve the BCMR identity of one token.
//!
//! Connects to an electrum node, walks the token's authentication chain,
//! downloads and verifies the newest registry document and prints the
//! resulting identity as JSON (`null` when the token has no record).
//!
//! ## Usage
//!
//! ```bash
//! # Default node and IPFS gateway
//! bcmr-lookup <token-id>
//!
//! # Custom node, bigger indexing budget
//! bcmr-lookup --node wss://node.example.com:50004/ --max-cost 5000 <token-id>
//!
//! # Dump the request counters to stderr afterwards
//! bcmr-lookup --metrics <token-id>
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;

use bcmr_authchain::{AuthChainConfig, AuthChainResolver, DEFAULT_MAX_INDEXING_COST};
use electrum_batch_client::{
    BatchClient, BatchClientConfig, ConnectionStatus, WebSocketTransport, DEFAULT_NODE_URL,
};
use shared_types::InMemoryKVStore;
use token_registry::{HttpContentFetcher, RegistryConfig, TokenRegistryManager, DEFAULT_IPFS_ENDPOINT};
use wallet_telemetry::{gather_text, init_logging, log_event, TelemetryConfig};

/// Token identity lookup over BCMR
#[derive(Parser, Debug)]
#[command(name = "bcmr-lookup")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Electrum WebSocket URL
    #[arg(long, default_value = DEFAULT_NODE_URL)]
    node: String,

    /// Gateway used for `ipfs://` URLs
    #[arg(long, default_value = DEFAULT_IPFS_ENDPOINT)]
    ipfs_endpoint: String,

    /// Indexing cost budget for the authentication chain walk
    #[arg(long, default_value_t = DEFAULT_MAX_INDEXING_COST)]
    max_cost: u64,

    /// Seconds to wait for the node connection
    #[arg(long, default_value = "15")]
    connect_timeout: u64,

    /// Print Prometheus metrics to stderr after the lookup
    #[arg(long)]
    metrics: bool,

    /// Token id (genesis transaction id, hex)
    token_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&TelemetryConfig::from_env()).context("logging setup")?;

    let client_config = BatchClientConfig {
        node_url: args.node.clone(),
        ..BatchClientConfig::default()
    };
    let (transport, events) =
        WebSocketTransport::new(client_config.clone()).context("invalid node URL")?;
    let client = Arc::new(BatchClient::new(client_config, transport, events));

    let resolver = AuthChainResolver::new(
        Arc::clone(&client),
        Arc::new(InMemoryKVStore::new()),
        AuthChainConfig {
            max_indexing_cost: args.max_cost,
            ..AuthChainConfig::default()
        },
    )?;
    let registry_config = RegistryConfig::default().with_ipfs_endpoint(args.ipfs_endpoint);
    let fetcher = HttpContentFetcher::new(registry_config.fetch_timeout())?;
    let manager = TokenRegistryManager::new(
        registry_config,
        Arc::new(resolver),
        Arc::new(fetcher),
        Arc::new(InMemoryKVStore::new()),
    );
    client.add_listener(Arc::new(manager.clone()));

    client.init().await?;
    wait_connected(&client, Duration::from_secs(args.connect_timeout)).await?;
    manager.on_client_connected();
    log_event!(info, "lookup", "Resolving token identity", token_id = %args.token_id);

    let outcome = manager.fetch_token_identity(&args.token_id, Utc::now()).await;
    client.destroy().await;
    if args.metrics {
        eprint!("{}", metrics_report()?);
    }

    let identity = outcome?;
    if identity.is_none() {
        info!("[lookup] No registry record for {}", args.token_id);
    }
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

async fn wait_connected(
    client: &BatchClient<WebSocketTransport>,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while client.status() != ConnectionStatus::Connected {
        if tokio::time::Instant::now() >= deadline {
            bail!("no connection to the electrum node after {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

fn metrics_report() -> Result<String> {
    gather_text().context("encoding metrics")
}
