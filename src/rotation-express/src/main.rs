//! Rotation Express — bandit-driven content rotation service.
//!
//! Main entry point that initializes the ledger and notifier backends
//! and starts the server.

use clap::Parser;
use rotation_api::ApiServer;
use rotation_core::config::{AppConfig, StorageBackend};
use rotation_core::events::{noop_notifier, Notifier};
use rotation_engine::{Ledger, MemoryLedger, RotationEngine};
use rotation_notify::NatsNotifier;
use rotation_store::RedisLedger;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "rotation-express")]
#[command(about = "Bandit-driven content rotation service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ROTATION_EXPRESS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ROTATION_EXPRESS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Run with the in-memory ledger regardless of configuration
    #[arg(long, default_value_t = false)]
    memory_ledger: bool,

    /// Skip NATS publishing (events stay in the ledger only)
    #[arg(long, default_value_t = false)]
    no_publish: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rotation_express=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Rotation Express starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if cli.memory_ledger {
        config.storage = StorageBackend::Memory;
    }
    if cli.no_publish {
        config.nats.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        storage = ?config.storage,
        http_port = config.api.http_port,
        "Configuration loaded"
    );

    // Initialize the ledger backend. Selection cannot run without it.
    let ledger: Arc<dyn Ledger> = match config.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory ledger, counters are lost on restart");
            Arc::new(MemoryLedger::new())
        }
        StorageBackend::Redis => Arc::new(RedisLedger::new(&config.redis).await.map_err(|e| {
            error!(error = %e, "Failed to connect to Redis ledger");
            e
        })?),
    };

    // Initialize the notifier. Publication is best-effort, so a failed
    // NATS connection degrades to a no-op notifier instead of aborting.
    let notifier: Arc<dyn Notifier> = if config.nats.enabled {
        match NatsNotifier::connect(&config.nats).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                error!(error = %e, "Failed to connect to NATS, events will not be published");
                noop_notifier()
            }
        }
    } else {
        info!("Event publishing disabled");
        noop_notifier()
    };

    let engine = Arc::new(RotationEngine::new(ledger, notifier));

    // Start API server
    let api_server = ApiServer::new(config.clone(), engine);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Rotation Express is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
