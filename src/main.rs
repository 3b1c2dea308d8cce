//! Chain Event Exporter — Entry Point
//!
//! Watches contract event streams and exports derived metrics for
//! Prometheus. Runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml + env overrides + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Connect to the chain node (chain id + block number check)
//! 4. Load contract ABIs and verify deployed code
//! 5. Create the metric store and health state
//! 6. Spawn /metrics server and /live + /ready health server
//! 7. Install one log filter per event stream
//! 8. Run the stream supervisor until a shutdown signal
//! 9. Stop the HTTP servers and exit
//!
//! Any failure in steps 1-7 exits non-zero.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use chain_event_exporter::adapters::chain::{
    ChainProvider, LogFilterSource, TokenSupply, WatchedContract,
};
use chain_event_exporter::adapters::metrics::{HealthServer, HealthState, MetricStore};
use chain_event_exporter::config;
use chain_event_exporter::domain::EventKind;
use chain_event_exporter::ports::SupplyReader;
use chain_event_exporter::usecases::{handler_for, StreamSupervisor};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = config::loader::config_path();
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.exporter.log_level)
            }),
        )
        .json()
        .init();

    info!(
        name = %config.exporter.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        poll_interval_secs = config.exporter.poll_interval_secs,
        "Starting chain event exporter"
    );

    // ── 3. Connect to the chain node ────────────────────────
    let chain = ChainProvider::connect(&config.chain)
        .await
        .context("Failed to connect to chain node")?;
    info!(rpc_url = chain.rpc_url(), "Chain provider ready");

    // ── 4. Load and validate contracts ──────────────────────
    let my_token = WatchedContract::load(
        "MyToken",
        "contracts.my_token.address",
        &config.contracts.my_token,
    )?;
    let escrow = WatchedContract::load(
        "Escrow",
        "contracts.escrow.address",
        &config.contracts.escrow,
    )?;
    let cash = WatchedContract::load("Cash", "contracts.cash.address", &config.contracts.cash)?;

    for contract in [&my_token, &escrow, &cash] {
        contract
            .ensure_deployed(&chain.inner())
            .await
            .with_context(|| format!("Contract {} failed validation", contract.name))?;
    }

    let supply: Arc<dyn SupplyReader> = Arc::new(
        TokenSupply::new(chain.inner(), &my_token).context("Token ABI lacks totalSupply()")?,
    );

    // ── 5. Metric store + health state ──────────────────────
    let store = Arc::new(MetricStore::new().context("Failed to register metrics")?);
    let health = Arc::new(HealthState::new());
    // Servers only; pollers are stopped by the supervisor.
    let (server_shutdown_tx, _) = broadcast::channel::<()>(1);

    // ── 6. Spawn HTTP servers ───────────────────────────────
    let metrics_handle = {
        let store = Arc::clone(&store);
        let bind = config.metrics.bind_address.clone();
        let shutdown_rx = server_shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = store.serve(bind, shutdown_rx).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    };

    let health_handle = {
        let server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let shutdown_rx = server_shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_rx).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    // ── 7. Install one filter per stream ────────────────────
    let interval = Duration::from_secs(config.exporter.poll_interval_secs);
    let mut supervisor = StreamSupervisor::new(
        Arc::clone(&store),
        Arc::clone(&health),
        Duration::from_secs(config.exporter.shutdown_grace_secs),
    );

    let streams = [
        (&escrow, EventKind::EscrowCreated),
        (&my_token, EventKind::Minted),
        (&my_token, EventKind::Burned),
        (&cash, EventKind::CashCharged),
        (&cash, EventKind::CashWithdrawn),
    ];
    for (contract, kind) in streams {
        let event = contract.event(kind)?;
        let source = LogFilterSource::install(chain.inner(), kind, contract.address, event)
            .await
            .with_context(|| format!("Failed to install {kind} filter on {}", contract.name))?;
        supervisor.add_stream(
            Box::new(source),
            handler_for(kind, Some(Arc::clone(&supply))),
            interval,
        );
    }

    info!(streams = supervisor.stream_count(), "Event listeners started");

    // ── 8. Run until SIGINT / SIGTERM ───────────────────────
    let report = supervisor.run(shutdown_signal()).await;
    if !report.stopped_early.is_empty() {
        warn!(streams = ?report.stopped_early, "Some streams had stopped before shutdown");
    }

    // ── 9. Stop HTTP servers (pollers have drained) ─────────
    let _ = server_shutdown_tx.send(());
    for handle in [metrics_handle, health_handle] {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("HTTP server did not stop in time");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("SIGINT received, initiating shutdown"),
        () = terminate => info!("SIGTERM received, initiating shutdown"),
    }
}
