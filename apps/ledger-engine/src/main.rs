//! Ledger Engine Binary
//!
//! Starts the Perks loyalty ledger engine: connects to PostgreSQL,
//! runs pending migrations, and drives the order reconciliation pool
//! until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ledger-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URI`: PostgreSQL connection URL
//! - `ACCRUAL_SYSTEM_ADDRESS`: Base address of the accrual service
//!
//! ## Optional
//! - `RUN_ADDRESS`: Bind address for the HTTP service layer (default: localhost:8080)
//! - `LEDGER_CONFIG`: Path to a YAML config file (default: config.yaml)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use ledger_engine::config::{load_config, Config};
use ledger_engine::{
    order_queue, AccrualClient, OrderLedger, PgOrderStore, PoolHandle, WorkerPool,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    tracing::info!("Starting Perks Ledger Engine");

    let config_path = std::env::var("LEDGER_CONFIG").ok();
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    log_config(&config);

    let store = Arc::new(
        PgOrderStore::connect(
            &config.database.url,
            config.database.max_connections,
            config.database.query_timeout(),
        )
        .await
        .context("connecting to PostgreSQL")?,
    );

    let accrual = Arc::new(
        AccrualClient::new(&config.accrual.client_config()).context("building accrual client")?,
    );

    let (queue_tx, queue_rx) = order_queue(config.reconciliation.queue_capacity);
    let ledger = Arc::new(OrderLedger::new(Arc::clone(&store), queue_tx.clone()));

    let shutdown = CancellationToken::new();
    let pool = WorkerPool::new(
        config.reconciliation.pool_config(),
        Arc::clone(&ledger),
        accrual,
        queue_tx,
        queue_rx,
        shutdown.clone(),
    );
    let pool_handle = pool.start();

    tracing::info!("Ledger engine ready");

    await_shutdown(shutdown, pool_handle).await;

    tracing::info!("Ledger engine stopped");
    Ok(())
}

/// Load .env file from the current directory, if present.
fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Initialize the tracing subscriber with environment filter.
///
/// Uses a static directive string that is a compile-time constant
/// guaranteed to parse.
#[allow(clippy::expect_used)]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "ledger_engine=info"
                    .parse()
                    .expect("static directive 'ledger_engine=info' is valid"),
            ),
        )
        .init();
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        bind_address = %config.server.bind_address,
        accrual_address = %config.accrual.address,
        workers = config.reconciliation.workers,
        max_restarts = config.reconciliation.max_restarts,
        queue_capacity = config.reconciliation.queue_capacity,
        "Configuration loaded"
    );
}

/// Wait for a shutdown signal, then cancel the pool and join it.
async fn await_shutdown(shutdown: CancellationToken, pool_handle: PoolHandle) {
    shutdown_signal().await;
    shutdown.cancel();
    if let Err(e) = pool_handle.join().await {
        tracing::error!("Reconciliation pool panicked: {e}");
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed: the process could
/// never respond to termination signals, so failing fast at startup is
/// preferable to running unresponsive.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
