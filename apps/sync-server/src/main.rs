//! # Note Sync Server
//!
//! ```text
//! sync-server [CONFIG]        CONFIG defaults to $NOTESYNC_CONFIG, then
//!                             ./notesync.toml; a missing file means defaults
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use notesync_server::config::LoggingSettings;
use notesync_server::{RunningServer, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NOTESYNC_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("notesync.toml"));

    // Config errors are reported before logging exists
    let config = ServerConfig::load(Some(&config_path))
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&config.logging);

    info!(
        config = %config_path.display(),
        db_path = %config.database.path,
        hub = %config.realtime.hub.bind_address(),
        "Starting note sync server..."
    );

    if let Some(addr) = &config.metrics.prometheus_addr {
        let addr: SocketAddr = addr.parse().context("parsing metrics.prometheus_addr")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let shutdown = CancellationToken::new();
    let server = RunningServer::start(config, shutdown.clone())
        .await
        .context("starting server")?;

    shutdown_signal().await;
    server.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
