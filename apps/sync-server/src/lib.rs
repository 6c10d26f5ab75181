//! # Note Sync Server
//!
//! Wires storage, live connections and the sync service into one process.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Server Process                            │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  SyncService   │  │  HubServer     │  │  HeartbeatEmitter          ││
//! │  │                │  │                │  │                            ││
//! │  │ • push         │  │ • /ws          │  │ • every 5 s                ││
//! │  │ • fetch        │  │ • /health      │  │ • send_to_all              ││
//! │  └───────┬────────┘  └───────┬────────┘  └─────────────┬──────────────┘│
//! │          │                   │                         │               │
//! │          ▼                   ▼                         ▼               │
//! │  ┌──────────────┐    ┌──────────────────────────────────────────────┐  │
//! │  │  Database    │    │     ConnectionRegistry ◄──── FanOut          │  │
//! │  │  (SQLite)    │    └──────────────────────────────────────────────┘  │
//! │  └──────────────┘                                                      │
//! │                                                                         │
//! │  One shutdown token stops the hub, the heartbeat and in-flight         │
//! │  fan-outs; the pool closes last.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! A TOML file (see [`config`]) plus environment variables:
//! - `NOTESYNC_DB_PATH` - SQLite file or `:memory:`
//! - `NOTESYNC_LOG_LEVEL` - Log filter when `RUST_LOG` is unset
//! - `NOTESYNC_PROMETHEUS_ADDR` - Enables the metrics scrape listener
//! - `NOTESYNC_HUB_PORT` / `NOTESYNC_HUB_BIND` - WebSocket listener
//! - `NOTESYNC_HEARTBEAT_INTERVAL_SECS` / `NOTESYNC_SEND_TIMEOUT_MS`

pub mod config;
pub mod error;
pub mod metrics;
pub mod services;

use std::sync::Arc;

use notesync_db::Database;
use notesync_realtime::{ConnectionRegistry, FanOut, HeartbeatEmitter, HubHandle, HubServer};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// Re-exports
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use metrics::SyncMetrics;
pub use services::SyncService;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub registry: Arc<ConnectionRegistry>,
    pub fanout: Arc<FanOut>,
    pub sync: SyncService,
    pub config: ServerConfig,
}

/// A started server and the tasks it owns.
pub struct RunningServer {
    pub state: AppState,
    shutdown: CancellationToken,
    hub: HubHandle,
    heartbeat: JoinHandle<()>,
}

impl RunningServer {
    /// Opens the database and starts the hub and heartbeat.
    ///
    /// `shutdown` is the process-lifetime token; cancelling it stops every
    /// task this server started.
    pub async fn start(config: ServerConfig, shutdown: CancellationToken) -> ServerResult<Self> {
        let db = Database::new(config.database.db_config()).await?;

        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = Arc::new(FanOut::new(
            registry.clone(),
            config.realtime.send_timeout(),
        ));
        let sync = SyncService::new(
            db.clone(),
            fanout.clone(),
            SyncMetrics::new(),
            config.sync.fetch_limit,
        );

        let hub = HubServer::new(
            config.realtime.hub.clone(),
            registry.clone(),
            config.realtime.channel_capacity,
        )
        .start(shutdown.clone())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        let heartbeat = HeartbeatEmitter::new(fanout.clone(), config.realtime.heartbeat_interval())
            .spawn(shutdown.clone());

        info!(hub_addr = %hub.local_addr(), "Sync server started");

        Ok(RunningServer {
            state: AppState {
                db,
                registry,
                fanout,
                sync,
                config,
            },
            shutdown,
            hub,
            heartbeat,
        })
    }

    pub fn hub_addr(&self) -> std::net::SocketAddr {
        self.hub.local_addr()
    }

    /// Stops the hub and heartbeat, then closes the pool.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.hub.shutdown().await;
        if let Err(e) = self.heartbeat.await {
            error!(error = %e, "Heartbeat task failed");
        }
        self.state.db.close().await;
        info!("Sync server stopped");
    }
}
