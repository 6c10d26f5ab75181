//! # notesync-realtime: Live Connections for Note Sync
//!
//! Keeps track of which client devices are connected right now and pushes
//! small notifications to them: "something changed, pull" after a push,
//! and a heartbeat every few seconds.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Realtime Architecture                            │
//! │                                                                         │
//! │  ┌──────────────┐   register /      ┌──────────────────────────────┐   │
//! │  │  HubServer   │   unregister      │     ConnectionRegistry       │   │
//! │  │  (axum /ws)  │ ────────────────► │  (user, conn_id) ─► conn     │   │
//! │  └──────────────┘                   └──────────────┬───────────────┘   │
//! │                                                    │ snapshots          │
//! │                                     ┌──────────────▼───────────────┐   │
//! │  sync service ──send_to_user──────► │           FanOut             │   │
//! │   (excludes origin)                 │  concurrent, timeout-bound   │   │
//! │                                     └──────────────▲───────────────┘   │
//! │  ┌──────────────────┐                              │                    │
//! │  │ HeartbeatEmitter │ ──────send_to_all (5 s)──────┘                    │
//! │  └──────────────────┘                                                   │
//! │                                                                         │
//! │  One CancellationToken stops the hub, the heartbeat and any fan-out   │
//! │  still in flight.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Heartbeat, fan-out and hub settings
//! - [`connection`] - The `Connection` trait and its channel-backed impl
//! - [`registry`] - Live connection registry
//! - [`fanout`] - Best-effort delivery to many connections
//! - [`heartbeat`] - Periodic liveness broadcast
//! - [`hub`] - WebSocket server
//! - [`error`] - Realtime error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use notesync_realtime::{
//!     ConnectionRegistry, FanOut, HeartbeatEmitter, HubServer, RealtimeConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let config = RealtimeConfig::default();
//! let registry = Arc::new(ConnectionRegistry::new());
//! let fanout = Arc::new(FanOut::new(registry.clone(), config.send_timeout()));
//! let shutdown = CancellationToken::new();
//!
//! let hub = HubServer::new(config.hub.clone(), registry, config.channel_capacity)
//!     .start(shutdown.clone())
//!     .await?;
//! let heartbeat = HeartbeatEmitter::new(fanout, config.heartbeat_interval())
//!     .spawn(shutdown.clone());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connection;
pub mod error;
pub mod fanout;
pub mod heartbeat;
pub mod hub;
pub mod registry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{HubSettings, RealtimeConfig};
pub use connection::{ChannelConnection, Connection};
pub use error::{RealtimeError, RealtimeResult};
pub use fanout::{DeliveryReport, FanOut};
pub use heartbeat::{HeartbeatEmitter, HeartbeatState, DEFAULT_HEARTBEAT_PERIOD};
pub use hub::{HelloPayload, HubHandle, HubServer};
pub use registry::{ConnectionRegistry, RegisteredConnection};
