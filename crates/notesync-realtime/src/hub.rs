//! # WebSocket Hub
//!
//! Accepts client sockets, identifies them and keeps the
//! [`ConnectionRegistry`] in step with what is actually connected.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Hub Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      HubServer (Axum)                           │   │
//! │  │                                                                 │   │
//! │  │  /ws ──▶ upgrade ──▶ handle_socket                              │   │
//! │  │                         │                                       │   │
//! │  │          1. Hello { userId, connectionId }  (within timeout)    │   │
//! │  │          2. register ChannelConnection                          │   │
//! │  │          3. welcome notification                                │   │
//! │  │                         │                                       │   │
//! │  │      ┌──────────────────┼──────────────────┐                    │   │
//! │  │      ▼                  ▼                  ▼                    │   │
//! │  │  outgoing task     ping task        receive loop               │   │
//! │  │  (drains fan-out   (keepalive)      (pong, close,              │   │
//! │  │   channel)                           shutdown)                 │   │
//! │  │                         │                                       │   │
//! │  │          4. unregister_exact on any exit                        │   │
//! │  │                                                                 │   │
//! │  │  /health ──▶ "OK"                                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Clients never push data over the socket; pushes go through the sync  │
//! │  service, which fans out notifications through the registry.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use notesync_core::validation::validate_item_id;
use notesync_core::Notification;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HubSettings;
use crate::connection::{ChannelConnection, Connection};
use crate::error::{RealtimeError, RealtimeResult};
use crate::registry::ConnectionRegistry;

/// Tag of the message confirming a socket was registered.
pub const WELCOME_TYPE: &str = "welcome";

// =============================================================================
// Handshake Messages
// =============================================================================

/// Messages a client may send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First frame on every socket.
    Hello(HelloPayload),
}

/// Identity a client announces when it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub user_id: String,
    /// Stable per-session id; the client echoes it on pushes.
    pub connection_id: String,
}

/// Body of the welcome notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeData {
    pub connection_id: String,
    /// Server clock in milliseconds since the epoch.
    pub server_time: i64,
}

// =============================================================================
// Hub State
// =============================================================================

struct HubState {
    settings: HubSettings,
    registry: Arc<ConnectionRegistry>,
    channel_capacity: usize,
    shutdown: CancellationToken,
}

// =============================================================================
// Hub Server
// =============================================================================

/// WebSocket server feeding the connection registry.
pub struct HubServer {
    settings: HubSettings,
    registry: Arc<ConnectionRegistry>,
    channel_capacity: usize,
}

/// Handle to a running hub.
pub struct HubHandle {
    shutdown: CancellationToken,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    task: JoinHandle<()>,
}

impl HubHandle {
    /// Address the listener actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registered connections, live or not.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Closes every socket and waits for the server task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Hub server task failed");
        }
    }
}

impl HubServer {
    pub fn new(
        settings: HubSettings,
        registry: Arc<ConnectionRegistry>,
        channel_capacity: usize,
    ) -> Self {
        HubServer {
            settings,
            registry,
            channel_capacity,
        }
    }

    /// Binds the listener and serves until `shutdown` fires.
    ///
    /// ## Errors
    /// `TransportError` when the address cannot be bound.
    pub async fn start(self, shutdown: CancellationToken) -> RealtimeResult<HubHandle> {
        let shutdown = shutdown.child_token();
        let bind_addr = self.settings.bind_address();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            RealtimeError::TransportError(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(HubState {
            settings: self.settings,
            registry: self.registry.clone(),
            channel_capacity: self.channel_capacity,
            shutdown: shutdown.clone(),
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        info!(addr = %local_addr, "Hub server started");

        let server_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                server_shutdown.cancelled().await;
                info!("Hub server shutting down");
            })
            .await;

            if let Err(e) = result {
                error!(error = %e, "Hub server stopped with error");
            }
        });

        Ok(HubHandle {
            shutdown,
            local_addr,
            registry: self.registry,
            task,
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HubState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!(addr = %addr, "WebSocket upgrade requested");
    ws.max_message_size(state.settings.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: Arc<HubState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    let hello = match receive_hello(&mut receiver, &state.settings).await {
        Ok(hello) => hello,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Handshake failed - closing connection");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let user_id = hello.user_id;
    let connection_id = hello.connection_id;

    let (connection, mut payload_rx) = ChannelConnection::pair(state.channel_capacity);
    let connection: Arc<dyn Connection> = Arc::new(connection);
    state
        .registry
        .register(connection.clone(), &user_id, &connection_id)
        .await;

    info!(
        user_id = %user_id,
        connection_id = %connection_id,
        addr = %addr,
        "Client connected"
    );

    if let Err(e) = send_welcome(&mut sender, &connection_id).await {
        warn!(connection_id = %connection_id, error = %e, "Failed to send welcome");
        state
            .registry
            .unregister_exact(&user_id, &connection_id, &connection)
            .await;
        return;
    }

    // Control frames (pings, pongs) share the socket with fan-out payloads
    let (control_tx, mut control_rx) = mpsc::channel::<Message>(8);

    let outgoing_id = connection_id.clone();
    let outgoing_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                payload = payload_rx.recv() => match payload {
                    Some(payload) => Message::Text(payload.into()),
                    None => break,
                },
                control = control_rx.recv() => match control {
                    Some(control) => control,
                    None => break,
                },
            };

            if let Err(e) = sender.send(msg).await {
                debug!(connection_id = %outgoing_id, error = %e, "Socket write failed");
                break;
            }
        }
    });

    let ping_tx = control_tx.clone();
    let ping_every = state.settings.ping_interval();
    let ping_handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + ping_every, ping_every);
        loop {
            ticker.tick().await;
            if ping_tx
                .send(Message::Ping(axum::body::Bytes::new()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            _ = state.shutdown.cancelled() => {
                debug!(connection_id = %connection_id, "Closing socket for shutdown");
                let _ = control_tx.send(Message::Close(None)).await;
                break;
            }
            next = receiver.next() => next,
        };

        match next {
            Some(Ok(Message::Ping(data))) => {
                let _ = control_tx.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => {
                info!(connection_id = %connection_id, "Client requested close");
                break;
            }
            Some(Ok(Message::Text(text))) => {
                debug!(
                    connection_id = %connection_id,
                    len = text.as_str().len(),
                    "Ignoring client message after handshake"
                );
            }
            Some(Ok(Message::Binary(_))) => {
                debug!(connection_id = %connection_id, "Ignoring binary frame");
            }
            Some(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            None => {
                info!(connection_id = %connection_id, "Client disconnected");
                break;
            }
        }
    }

    // Cleanup
    ping_handle.abort();
    drop(control_tx);
    if state.shutdown.is_cancelled() {
        // Let the queued close frame flush
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), outgoing_handle).await;
    } else {
        outgoing_handle.abort();
    }
    state
        .registry
        .unregister_exact(&user_id, &connection_id, &connection)
        .await;
}

/// Reads and checks the Hello frame.
async fn receive_hello(
    receiver: &mut SplitStream<WebSocket>,
    settings: &HubSettings,
) -> RealtimeResult<HelloPayload> {
    let next = tokio::time::timeout(settings.hello_timeout(), receiver.next())
        .await
        .map_err(|_| RealtimeError::ProtocolError("Hello timeout".into()))?;

    let text = match next {
        Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
        Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).to_string(),
        Some(Ok(_)) => return Err(RealtimeError::ProtocolError("Expected Hello".into())),
        Some(Err(e)) => return Err(RealtimeError::TransportError(e.to_string())),
        None => return Err(RealtimeError::Disconnected),
    };

    let ClientMessage::Hello(hello) = serde_json::from_str::<ClientMessage>(&text)
        .map_err(|e| RealtimeError::ProtocolError(format!("Invalid Hello: {}", e)))?;

    validate_item_id(&hello.user_id)
        .and_then(|_| validate_item_id(&hello.connection_id))
        .map_err(|e| RealtimeError::ProtocolError(e.to_string()))?;

    Ok(hello)
}

async fn send_welcome(
    sender: &mut SplitSink<WebSocket, Message>,
    connection_id: &str,
) -> RealtimeResult<()> {
    let welcome = Notification::new(
        WELCOME_TYPE,
        &WelcomeData {
            connection_id: connection_id.to_string(),
            server_time: Utc::now().timestamp_millis(),
        },
    )?;

    sender
        .send(Message::Text(welcome.to_json()?.into()))
        .await
        .map_err(|e| RealtimeError::TransportError(format!("Send error: {}", e)))
}
