//! # Live Connections
//!
//! What the fan-out needs from a transport: a liveness check and a send.
//!
//! The hub wraps every WebSocket in a [`ChannelConnection`]; the socket's
//! writer task drains the channel. Once that task stops, the receiver is
//! dropped and the connection reports itself as no longer connected.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{RealtimeError, RealtimeResult};

/// A live client connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the transport can still accept payloads.
    fn is_connected(&self) -> bool;

    /// Delivers one payload.
    ///
    /// May wait while the peer is slow; callers bound it with a timeout.
    async fn send(&self, payload: &str) -> RealtimeResult<()>;
}

/// Connection backed by a bounded channel to a writer task.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<String>,
}

impl ChannelConnection {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        ChannelConnection { tx }
    }

    /// Creates a connection and the receiver its writer should drain.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelConnection { tx }, rx)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&self, payload: &str) -> RealtimeResult<()> {
        self.tx
            .send(payload.to_string())
            .await
            .map_err(|_| RealtimeError::Disconnected)
    }
}
