//! # Connection Registry
//!
//! Which connections are live, and whose they are.
//!
//! ## Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  hub sockets ──register/unregister──►  RwLock<HashMap<(user, conn),     │
//! │                                                      entry>>            │
//! │                 (brief write lock)               │                      │
//! │                                                  │ brief read lock      │
//! │                                                  ▼                      │
//! │  fan-out / heartbeat  ◄──────────  cloned snapshot (Vec<entry>)         │
//! │                                                                         │
//! │  No lock is held while sending. A connection that drops after the     │
//! │  snapshot is taken is caught by the fan-out's liveness re-check.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are keyed by the pair (user id, connection id). Connection ids
//! come from clients, so two users picking the same id stay separate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::connection::Connection;

// =============================================================================
// Registered Connection
// =============================================================================

/// A connection plus the identity it was registered under.
#[derive(Clone)]
pub struct RegisteredConnection {
    /// Owning user.
    pub user_id: String,
    /// Per-session identity, used for origin exclusion.
    pub connection_id: String,
    /// The transport.
    pub connection: Arc<dyn Connection>,
    /// When the connection registered.
    pub connected_at: DateTime<Utc>,
}

impl RegisteredConnection {
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}

impl std::fmt::Debug for RegisteredConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredConnection")
            .field("user_id", &self.user_id)
            .field("connection_id", &self.connection_id)
            .field("connected", &self.is_connected())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Registry key: (user id, connection id).
type ConnectionKey = (String, String);

fn key(user_id: &str, connection_id: &str) -> ConnectionKey {
    (user_id.to_string(), connection_id.to_string())
}

/// Process-wide set of live connections keyed by user and connection id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionKey, RegisteredConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection.
    ///
    /// ## Returns
    /// The entry this user previously registered under `connection_id`, if
    /// any. A client reconnecting with the same session id replaces its old
    /// entry; other users' entries are never touched.
    pub async fn register(
        &self,
        connection: Arc<dyn Connection>,
        user_id: &str,
        connection_id: &str,
    ) -> Option<RegisteredConnection> {
        let entry = RegisteredConnection {
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
            connection,
            connected_at: Utc::now(),
        };

        let replaced = self
            .connections
            .write()
            .await
            .insert(key(user_id, connection_id), entry);

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            replaced = replaced.is_some(),
            "Connection registered"
        );
        replaced
    }

    /// Removes the user's entry for `connection_id`.
    pub async fn unregister(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Option<RegisteredConnection> {
        let removed = self
            .connections
            .write()
            .await
            .remove(&key(user_id, connection_id));
        if removed.is_some() {
            info!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Connection unregistered"
            );
        }
        removed
    }

    /// Removes the user's entry for `connection_id` only if it still holds
    /// `connection`.
    ///
    /// A socket closing after its session id was taken over by a newer
    /// socket must not evict the newer one.
    pub async fn unregister_exact(
        &self,
        user_id: &str,
        connection_id: &str,
        connection: &Arc<dyn Connection>,
    ) -> bool {
        let key = key(user_id, connection_id);
        let mut connections = self.connections.write().await;
        let same = connections.get(&key).is_some_and(|entry| {
            std::ptr::addr_eq(Arc::as_ptr(&entry.connection), Arc::as_ptr(connection))
        });

        if same {
            connections.remove(&key);
            info!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Connection unregistered"
            );
        } else {
            debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Stale unregister ignored"
            );
        }
        same
    }

    /// Snapshot of the user's live connections.
    pub async fn list_for_user(&self, user_id: &str) -> Vec<RegisteredConnection> {
        self.connections
            .read()
            .await
            .values()
            .filter(|entry| entry.user_id == user_id && entry.is_connected())
            .cloned()
            .collect()
    }

    /// Snapshot of every live connection.
    pub async fn list_all(&self) -> Vec<RegisteredConnection> {
        self.connections
            .read()
            .await
            .values()
            .filter(|entry| entry.is_connected())
            .cloned()
            .collect()
    }

    /// Registered connections, live or not.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Distinct users with at least one registered connection.
    pub async fn user_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .map(|entry| entry.user_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;

    fn live(capacity: usize) -> (Arc<dyn Connection>, tokio::sync::mpsc::Receiver<String>) {
        let (conn, rx) = ChannelConnection::pair(capacity);
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = live(1);
        let (b, _rx_b) = live(1);
        let (c, _rx_c) = live(1);

        registry.register(a, "u1", "a").await;
        registry.register(b, "u1", "b").await;
        registry.register(c, "u2", "c").await;

        assert_eq!(registry.len().await, 3);
        assert_eq!(registry.user_count().await, 2);
        assert_eq!(registry.list_for_user("u1").await.len(), 2);
        assert_eq!(registry.list_for_user("nobody").await.len(), 0);
        assert_eq!(registry.list_all().await.len(), 3);

        assert!(registry.unregister("u1", "a").await.is_some());
        assert!(registry.unregister("u1", "a").await.is_none());
        assert_eq!(registry.list_for_user("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_connections_are_not_listed() {
        let registry = ConnectionRegistry::new();
        let (a, rx_a) = live(1);
        registry.register(a, "u1", "a").await;
        drop(rx_a);

        assert!(registry.list_for_user("u1").await.is_empty());
        assert!(registry.list_all().await.is_empty());
        // Still registered until the hub unregisters it
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_replacement() {
        let registry = ConnectionRegistry::new();
        let (old, _rx_old) = live(1);
        let (new, _rx_new) = live(1);

        registry.register(old.clone(), "u1", "session").await;
        assert!(registry.register(new.clone(), "u1", "session").await.is_some());

        assert!(!registry.unregister_exact("u1", "session", &old).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.unregister_exact("u1", "session", &new).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_connection_id_under_two_users_stays_separate() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx_alice) = live(1);
        let (bob, _rx_bob) = live(1);

        assert!(registry.register(alice.clone(), "alice", "s1").await.is_none());
        assert!(registry.register(bob.clone(), "bob", "s1").await.is_none());

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.list_for_user("alice").await.len(), 1);
        assert_eq!(registry.list_for_user("bob").await.len(), 1);

        // Bob leaving does not take Alice's entry with it
        assert!(!registry.unregister_exact("bob", "s1", &alice).await);
        assert!(registry.unregister_exact("bob", "s1", &bob).await);
        assert!(registry.unregister("bob", "s1").await.is_none());
        let remaining = registry.list_for_user("alice").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].connection_id, "s1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_unregister() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();

        for i in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (conn, rx) = live(1);
                let id = format!("c{i}");
                registry.register(conn, &format!("u{}", i % 4), &id).await;
                let _ = registry.list_all().await;
                if i % 2 == 0 {
                    registry.unregister(&format!("u{}", i % 4), &id).await;
                }
                rx
            }));
        }

        let mut receivers = Vec::new();
        for task in tasks {
            receivers.push(task.await.unwrap());
        }

        assert_eq!(registry.len().await, 32);
        assert_eq!(registry.list_all().await.len(), 32);
        assert_eq!(registry.user_count().await, 2);
    }
}
