//! # Event Fan-out
//!
//! Delivers one payload to many live connections.
//!
//! ## Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      send_to_user(payload, U, exclude = A)             │
//! │                                                                         │
//! │  registry.list_for_user(U) ──► [A, B, C]     (snapshot, lock released) │
//! │       │                                                                 │
//! │       ├── A  excluded (origin of the change)                           │
//! │       │                                                                 │
//! │       ▼  concurrently, each bounded by send_timeout                    │
//! │  ┌──────────────┐   ┌──────────────┐                                   │
//! │  │ B.send()  ✓  │   │ C.send()  ✗  │  C failing does not affect B      │
//! │  └──────────────┘   └──────────────┘                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DeliveryReport { delivered: 1, failed: 1, skipped: 0 }               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is best effort and at most once. Failures are logged and
//! counted, never returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::{ConnectionRegistry, RegisteredConnection};

/// Outcome counts of one fan-out call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the payload was handed to.
    pub delivered: usize,
    /// Sends that errored or timed out.
    pub failed: usize,
    /// Connections that went away (or were cancelled) before the send.
    pub skipped: usize,
}

impl DeliveryReport {
    /// Connections the payload was addressed to.
    pub fn targets(&self) -> usize {
        self.delivered + self.failed + self.skipped
    }
}

enum Outcome {
    Delivered,
    Failed,
    Skipped,
}

/// Fan-out service over a [`ConnectionRegistry`].
#[derive(Debug, Clone)]
pub struct FanOut {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl FanOut {
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        FanOut {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Sends to every live connection of `user_id` except `exclude`.
    pub async fn send_to_user(
        &self,
        payload: &str,
        user_id: &str,
        exclude: Option<&str>,
    ) -> DeliveryReport {
        self.send_to_user_inner(payload, user_id, exclude, None).await
    }

    /// Like [`send_to_user`](Self::send_to_user), abandoning sends that are
    /// still pending when `cancel` fires.
    pub async fn send_to_user_cancellable(
        &self,
        payload: &str,
        user_id: &str,
        exclude: Option<&str>,
        cancel: &CancellationToken,
    ) -> DeliveryReport {
        self.send_to_user_inner(payload, user_id, exclude, Some(cancel))
            .await
    }

    /// Sends to every live connection of every user.
    pub async fn send_to_all(&self, payload: &str) -> DeliveryReport {
        let targets = self.registry.list_all().await;
        self.deliver(payload, targets, None).await
    }

    /// Like [`send_to_all`](Self::send_to_all), honoring `cancel`.
    pub async fn send_to_all_cancellable(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> DeliveryReport {
        let targets = self.registry.list_all().await;
        self.deliver(payload, targets, Some(cancel)).await
    }

    async fn send_to_user_inner(
        &self,
        payload: &str,
        user_id: &str,
        exclude: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> DeliveryReport {
        let targets: Vec<RegisteredConnection> = self
            .registry
            .list_for_user(user_id)
            .await
            .into_iter()
            .filter(|entry| exclude != Some(entry.connection_id.as_str()))
            .collect();

        let report = self.deliver(payload, targets, cancel).await;
        debug!(
            user_id = %user_id,
            excluded = ?exclude,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Fan-out to user"
        );
        report
    }

    async fn deliver(
        &self,
        payload: &str,
        targets: Vec<RegisteredConnection>,
        cancel: Option<&CancellationToken>,
    ) -> DeliveryReport {
        let sends = targets
            .iter()
            .map(|target| self.deliver_one(payload, target, cancel));

        let mut report = DeliveryReport::default();
        for outcome in join_all(sends).await {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }
        report
    }

    async fn deliver_one(
        &self,
        payload: &str,
        target: &RegisteredConnection,
        cancel: Option<&CancellationToken>,
    ) -> Outcome {
        // Liveness may have changed since the snapshot
        if !target.is_connected() {
            return Outcome::Skipped;
        }

        let send = tokio::time::timeout(self.send_timeout, target.connection.send(payload));
        let result = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Skipped,
                result = send => result,
            },
            None => send.await,
        };

        match result {
            Ok(Ok(())) => Outcome::Delivered,
            Ok(Err(e)) => {
                warn!(
                    user_id = %target.user_id,
                    connection_id = %target.connection_id,
                    error = %e,
                    "Delivery failed"
                );
                Outcome::Failed
            }
            Err(_) => {
                warn!(
                    user_id = %target.user_id,
                    connection_id = %target.connection_id,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Delivery timed out"
                );
                Outcome::Failed
            }
        }
    }
}
