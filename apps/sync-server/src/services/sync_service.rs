//! # Sync Service
//!
//! Push and fetch for client devices.
//!
//! ## Push Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  push(user U, connection A, items)                                      │
//! │                                                                         │
//! │  1. validate_batch(items)            reject before anything is queued   │
//! │  2. accessor = db.repositories()     one unit of work for this request  │
//! │  3. accessor.repository(kind).upsert(item)   for each item, in order    │
//! │  4. accessor.commit_with_cancel()    all items or none                  │
//! │        │                                                                │
//! │        ├── Err ──────────► ServerError, nobody notified                 │
//! │        │                                                                │
//! │        └── Ok(summary)                                                  │
//! │              │ summary.has_changes()                                    │
//! │              ▼                                                          │
//! │  5. fanout.send_to_user(triggerSync, U, exclude = A)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use notesync_core::validation::validate_batch;
use notesync_core::{EntityKind, Notification, StoredItem, SyncItem};
use notesync_db::Database;
use notesync_realtime::FanOut;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::metrics::SyncMetrics;

/// Reason attached to the notification sent after a push.
pub const PUSH_REASON: &str = "push";

// =============================================================================
// Requests & Responses
// =============================================================================

/// Sync protocol generation the client speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub user_id: String,
    /// Connection that produced the change; it is not notified.
    pub connection_id: Option<String>,
    pub items: Vec<SyncItem>,
    #[serde(default)]
    pub protocol: ProtocolVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Items in the request.
    pub accepted: usize,
    /// Items whose write changed stored state.
    pub changed: usize,
    /// Other connections that received a sync trigger.
    pub notified: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub user_id: String,
    /// Exclusive `date_synced` cursor; 0 fetches everything.
    #[serde(default)]
    pub since: i64,
    #[serde(default)]
    pub protocol: ProtocolVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub items: Vec<StoredItem>,
    /// Cursor for the next fetch.
    pub cursor: i64,
    /// More items are waiting past `cursor`.
    pub has_more: bool,
}

// =============================================================================
// Service
// =============================================================================

/// Sync operations over storage and live connections.
#[derive(Debug, Clone)]
pub struct SyncService {
    db: Database,
    fanout: Arc<FanOut>,
    metrics: SyncMetrics,
    fetch_limit: u32,
}

impl SyncService {
    pub fn new(
        db: Database,
        fanout: Arc<FanOut>,
        metrics: SyncMetrics,
        fetch_limit: u32,
    ) -> Self {
        SyncService {
            db,
            fanout,
            metrics,
            fetch_limit,
        }
    }

    /// Stores a batch of items atomically, then tells the user's other
    /// connections to pull.
    ///
    /// ## Errors
    /// - `InvalidRequest` when the batch fails validation (nothing queued)
    /// - `CommitFailed` when any write fails (nothing stored)
    /// - `Cancelled` when `cancel` fires before the commit completes
    ///
    /// No notification is sent on any error, or when nothing changed.
    #[instrument(
        skip(self, request, cancel),
        fields(
            request_id = %Uuid::new_v4(),
            user_id = %request.user_id,
            items = request.items.len(),
            protocol = ?request.protocol,
        )
    )]
    pub async fn push(
        &self,
        request: PushRequest,
        cancel: &CancellationToken,
    ) -> ServerResult<PushResponse> {
        let started = Instant::now();
        let protocol = request.protocol;
        match protocol {
            ProtocolVersion::V1 => self.metrics.record_push(),
            ProtocolVersion::V2 => self.metrics.record_push_v2(),
        }

        let result = self.push_inner(request, cancel).await;

        if protocol == ProtocolVersion::V2 {
            self.metrics
                .record_push_duration(started.elapsed().as_secs_f64() * 1000.0);
        }
        result
    }

    async fn push_inner(
        &self,
        request: PushRequest,
        cancel: &CancellationToken,
    ) -> ServerResult<PushResponse> {
        let PushRequest {
            user_id,
            connection_id,
            items,
            ..
        } = request;

        validate_batch(&items)?;
        let accepted = items.len();

        let accessor = self.db.repositories();
        for item in items {
            accessor.repository(item.kind).upsert(&user_id, item)?;
        }

        let summary = match accessor.commit_with_cancel(cancel).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Push not committed");
                return Err(e.into());
            }
        };

        let mut notified = 0;
        if summary.has_changes() {
            let payload = Notification::trigger_sync(PUSH_REASON)?.to_json()?;
            let report = self
                .fanout
                .send_to_user_cancellable(&payload, &user_id, connection_id.as_deref(), cancel)
                .await;
            notified = report.delivered;
        } else {
            debug!("Push changed nothing, skipping notification");
        }

        info!(
            accepted,
            changed = summary.changed_commands,
            notified,
            "Push committed"
        );

        Ok(PushResponse {
            accepted,
            changed: summary.changed_commands,
            notified,
        })
    }

    /// Every item of every collection written after `since`.
    ///
    /// At most `fetch_limit` items per collection are read. When a
    /// collection fills its page, the response ends at that page's last
    /// `date_synced` and sets `has_more`. Stamps are unique per row, so the
    /// next fetch from `cursor` resumes without skipping anything.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, since = request.since))]
    pub async fn fetch(&self, request: FetchRequest) -> ServerResult<FetchResponse> {
        let started = Instant::now();
        match request.protocol {
            ProtocolVersion::V1 => self.metrics.record_fetch(),
            ProtocolVersion::V2 => self.metrics.record_fetch_v2(),
        }

        let result = self.fetch_inner(&request).await;

        if request.protocol == ProtocolVersion::V2 {
            self.metrics
                .record_fetch_duration(started.elapsed().as_secs_f64() * 1000.0);
        }
        result
    }

    async fn fetch_inner(&self, request: &FetchRequest) -> ServerResult<FetchResponse> {
        let accessor = self.db.repositories();
        let mut items: Vec<StoredItem> = Vec::new();
        // Items stamped after this wait for the next fetch
        let mut page_end: Option<i64> = None;

        for kind in EntityKind::ALL {
            let batch = accessor
                .repository(kind)
                .find_since(&request.user_id, request.since, self.fetch_limit)
                .await?;

            if batch.len() as u32 >= self.fetch_limit {
                if let Some(last) = batch.last() {
                    let end = last.date_synced;
                    page_end = Some(page_end.map_or(end, |current| current.min(end)));
                }
            }
            items.extend(batch);
        }

        if let Some(end) = page_end {
            items.retain(|item| item.date_synced <= end);
        }
        items.sort_by(|a, b| {
            a.date_synced
                .cmp(&b.date_synced)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        let cursor = items
            .iter()
            .map(|item| item.date_synced)
            .max()
            .unwrap_or(request.since);

        let has_more = page_end.is_some();
        debug!(items = items.len(), cursor, has_more, "Fetch complete");

        Ok(FetchResponse {
            items,
            cursor,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_db::DbConfig;
    use notesync_realtime::{ChannelConnection, ConnectionRegistry};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        service: SyncService,
        registry: Arc<ConnectionRegistry>,
        db: Database,
    }

    async fn harness(fetch_limit: u32) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = Arc::new(ConnectionRegistry::new());
        let fanout = Arc::new(FanOut::new(registry.clone(), Duration::from_secs(1)));
        Harness {
            service: SyncService::new(db.clone(), fanout, SyncMetrics::new(), fetch_limit),
            registry,
            db,
        }
    }

    async fn connect(
        registry: &ConnectionRegistry,
        user: &str,
        id: &str,
    ) -> mpsc::Receiver<String> {
        let (conn, rx) = ChannelConnection::pair(8);
        registry.register(Arc::new(conn), user, id).await;
        rx
    }

    fn push(user: &str, origin: &str, items: Vec<SyncItem>) -> PushRequest {
        PushRequest {
            user_id: user.to_string(),
            connection_id: Some(origin.to_string()),
            items,
            protocol: ProtocolVersion::V2,
        }
    }

    fn note(id: &str, payload: &str) -> SyncItem {
        SyncItem::new(EntityKind::Note, id, payload, 1_700_000_000_000)
    }

    fn fetch(user: &str, since: i64, protocol: ProtocolVersion) -> FetchRequest {
        FetchRequest {
            user_id: user.to_string(),
            since,
            protocol,
        }
    }

    /// Pages from cursor 0 until `has_more` clears, returning ids in order.
    async fn fetch_all_pages(service: &SyncService, user: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let mut since = 0;
        loop {
            let page = service
                .fetch(fetch(user, since, ProtocolVersion::V2))
                .await
                .unwrap();
            assert!(page.cursor >= since);
            seen.extend(page.items.iter().map(|item| item.item.id.clone()));
            since = page.cursor;
            if !page.has_more {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_push_commits_then_notifies_other_devices() {
        let h = harness(100).await;
        let mut origin = connect(&h.registry, "u1", "phone").await;
        let mut other = connect(&h.registry, "u1", "laptop").await;

        let items = vec![
            note("n1", "{}"),
            SyncItem::new(EntityKind::Content, "c1", "{\"text\":\"hi\"}", 1),
        ];
        let response = h
            .service
            .push(push("u1", "phone", items), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            response,
            PushResponse {
                accepted: 2,
                changed: 2,
                notified: 1
            }
        );

        let raw = other.recv().await.unwrap();
        let msg = Notification::from_json(&raw).unwrap();
        assert_eq!(msg.kind, "triggerSync");
        assert!(origin.try_recv().is_err());

        let repos = h.db.repositories();
        assert!(repos.notes.find_by_id("u1", "n1").await.unwrap().is_some());
        assert!(repos.content.find_by_id("u1", "c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_push_stores_and_notifies_nothing() {
        let h = harness(100).await;
        let mut other = connect(&h.registry, "u1", "laptop").await;

        let err = h
            .service
            .push(
                push("u1", "phone", vec![note("n1", "{}"), note("bad id!", "{}")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::InvalidRequest(_)));
        assert!(other.try_recv().is_err());
        assert_eq!(h.db.repositories().notes.count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_push_stores_and_notifies_nothing() {
        let h = harness(100).await;
        let mut other = connect(&h.registry, "u1", "laptop").await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .service
            .push(push("u1", "phone", vec![note("n1", "{}")]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::Cancelled));
        assert!(other.try_recv().is_err());
        assert_eq!(h.db.repositories().notes.count("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unchanged_push_does_not_notify() {
        let h = harness(100).await;
        let cancel = CancellationToken::new();
        h.service
            .push(push("u1", "phone", vec![note("n1", "{}")]), &cancel)
            .await
            .unwrap();

        let mut other = connect(&h.registry, "u1", "laptop").await;
        let response = h
            .service
            .push(push("u1", "phone", vec![note("n1", "{}")]), &cancel)
            .await
            .unwrap();

        assert_eq!(response.changed, 0);
        assert_eq!(response.notified, 0);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fetch_returns_changes_since_cursor() {
        let h = harness(100).await;
        let cancel = CancellationToken::new();
        h.service
            .push(push("u1", "phone", vec![note("n1", "{}")]), &cancel)
            .await
            .unwrap();

        let first = h
            .service
            .fetch(fetch("u1", 0, ProtocolVersion::V1))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 1);
        assert!(!first.has_more);

        tokio::time::sleep(Duration::from_millis(5)).await;
        h.service
            .push(
                push("u1", "phone", vec![SyncItem::tombstone(EntityKind::Notebook, "b1", 2)]),
                &cancel,
            )
            .await
            .unwrap();

        let second = h
            .service
            .fetch(fetch("u1", first.cursor, ProtocolVersion::V2))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].item.kind, EntityKind::Notebook);
        assert!(second.items[0].item.deleted);

        let other_user = h
            .service
            .fetch(fetch("u2", 0, ProtocolVersion::V2))
            .await
            .unwrap();
        assert!(other_user.items.is_empty());
        assert_eq!(other_user.cursor, 0);
    }

    #[tokio::test]
    async fn test_fetch_pages_without_skipping() {
        let h = harness(2).await;
        let cancel = CancellationToken::new();
        for id in ["a", "b", "c"] {
            h.service
                .push(push("u1", "phone", vec![note(id, "{}")]), &cancel)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut seen = fetch_all_pages(&h.service, "u1").await;
        seen.sort();
        seen.dedup();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_one_push_larger_than_a_page_is_fetched_whole() {
        let h = harness(2).await;
        let mut items: Vec<SyncItem> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(|id| note(id, "{}"))
            .collect();
        items.push(SyncItem::new(EntityKind::Content, "c1", "{}", 1));
        items.push(SyncItem::new(EntityKind::Content, "c2", "{}", 1));
        items.push(SyncItem::new(EntityKind::Content, "c3", "{}", 1));

        h.service
            .push(push("u1", "phone", items), &CancellationToken::new())
            .await
            .unwrap();

        let seen = fetch_all_pages(&h.service, "u1").await;
        assert_eq!(seen, vec!["a", "b", "c", "d", "e", "c1", "c2", "c3"]);
    }
}
