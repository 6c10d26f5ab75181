//! # Entity Repository
//!
//! One generic repository, instantiated once per entity kind.
//!
//! Writes never touch storage directly: they become [`PendingCommand`]s in
//! the shared [`CommandQueue`] and run when the unit of work commits. Reads
//! go straight to the pool and only see committed data.
//!
//! [`PendingCommand`]: crate::unit_of_work::PendingCommand

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use notesync_core::{Entity, EntityKind, StoredItem, SyncItem};

use crate::clock::SyncClock;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::unit_of_work::CommandQueue;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct ItemRow {
    id: String,
    payload: String,
    date_modified: i64,
    date_synced: i64,
    deleted: bool,
}

impl ItemRow {
    fn into_stored(self, kind: EntityKind) -> StoredItem {
        StoredItem {
            item: SyncItem {
                id: self.id,
                kind,
                payload: self.payload,
                date_modified: self.date_modified,
                deleted: self.deleted,
            },
            date_synced: self.date_synced,
        }
    }
}

// =============================================================================
// Typed Repository
// =============================================================================

/// Repository for the entity kind `E`.
pub struct Repository<E: Entity> {
    pool: SqlitePool,
    clock: SyncClock,
    queue: CommandQueue,
    _kind: PhantomData<E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Repository {
            pool: self.pool.clone(),
            clock: self.clock.clone(),
            queue: self.queue.clone(),
            _kind: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("kind", &E::KIND)
            .field("queue", &self.queue)
            .finish()
    }
}

impl<E: Entity> Repository<E> {
    /// Creates a repository that enqueues into `queue`.
    ///
    /// Pure wiring; no I/O.
    pub fn new(db: &Database, queue: CommandQueue) -> Self {
        Repository {
            pool: db.pool().clone(),
            clock: db.clock().clone(),
            queue,
            _kind: PhantomData,
        }
    }

    /// Entity kind this repository serves.
    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    /// Enqueues an insert-or-update of `item` for `user_id`.
    ///
    /// At commit time the command reports one changed row, or zero when the
    /// stored row already has the same payload, timestamp and tombstone flag.
    /// A changed row is stamped with the next [`SyncClock`] value, taken when
    /// the command runs; no two rows share a `date_synced`.
    ///
    /// ## Errors
    /// * `KindMismatch` - `item.kind` is not this repository's kind
    /// * `UnitOfWorkClosed` - the unit of work already committed
    pub fn upsert(&self, user_id: &str, item: SyncItem) -> DbResult<()> {
        if item.kind != E::KIND {
            return Err(DbError::KindMismatch {
                expected: E::KIND,
                actual: item.kind,
            });
        }

        let table = E::KIND.collection();
        let user_id = user_id.to_string();
        let clock = self.clock.clone();
        debug!(collection = table, id = %item.id, deleted = item.deleted, "Enqueue upsert");

        self.queue.add_command(table, move |conn| {
            Box::pin(async move {
                let sql = format!(
                    r#"
                    INSERT INTO {table} (user_id, id, payload, date_modified, date_synced, deleted)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT (user_id, id) DO UPDATE SET
                        payload = excluded.payload,
                        date_modified = excluded.date_modified,
                        date_synced = excluded.date_synced,
                        deleted = excluded.deleted
                    WHERE {table}.payload IS NOT excluded.payload
                       OR {table}.date_modified IS NOT excluded.date_modified
                       OR {table}.deleted IS NOT excluded.deleted
                    "#
                );

                let done = sqlx::query(&sql)
                    .bind(&user_id)
                    .bind(&item.id)
                    .bind(&item.payload)
                    .bind(item.date_modified)
                    .bind(clock.next_stamp())
                    .bind(item.deleted)
                    .execute(&mut *conn)
                    .await?;

                Ok(done.rows_affected())
            })
        })
    }

    /// Enqueues one upsert per item, in order.
    ///
    /// Items are checked before anything is enqueued, so a kind mismatch
    /// leaves the queue untouched.
    pub fn upsert_many(&self, user_id: &str, items: Vec<SyncItem>) -> DbResult<()> {
        if let Some(bad) = items.iter().find(|item| item.kind != E::KIND) {
            return Err(DbError::KindMismatch {
                expected: E::KIND,
                actual: bad.kind,
            });
        }

        items
            .into_iter()
            .try_for_each(|item| self.upsert(user_id, item))
    }

    /// Enqueues a tombstone for `id`.
    pub fn delete(&self, user_id: &str, id: &str, date_modified: i64) -> DbResult<()> {
        self.upsert(user_id, SyncItem::tombstone(E::KIND, id, date_modified))
    }

    /// Enqueues removal of every row owned by `user_id`.
    pub fn purge_user(&self, user_id: &str) -> DbResult<()> {
        let table = E::KIND.collection();
        let user_id = user_id.to_string();

        self.queue.add_command(table, move |conn| {
            Box::pin(async move {
                let sql = format!("DELETE FROM {table} WHERE user_id = ?1");
                let done = sqlx::query(&sql)
                    .bind(&user_id)
                    .execute(&mut *conn)
                    .await?;
                Ok(done.rows_affected())
            })
        })
    }

    /// Loads one committed item, tombstones included.
    pub async fn find_by_id(&self, user_id: &str, id: &str) -> DbResult<Option<StoredItem>> {
        let sql = format!(
            "SELECT id, payload, date_modified, date_synced, deleted \
             FROM {} WHERE user_id = ?1 AND id = ?2",
            E::KIND.collection()
        );

        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into_stored(E::KIND)))
    }

    /// Items written after the `since` cursor, oldest first.
    ///
    /// ## Arguments
    /// * `since` - exclusive lower bound on `date_synced` (unix ms); 0 for everything
    /// * `limit` - maximum items to return
    pub async fn find_since(
        &self,
        user_id: &str,
        since: i64,
        limit: u32,
    ) -> DbResult<Vec<StoredItem>> {
        let sql = format!(
            "SELECT id, payload, date_modified, date_synced, deleted \
             FROM {} WHERE user_id = ?1 AND date_synced > ?2 \
             ORDER BY date_synced ASC, id ASC LIMIT ?3",
            E::KIND.collection()
        );

        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(since)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.into_stored(E::KIND)).collect())
    }

    /// Live (non-deleted) items owned by `user_id`.
    pub async fn count(&self, user_id: &str) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE user_id = ?1 AND deleted = 0",
            E::KIND.collection()
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Runtime-Kind Access
// =============================================================================

/// Object-safe view of a repository, for routing items by runtime kind.
#[async_trait]
pub trait SyncRepository: Send + Sync {
    /// Entity kind this repository serves.
    fn kind(&self) -> EntityKind;

    /// See [`Repository::upsert`].
    fn upsert(&self, user_id: &str, item: SyncItem) -> DbResult<()>;

    /// See [`Repository::delete`].
    fn delete(&self, user_id: &str, id: &str, date_modified: i64) -> DbResult<()>;

    /// See [`Repository::purge_user`].
    fn purge_user(&self, user_id: &str) -> DbResult<()>;

    /// See [`Repository::find_by_id`].
    async fn find_by_id(&self, user_id: &str, id: &str) -> DbResult<Option<StoredItem>>;

    /// See [`Repository::find_since`].
    async fn find_since(
        &self,
        user_id: &str,
        since: i64,
        limit: u32,
    ) -> DbResult<Vec<StoredItem>>;

    /// See [`Repository::count`].
    async fn count(&self, user_id: &str) -> DbResult<i64>;
}

#[async_trait]
impl<E: Entity> SyncRepository for Repository<E> {
    fn kind(&self) -> EntityKind {
        E::KIND
    }

    fn upsert(&self, user_id: &str, item: SyncItem) -> DbResult<()> {
        Repository::upsert(self, user_id, item)
    }

    fn delete(&self, user_id: &str, id: &str, date_modified: i64) -> DbResult<()> {
        Repository::delete(self, user_id, id, date_modified)
    }

    fn purge_user(&self, user_id: &str) -> DbResult<()> {
        Repository::purge_user(self, user_id)
    }

    async fn find_by_id(&self, user_id: &str, id: &str) -> DbResult<Option<StoredItem>> {
        Repository::find_by_id(self, user_id, id).await
    }

    async fn find_since(
        &self,
        user_id: &str,
        since: i64,
        limit: u32,
    ) -> DbResult<Vec<StoredItem>> {
        Repository::find_since(self, user_id, since, limit).await
    }

    async fn count(&self, user_id: &str) -> DbResult<i64> {
        Repository::count(self, user_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::unit_of_work::UnitOfWork;
    use notesync_core::{Content, Note};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn notes(db: &Database, uow: &UnitOfWork) -> Repository<Note> {
        Repository::new(db, uow.queue().clone())
    }

    fn note(id: &str, payload: &str, modified: i64) -> SyncItem {
        SyncItem::new(EntityKind::Note, id, payload, modified)
    }

    #[tokio::test]
    async fn test_writes_are_deferred_until_commit() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        let repo = notes(&db, &uow);

        repo.upsert("u1", note("n1", "a", 1)).unwrap();
        assert_eq!(uow.pending(), 1);
        assert!(repo.find_by_id("u1", "n1").await.unwrap().is_none());

        uow.commit().await.unwrap();
        let stored = repo.find_by_id("u1", "n1").await.unwrap().unwrap();
        assert_eq!(stored.item.payload, "a");
        assert!(stored.date_synced > 0);
    }

    #[tokio::test]
    async fn test_identical_upsert_reports_no_change() {
        let db = test_db().await;

        let first = UnitOfWork::new(&db);
        notes(&db, &first).upsert("u1", note("n1", "a", 1)).unwrap();
        assert_eq!(first.commit().await.unwrap().changed_commands, 1);

        let same = UnitOfWork::new(&db);
        notes(&db, &same).upsert("u1", note("n1", "a", 1)).unwrap();
        let summary = same.commit().await.unwrap();
        assert_eq!(summary.commands, 1);
        assert!(!summary.has_changes());

        let edited = UnitOfWork::new(&db);
        notes(&db, &edited).upsert("u1", note("n1", "b", 2)).unwrap();
        assert!(edited.commit().await.unwrap().has_changes());
    }

    #[tokio::test]
    async fn test_delete_leaves_tombstone() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        let repo = notes(&db, &uow);
        repo.upsert("u1", note("n1", "a", 1)).unwrap();
        repo.upsert("u1", note("n2", "b", 1)).unwrap();
        repo.delete("u1", "n1", 2).unwrap();
        uow.commit().await.unwrap();

        assert_eq!(repo.count("u1").await.unwrap(), 1);
        let gone = repo.find_by_id("u1", "n1").await.unwrap().unwrap();
        assert!(gone.item.deleted);
        assert!(gone.item.payload.is_empty());
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        let repo = notes(&db, &uow);

        let content = SyncItem::new(EntityKind::Content, "c1", "x", 1);
        assert!(matches!(
            repo.upsert("u1", content.clone()),
            Err(DbError::KindMismatch { .. })
        ));
        assert!(matches!(
            repo.upsert_many("u1", vec![note("n1", "a", 1), content]),
            Err(DbError::KindMismatch { .. })
        ));
        assert_eq!(uow.pending(), 0);
    }

    #[tokio::test]
    async fn test_find_since_and_user_isolation() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        let repo = notes(&db, &uow);
        repo.upsert_many("u1", vec![note("a", "1", 1), note("b", "2", 1)])
            .unwrap();
        repo.upsert("u2", note("a", "other", 1)).unwrap();
        uow.commit().await.unwrap();

        let all = repo.find_since("u1", 0, 100).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| s.item.kind == EntityKind::Note));

        let cursor = all.iter().map(|s| s.date_synced).max().unwrap();
        assert!(repo.find_since("u1", cursor, 100).await.unwrap().is_empty());
        assert_eq!(repo.find_since("u1", 0, 1).await.unwrap().len(), 1);
        assert_eq!(repo.count("u2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_commit_stamps_rows_distinctly() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        let repo = notes(&db, &uow);
        let batch: Vec<SyncItem> = (0..50).map(|i| note(&format!("n{i}"), "x", 1)).collect();
        repo.upsert_many("u1", batch).unwrap();
        uow.commit().await.unwrap();

        let stored = repo.find_since("u1", 0, 100).await.unwrap();
        let mut stamps: Vec<i64> = stored.iter().map(|s| s.date_synced).collect();
        stamps.dedup();
        assert_eq!(stamps.len(), 50);
        // Queue order is stamp order
        assert_eq!(stored[0].item.id, "n0");
        assert_eq!(stored[49].item.id, "n49");
    }

    #[tokio::test]
    async fn test_purge_user() {
        let db = test_db().await;
        let setup = UnitOfWork::new(&db);
        let repo = notes(&db, &setup);
        repo.upsert("u1", note("a", "1", 1)).unwrap();
        repo.upsert("u2", note("a", "1", 1)).unwrap();
        setup.commit().await.unwrap();

        let purge = UnitOfWork::new(&db);
        notes(&db, &purge).purge_user("u1").unwrap();
        assert_eq!(purge.commit().await.unwrap().rows_affected, 1);

        assert_eq!(repo.count("u1").await.unwrap(), 0);
        assert_eq!(repo.count("u2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trait_object_routes_to_typed_repository() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        let content: Repository<Content> = Repository::new(&db, uow.queue().clone());
        let dynamic: &dyn SyncRepository = &content;

        assert_eq!(dynamic.kind(), EntityKind::Content);
        dynamic
            .upsert("u1", SyncItem::new(EntityKind::Content, "c1", "x", 1))
            .unwrap();
        uow.commit().await.unwrap();
        assert!(dynamic.find_by_id("u1", "c1").await.unwrap().is_some());
    }
}
