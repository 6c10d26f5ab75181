//! # Unit of Work
//!
//! Deferred writes that commit together or not at all.
//!
//! ## How a Push Commits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Command Queue → Commit                             │
//! │                                                                         │
//! │  Request handling (no I/O yet)                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  notes.upsert(..)     ──► queue: [#0 notes]                     │   │
//! │  │  content.upsert(..)   ──► queue: [#0 notes, #1 content]         │   │
//! │  │  relations.upsert(..) ──► queue: [#0, #1, #2 relations]         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼  UnitOfWork::commit()   (queue sealed)                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  BEGIN                                                          │   │
//! │  │  #0 ──► 1 row     changed                                       │   │
//! │  │  #1 ──► 0 rows    (identical upsert)                            │   │
//! │  │  #2 ──► 1 row     changed                                       │   │
//! │  │  COMMIT                                                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CommitSummary { commands: 3, changed_commands: 2, rows_affected: 2 } │
//! │                                                                         │
//! │  Any command fails  ──► ROLLBACK, Err(CommandFailed { index, .. })     │
//! │  Token cancelled    ──► ROLLBACK, Err(Cancelled)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One unit of work serves one request. It commits at most once; after the
//! first `commit` the queue is sealed and later enqueues or commits fail with
//! [`DbError::UnitOfWorkClosed`]. The coordinator never retries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use sqlx::SqliteConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

// =============================================================================
// Pending Command
// =============================================================================

type CommandOp =
    Box<dyn for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<u64>> + Send>;

/// A deferred write bound to one collection.
///
/// The operation runs against the session's connection and reports how
/// many rows it changed.
pub struct PendingCommand {
    collection: &'static str,
    op: CommandOp,
}

impl PendingCommand {
    /// Wraps an operation.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let cmd = PendingCommand::new("notes", move |conn| {
    ///     Box::pin(async move {
    ///         let done = sqlx::query("DELETE FROM notes WHERE user_id = ?1")
    ///             .bind(user_id)
    ///             .execute(&mut *conn)
    ///             .await?;
    ///         Ok(done.rows_affected())
    ///     })
    /// });
    /// ```
    pub fn new<F>(collection: &'static str, op: F) -> Self
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<u64>>
            + Send
            + 'static,
    {
        PendingCommand {
            collection,
            op: Box::new(op),
        }
    }

    /// Collection this command writes to.
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub(crate) fn run(self, conn: &mut SqliteConnection) -> BoxFuture<'_, DbResult<u64>> {
        (self.op)(conn)
    }
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Command Queue
// =============================================================================

#[derive(Default)]
struct QueueState {
    commands: Vec<PendingCommand>,
    sealed: bool,
}

/// Ordered list of pending commands shared by one request's repositories.
///
/// Cloning shares the same queue.
#[derive(Clone, Default)]
pub struct CommandQueue {
    state: Arc<Mutex<QueueState>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the Vec half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an operation. Pure enqueue, no I/O.
    pub fn add_command<F>(&self, collection: &'static str, op: F) -> DbResult<()>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<u64>>
            + Send
            + 'static,
    {
        self.push(PendingCommand::new(collection, op))
    }

    /// Appends an already-built command.
    pub fn push(&self, command: PendingCommand) -> DbResult<()> {
        let mut state = self.lock();
        if state.sealed {
            warn!(
                collection = command.collection,
                "Enqueue after commit rejected"
            );
            return Err(DbError::UnitOfWorkClosed);
        }
        state.commands.push(command);
        Ok(())
    }

    /// Number of commands waiting for commit.
    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a commit has taken the commands.
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Seals the queue and hands out its commands, once.
    fn seal(&self) -> DbResult<Vec<PendingCommand>> {
        let mut state = self.lock();
        if state.sealed {
            return Err(DbError::UnitOfWorkClosed);
        }
        state.sealed = true;
        Ok(std::mem::take(&mut state.commands))
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CommandQueue")
            .field("pending", &state.commands.len())
            .field("sealed", &state.sealed)
            .finish()
    }
}

// =============================================================================
// Commit Coordinator
// =============================================================================

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Commands executed.
    pub commands: usize,

    /// Commands that changed at least one row.
    pub changed_commands: usize,

    /// Total rows changed.
    pub rows_affected: u64,
}

impl CommitSummary {
    /// True if any command changed anything.
    pub fn has_changes(&self) -> bool {
        self.changed_commands > 0
    }
}

/// Runs a [`CommandQueue`] inside one session.
///
/// The session only exists for the duration of `commit`; every exit path
/// either commits it or rolls it back. Dropping a unit of work that was
/// never committed discards its commands without touching storage.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    db: Database,
    queue: CommandQueue,
}

impl UnitOfWork {
    /// Creates a unit of work with an empty queue.
    pub fn new(db: &Database) -> Self {
        UnitOfWork {
            db: db.clone(),
            queue: CommandQueue::new(),
        }
    }

    /// The queue repositories enqueue into.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Commands waiting for commit.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Commits without an external cancellation signal.
    pub async fn commit(&self) -> DbResult<CommitSummary> {
        self.commit_with_cancel(&CancellationToken::new()).await
    }

    /// Executes every queued command in order inside one transaction.
    ///
    /// ## Returns
    /// * `Ok(CommitSummary)` - all commands ran and the transaction committed
    /// * `Err(CommandFailed)` - a command failed; nothing was persisted
    /// * `Err(TransactionFailed)` - begin or commit failed; nothing was persisted
    /// * `Err(Cancelled)` - `cancel` fired first; nothing was persisted
    /// * `Err(UnitOfWorkClosed)` - this unit of work already committed
    pub async fn commit_with_cancel(&self, cancel: &CancellationToken) -> DbResult<CommitSummary> {
        let commands = self.queue.seal()?;
        let total = commands.len();

        if cancel.is_cancelled() {
            info!(commands = total, "Commit cancelled before start");
            return Err(DbError::Cancelled);
        }

        if commands.is_empty() {
            debug!("Nothing to commit");
            return Ok(CommitSummary::default());
        }

        let mut session = self.db.open_session().await?;
        let mut summary = CommitSummary {
            commands: total,
            ..CommitSummary::default()
        };

        for (index, command) in commands.into_iter().enumerate() {
            let collection = command.collection();

            match session.execute(command, cancel).await {
                Ok(rows) => {
                    summary.rows_affected += rows;
                    if rows > 0 {
                        summary.changed_commands += 1;
                    }
                }
                Err(DbError::Cancelled) => {
                    info!(index, collection, "Commit cancelled; rolling back");
                    session.dispose().await;
                    return Err(DbError::Cancelled);
                }
                Err(e) => {
                    warn!(index, collection, error = %e, "Command failed; rolling back");
                    session.dispose().await;
                    return Err(DbError::command_failed(index, collection, &e));
                }
            }
        }

        if cancel.is_cancelled() {
            info!("Commit cancelled before COMMIT; rolling back");
            session.dispose().await;
            return Err(DbError::Cancelled);
        }

        session.commit().await?;

        debug!(
            commands = summary.commands,
            changed = summary.changed_commands,
            rows = summary.rows_affected,
            "Unit of work committed"
        );
        Ok(summary)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn insert_note(uow: &UnitOfWork, id: &'static str) {
        uow.queue()
            .add_command("notes", move |conn| {
                Box::pin(async move {
                    let done = sqlx::query(
                        "INSERT INTO notes (user_id, id, payload, date_modified, date_synced, deleted) \
                         VALUES ('u1', ?1, '{}', 1, 1, 0)",
                    )
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
                    Ok(done.rows_affected())
                })
            })
            .unwrap();
    }

    async fn note_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_commit_counts_changes() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        insert_note(&uow, "a");
        insert_note(&uow, "b");
        insert_note(&uow, "c");
        assert_eq!(uow.pending(), 3);

        let summary = uow.commit().await.unwrap();
        assert_eq!(summary.commands, 3);
        assert_eq!(summary.changed_commands, 3);
        assert!(summary.has_changes());
        assert_eq!(note_count(&db).await, 3);
    }

    #[tokio::test]
    async fn test_second_commit_rejected() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        insert_note(&uow, "a");
        uow.commit().await.unwrap();

        assert!(matches!(uow.commit().await, Err(DbError::UnitOfWorkClosed)));

        let late = uow.queue().add_command("notes", |_conn| Box::pin(async { Ok(1) }));
        assert!(matches!(late, Err(DbError::UnitOfWorkClosed)));
        assert_eq!(note_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_empty_commit_has_no_changes() {
        let db = test_db().await;
        let summary = UnitOfWork::new(&db).commit().await.unwrap();
        assert_eq!(summary, CommitSummary::default());
        assert!(!summary.has_changes());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_earlier_commands() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        insert_note(&uow, "a");
        // Same primary key again: violates PRIMARY KEY(user_id, id)
        insert_note(&uow, "a");

        let err = uow.commit().await.unwrap_err();
        assert!(err.is_commit_failure());
        assert!(matches!(err, DbError::CommandFailed { index: 1, .. }));
        assert_eq!(note_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_commands_see_earlier_effects() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        insert_note(&uow, "a");
        uow.queue()
            .add_command("notes", |conn| {
                Box::pin(async move {
                    let seen: i64 =
                        sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE id = 'a'")
                            .fetch_one(&mut *conn)
                            .await?;
                    if seen == 1 {
                        Ok(0)
                    } else {
                        Err(DbError::not_found("note", "a"))
                    }
                })
            })
            .unwrap();

        let summary = uow.commit().await.unwrap();
        assert_eq!(summary.commands, 2);
        assert_eq!(summary.changed_commands, 1);
    }

    #[tokio::test]
    async fn test_cancelled_commit_persists_nothing() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        insert_note(&uow, "a");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = uow.commit_with_cancel(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_commit_failure());
        assert_eq!(note_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_command() {
        let db = test_db().await;
        let uow = UnitOfWork::new(&db);
        insert_note(&uow, "a");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        uow.queue()
            .add_command("notes", move |_conn| {
                Box::pin(async move {
                    trigger.cancel();
                    // Never finishes on its own; only cancellation ends it
                    std::future::pending::<()>().await;
                    Ok(1)
                })
            })
            .unwrap();

        let err = uow.commit_with_cancel(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(note_count(&db).await, 0);
    }
}
