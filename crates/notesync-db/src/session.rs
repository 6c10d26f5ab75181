//! # Transactional Session
//!
//! One atomicity boundary against SQLite, owned by whoever opened it.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Session Lifecycle                                  │
//! │                                                                         │
//! │  Database::open_session() ──► BEGIN                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  execute(cmd, cancel) ×N  ──► each command runs on the same connection │
//! │       │                       cancel fires? → Err(Cancelled)           │
//! │       │                                                                 │
//! │       ├── commit()  ──► COMMIT    (session finished)                   │
//! │       ├── abort()   ──► ROLLBACK  (session finished)                   │
//! │       └── dispose() / drop ──► ROLLBACK if still open                  │
//! │                                                                         │
//! │  The transaction handle is taken out exactly once, so it is released  │
//! │  exactly once no matter which path ends the session.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::unit_of_work::PendingCommand;

/// An open transaction.
pub struct Session {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl Session {
    /// Begins a transaction on a pooled connection.
    pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let tx = pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(format!("begin: {e}")))?;
        debug!("Session opened");
        Ok(Session { tx: Some(tx) })
    }

    /// True until the session is committed, aborted or disposed.
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Runs one command inside the transaction.
    ///
    /// The command races the cancellation token; if the token wins the
    /// command's future is dropped and `DbError::Cancelled` is returned.
    /// The transaction stays open so the caller can abort it.
    ///
    /// ## Returns
    /// Rows the command reported as changed.
    pub async fn execute(
        &mut self,
        command: PendingCommand,
        cancel: &CancellationToken,
    ) -> DbResult<u64> {
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| DbError::TransactionFailed("session already finished".to_string()))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DbError::Cancelled),
            result = command.run(&mut **tx) => result,
        }
    }

    /// Commits the transaction.
    pub async fn commit(&mut self) -> DbResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::TransactionFailed("session already finished".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(format!("commit: {e}")))?;
        debug!("Session committed");
        Ok(())
    }

    /// Rolls the transaction back. A finished session is left alone.
    pub async fn abort(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .map_err(|e| DbError::TransactionFailed(format!("rollback: {e}")))?;
            debug!("Session aborted");
        }
        Ok(())
    }

    /// Releases the session, rolling back anything uncommitted.
    pub async fn dispose(mut self) {
        if let Err(e) = self.abort().await {
            warn!(error = %e, "Rollback during dispose failed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // sqlx rolls an unfinished transaction back when its handle drops
        if self.tx.is_some() {
            debug!("Session dropped while open; rolling back");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .finish()
    }
}
