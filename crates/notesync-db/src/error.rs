//! # Database Error Types
//!
//! Error types for storage and commit operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── commit failed  (CommandFailed, TransactionFailed)            │
//! │       ├── cancelled      (Cancelled)                                   │
//! │       └── misuse         (UnitOfWorkClosed, KindMismatch)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ServerError (in sync-server) ← Failed sync response                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use notesync_core::EntityKind;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// CHECK or NOT NULL constraint violation.
    ///
    /// ## When This Occurs
    /// - An item id is empty
    /// - A required column is NULL
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The session could not begin or commit.
    ///
    /// ## When This Occurs
    /// - No connection available to begin a transaction
    /// - `COMMIT` rejected (busy database, I/O error)
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A queued command failed; the whole unit of work was rolled back.
    ///
    /// `index` is the command's position in enqueue order.
    #[error("Command {index} on {collection} failed: {reason}")]
    CommandFailed {
        index: usize,
        collection: String,
        reason: String,
    },

    /// The commit was cancelled and the session rolled back.
    #[error("Commit cancelled")]
    Cancelled,

    /// The unit of work was already committed.
    ///
    /// ## When This Occurs
    /// - `commit()` called twice on one unit of work
    /// - A repository enqueues after its unit of work committed
    ///
    /// This is a programming error in the caller.
    #[error("Unit of work already committed")]
    UnitOfWorkClosed,

    /// An item was handed to the repository of a different kind.
    #[error("Item of kind {actual} passed to {expected} repository")]
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Wraps the failure of the command at `index`.
    pub fn command_failed(index: usize, collection: impl Into<String>, source: &DbError) -> Self {
        DbError::CommandFailed {
            index,
            collection: collection.into(),
            reason: source.to_string(),
        }
    }

    /// True when a commit failed on storage (not cancelled, not misuse).
    pub fn is_commit_failure(&self) -> bool {
        matches!(
            self,
            DbError::CommandFailed { .. } | DbError::TransactionFailed(_)
        )
    }

    /// True when the commit was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DbError::Cancelled)
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite reports constraint failures in the message:
                // "UNIQUE constraint failed: <table>.<column>"
                // "CHECK constraint failed: <expr>"
                // "FOREIGN KEY constraint failed"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed")
                    || msg.contains("NOT NULL constraint failed")
                {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_failure_classification() {
        let failed = DbError::command_failed(
            2,
            "content",
            &DbError::ConstraintViolation {
                message: "CHECK constraint failed".to_string(),
            },
        );
        assert!(failed.is_commit_failure());
        assert!(!failed.is_cancelled());
        assert!(failed.to_string().starts_with("Command 2 on content failed"));

        assert!(DbError::Cancelled.is_cancelled());
        assert!(!DbError::Cancelled.is_commit_failure());
        assert!(!DbError::UnitOfWorkClosed.is_commit_failure());
    }
}
