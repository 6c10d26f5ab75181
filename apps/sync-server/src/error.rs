//! Error types for the sync server.

use notesync_core::{CoreError, ValidationError};
use notesync_db::DbError;

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Sync server errors.
///
/// A push that fails with any of these was not persisted and did not
/// notify anyone.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    /// The unit of work rolled back.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// The request was cancelled before its commit completed.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbError> for ServerError {
    fn from(err: DbError) -> Self {
        if err.is_cancelled() {
            ServerError::Cancelled
        } else if err.is_commit_failure() {
            ServerError::CommitFailed(err.to_string())
        } else {
            ServerError::Database(err.to_string())
        }
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ServerError::InvalidRequest(e),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl ServerError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServerError::CommitFailed(_) | ServerError::Cancelled | ServerError::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_mapping() {
        assert!(matches!(
            ServerError::from(DbError::Cancelled),
            ServerError::Cancelled
        ));
        assert!(matches!(
            ServerError::from(DbError::TransactionFailed("busy".into())),
            ServerError::CommitFailed(_)
        ));
        assert!(matches!(
            ServerError::from(DbError::PoolExhausted),
            ServerError::Database(_)
        ));
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = ServerError::from(ValidationError::Required {
            field: "id".into(),
        });
        assert!(!err.is_retryable());
        assert!(ServerError::Cancelled.is_retryable());
    }
}
