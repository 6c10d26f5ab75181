//! # Error Types
//!
//! Domain-specific error types for notesync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  notesync-core errors (this file)                                      │
//! │  ├── CoreError        - Payload encoding and catalogue errors          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  notesync-db errors (separate crate)                                   │
//! │  └── DbError          - Storage and commit failures                    │
//! │                                                                         │
//! │  sync-server errors (in app)                                           │
//! │  └── ServerError      - What the request layer sees                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServerError → client response     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A collection name does not map to any synchronizable entity kind.
    ///
    /// ## When This Occurs
    /// - A client sends a collection this server version does not know
    /// - A stored row references a renamed collection
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A notification payload could not be encoded.
    #[error("Failed to encode notification: {0}")]
    Encode(String),

    /// A notification payload could not be decoded.
    ///
    /// ## When This Occurs
    /// - `data` is not a string (older clients sent a nested object)
    /// - `data` is a string but not valid JSON for the requested type
    #[error("Failed to decode notification: {0}")]
    Decode(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Decode(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a sync request does not meet requirements.
/// Used for early validation before anything is enqueued for commit.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Batch exceeds the maximum number of items.
    #[error("batch must contain at most {max} items, got {actual}")]
    BatchTooLarge { max: usize, actual: usize },

    /// The same item appears more than once in a batch.
    #[error("duplicate item {collection}/{id} in batch")]
    Duplicate { collection: String, id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "id".to_string(),
        };
        assert_eq!(err.to_string(), "id is required");

        let err = ValidationError::BatchTooLarge { max: 10, actual: 12 };
        assert_eq!(err.to_string(), "batch must contain at most 10 items, got 12");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
