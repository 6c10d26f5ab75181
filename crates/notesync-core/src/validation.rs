//! # Validation Module
//!
//! Input validation for items pushed by client devices.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Wire (serde)                                                 │
//! │  └── Shape: unknown kinds and missing fields fail to deserialize       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Id format and length                                              │
//! │  ├── Payload size cap                                                  │
//! │  └── Batch size, duplicate (kind, id) pairs                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── PRIMARY KEY (user_id, id) per collection                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A batch is rejected as a whole before anything is enqueued, so a bad
//! item never leaves half a push committed.
//!
//! ## Usage
//! ```rust
//! use notesync_core::validation::{validate_batch, validate_item_id};
//! use notesync_core::{EntityKind, SyncItem};
//!
//! validate_item_id("6523a7f8e1b2c3d4").unwrap();
//!
//! let items = vec![SyncItem::new(EntityKind::Note, "n1", "{}", 1)];
//! validate_batch(&items).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::{EntityKind, SyncItem};
use crate::{MAX_BATCH_SIZE, MAX_ID_LEN, MAX_PAYLOAD_BYTES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Item Validators
// =============================================================================

/// Validates a client-generated item id.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_ID_LEN`] characters
/// - Letters, digits, `-` and `_` only
///
/// ## Example
/// ```rust
/// use notesync_core::validation::validate_item_id;
///
/// assert!(validate_item_id("note-1").is_ok());
/// assert!(validate_item_id("").is_err());
/// assert!(validate_item_id("a/b").is_err());
/// ```
pub fn validate_item_id(id: &str) -> ValidationResult<()> {
    if id.is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "id".to_string(),
            max: MAX_ID_LEN,
        });
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a single item.
///
/// ## Rules
/// - Id passes [`validate_item_id`]
/// - `date_modified` is not negative
/// - Live items carry a payload of at most [`MAX_PAYLOAD_BYTES`]
/// - Tombstones may carry an empty payload
pub fn validate_item(item: &SyncItem) -> ValidationResult<()> {
    validate_item_id(&item.id)?;

    if item.date_modified < 0 {
        return Err(ValidationError::Negative {
            field: "date_modified".to_string(),
        });
    }

    if !item.deleted && item.payload.is_empty() {
        return Err(ValidationError::Required {
            field: "payload".to_string(),
        });
    }

    if item.payload.len() > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::TooLong {
            field: "payload".to_string(),
            max: MAX_PAYLOAD_BYTES,
        });
    }

    Ok(())
}

/// Validates a whole push batch.
///
/// ## Rules
/// - At most [`MAX_BATCH_SIZE`] items
/// - Every item passes [`validate_item`]
/// - No `(kind, id)` pair appears twice
///
/// An empty batch is valid; it commits nothing.
pub fn validate_batch(items: &[SyncItem]) -> ValidationResult<()> {
    if items.len() > MAX_BATCH_SIZE {
        return Err(ValidationError::BatchTooLarge {
            max: MAX_BATCH_SIZE,
            actual: items.len(),
        });
    }

    let mut seen: HashSet<(EntityKind, &str)> = HashSet::with_capacity(items.len());
    for item in items {
        validate_item(item)?;

        if !seen.insert((item.kind, item.id.as_str())) {
            return Err(ValidationError::Duplicate {
                collection: item.kind.collection().to_string(),
                id: item.id.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str) -> SyncItem {
        SyncItem::new(EntityKind::Note, id, r#"{"cipher":"x"}"#, 1_700_000_000_000)
    }

    #[test]
    fn test_validate_item_id() {
        assert!(validate_item_id("6523a7f8e1b2c3d4").is_ok());
        assert!(validate_item_id("note_1-a").is_ok());

        assert!(matches!(
            validate_item_id(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_item_id(&"a".repeat(MAX_ID_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(matches!(
            validate_item_id("has space"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_item_payload_rules() {
        assert!(validate_item(&note("n1")).is_ok());

        let mut empty = note("n1");
        empty.payload.clear();
        assert!(matches!(
            validate_item(&empty),
            Err(ValidationError::Required { .. })
        ));

        let tombstone = SyncItem::tombstone(EntityKind::Note, "n1", 5);
        assert!(validate_item(&tombstone).is_ok());

        let mut huge = note("n1");
        huge.payload = "x".repeat(MAX_PAYLOAD_BYTES + 1);
        assert!(matches!(
            validate_item(&huge),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_item_negative_timestamp() {
        let mut item = note("n1");
        item.date_modified = -1;
        assert!(matches!(
            validate_item(&item),
            Err(ValidationError::Negative { .. })
        ));
    }

    #[test]
    fn test_validate_batch_duplicates() {
        let items = vec![note("n1"), note("n1")];
        assert!(matches!(
            validate_batch(&items),
            Err(ValidationError::Duplicate { .. })
        ));

        // Same id in different collections is fine
        let items = vec![
            note("n1"),
            SyncItem::new(EntityKind::Content, "n1", "{}", 1),
        ];
        assert!(validate_batch(&items).is_ok());
    }

    #[test]
    fn test_validate_batch_size() {
        assert!(validate_batch(&[]).is_ok());

        let items: Vec<SyncItem> = (0..=MAX_BATCH_SIZE)
            .map(|i| note(&format!("n{i}")))
            .collect();
        assert!(matches!(
            validate_batch(&items),
            Err(ValidationError::BatchTooLarge { .. })
        ));
    }
}
