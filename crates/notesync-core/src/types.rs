//! # Domain Types
//!
//! Synchronizable entity kinds and the item envelope every device exchanges.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   EntityKind    │   │    SyncItem     │   │   StoredItem    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Note           │   │  id             │   │  SyncItem       │       │
//! │  │  Notebook       │   │  kind           │   │  + date_synced  │       │
//! │  │  Content        │   │  payload        │   │  (server clock) │       │
//! │  │  Attachment ... │   │  date_modified  │   └─────────────────┘       │
//! │  └─────────────────┘   │  deleted        │                             │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  Marker types (Note, Notebook, ...) implement `Entity` so storage      │
//! │  repositories are typed per kind at compile time.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Opaque Payloads
//! The payload is whatever the client serialized (usually an encrypted
//! cipher envelope). The server stores and returns it verbatim.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

// =============================================================================
// Entity Kind
// =============================================================================

/// Every kind of record a device can synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum EntityKind {
    Note,
    Notebook,
    Shortcut,
    Relation,
    Reminder,
    Content,
    /// Legacy per-device settings record.
    Setting,
    Attachment,
    UserSettings,
    /// Published (public) note.
    Monograph,
}

impl EntityKind {
    /// All kinds, in the order a full fetch walks the collections.
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Setting,
        EntityKind::UserSettings,
        EntityKind::Attachment,
        EntityKind::Content,
        EntityKind::Note,
        EntityKind::Notebook,
        EntityKind::Relation,
        EntityKind::Reminder,
        EntityKind::Shortcut,
        EntityKind::Monograph,
    ];

    /// Storage collection (table) name for this kind.
    pub const fn collection(&self) -> &'static str {
        match self {
            EntityKind::Note => "notes",
            EntityKind::Notebook => "notebooks",
            EntityKind::Shortcut => "shortcuts",
            EntityKind::Relation => "relations",
            EntityKind::Reminder => "reminders",
            EntityKind::Content => "content",
            EntityKind::Setting => "settings",
            EntityKind::Attachment => "attachments",
            EntityKind::UserSettings => "user_settings",
            EntityKind::Monograph => "monographs",
        }
    }

    /// Looks a kind up by its collection name.
    pub fn from_collection(name: &str) -> Result<Self, CoreError> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.collection() == name)
            .ok_or_else(|| CoreError::UnknownCollection(name.to_string()))
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::from_collection(s)
    }
}

// =============================================================================
// Typed Entity Markers
// =============================================================================

/// A synchronizable entity kind known at compile time.
///
/// Implemented by zero-sized marker types so that `Repository<Note>` and
/// `Repository<Content>` are distinct types.
pub trait Entity: Send + Sync + 'static {
    /// The runtime kind this marker stands for.
    const KIND: EntityKind;
}

macro_rules! entity_markers {
    ($($(#[$meta:meta])* $name:ident => $kind:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $name;

            impl Entity for $name {
                const KIND: EntityKind = EntityKind::$kind;
            }
        )+
    };
}

entity_markers! {
    /// Marker for notes.
    Note => Note,
    /// Marker for notebooks.
    Notebook => Notebook,
    /// Marker for shortcuts.
    Shortcut => Shortcut,
    /// Marker for relations between items.
    Relation => Relation,
    /// Marker for reminders.
    Reminder => Reminder,
    /// Marker for note content blobs.
    Content => Content,
    /// Marker for legacy settings.
    Setting => Setting,
    /// Marker for attachments.
    Attachment => Attachment,
    /// Marker for per-user settings.
    UserSettings => UserSettings,
    /// Marker for published notes.
    Monograph => Monograph,
}

// =============================================================================
// Sync Item
// =============================================================================

/// One record as exchanged with client devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncItem {
    /// Client-generated identifier, unique per user and kind.
    pub id: String,

    /// Which collection the item belongs to.
    pub kind: EntityKind,

    /// Opaque client payload.
    pub payload: String,

    /// Client modification time (unix milliseconds).
    pub date_modified: i64,

    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl SyncItem {
    /// Creates a live item.
    pub fn new(
        kind: EntityKind,
        id: impl Into<String>,
        payload: impl Into<String>,
        date_modified: i64,
    ) -> Self {
        SyncItem {
            id: id.into(),
            kind,
            payload: payload.into(),
            date_modified,
            deleted: false,
        }
    }

    /// Creates a tombstone for a deleted item.
    pub fn tombstone(kind: EntityKind, id: impl Into<String>, date_modified: i64) -> Self {
        SyncItem {
            id: id.into(),
            kind,
            payload: String::new(),
            date_modified,
            deleted: true,
        }
    }
}

/// An item as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StoredItem {
    #[serde(flatten)]
    pub item: SyncItem,

    /// Server time the item was last written (unix milliseconds).
    /// Used as the fetch cursor.
    pub date_synced: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names_are_unique() {
        let mut names: Vec<&str> = EntityKind::ALL.iter().map(|k| k.collection()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_collection_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_collection(kind.collection()).unwrap(), kind);
        }
        assert!("tags".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_markers_map_to_kinds() {
        assert_eq!(Note::KIND, EntityKind::Note);
        assert_eq!(Content::KIND.collection(), "content");
        assert_eq!(UserSettings::KIND.collection(), "user_settings");
    }

    #[test]
    fn test_tombstone_has_empty_payload() {
        let item = SyncItem::tombstone(EntityKind::Note, "n1", 10);
        assert!(item.deleted);
        assert!(item.payload.is_empty());
    }

    #[test]
    fn test_stored_item_serializes_flat() {
        let stored = StoredItem {
            item: SyncItem::new(EntityKind::Reminder, "r1", "{}", 5),
            date_synced: 7,
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["id"], "r1");
        assert_eq!(json["kind"], "reminder");
        assert_eq!(json["date_synced"], 7);
    }
}
