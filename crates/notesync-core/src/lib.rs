//! # notesync-core: Pure Types for Note Sync
//!
//! Everything the other crates agree on: which kinds of records sync, what
//! an item looks like on the wire, how live notifications are shaped, and
//! which pushes are acceptable.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Note Sync Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/sync-server                             │   │
//! │  │    push / fetch ──► commit ──► fan-out       heartbeat         │   │
//! │  └───────────┬───────────────────────────────────────┬─────────────┘   │
//! │              │                                       │                  │
//! │  ┌───────────▼──────────────┐           ┌────────────▼─────────────┐   │
//! │  │       notesync-db        │           │    notesync-realtime     │   │
//! │  │  unit of work, repos     │           │  registry, fan-out, hub  │   │
//! │  └───────────┬──────────────┘           └────────────┬─────────────┘   │
//! │              │                                       │                  │
//! │  ┌───────────▼───────────────────────────────────────▼─────────────┐   │
//! │  │               ★ notesync-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌──────────────┐  ┌───────────┐               │   │
//! │  │   │   types   │  │ notification │  │ validation│               │   │
//! │  │   │EntityKind │  │ Notification │  │  ids,     │               │   │
//! │  │   │ SyncItem  │  │ Heartbeat    │  │  batches  │               │   │
//! │  │   └───────────┘  └──────────────┘  └───────────┘               │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity kinds, typed markers, sync items
//! - [`notification`] - Live notification wire payload
//! - [`error`] - Domain error types
//! - [`validation`] - Push validation
//!
//! ## Example Usage
//!
//! ```rust
//! use notesync_core::{EntityKind, Notification};
//!
//! assert_eq!(EntityKind::UserSettings.collection(), "user_settings");
//!
//! let msg = Notification::trigger_sync("push").unwrap();
//! assert_eq!(msg.kind, "triggerSync");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod notification;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use notification::{HeartbeatData, Notification, TriggerSyncData};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum items accepted in one push.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Maximum size of one item payload.
///
/// Attachment bytes go to object storage; only their metadata syncs here.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Maximum length of a client-generated item id.
pub const MAX_ID_LEN: usize = 64;
