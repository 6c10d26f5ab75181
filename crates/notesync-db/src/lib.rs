//! # notesync-db: Storage Layer for Note Sync
//!
//! SQLite storage for synchronized items, written through a deferred-command
//! unit of work so that one push commits atomically across every entity kind
//! it touches.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Note Sync Data Flow                              │
//! │                                                                         │
//! │  SyncService::push                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    notesync-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  Repository   │    │  UnitOfWork   │    │   Session    │  │   │
//! │  │   │  Accessor     │───►│  CommandQueue │───►│ (one tx)     │  │   │
//! │  │   │  notes, ...   │    │  commit()     │    │ BEGIN/COMMIT │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────┬───────┘  │   │
//! │  │                                                    │          │   │
//! │  │   ┌───────────────┐    ┌───────────────┐           │          │   │
//! │  │   │   Database    │    │  Migrations   │           │          │   │
//! │  │   │   (pool.rs)   │    │  (embedded)   │           │          │   │
//! │  │   └───────┬───────┘    └───────────────┘           │          │   │
//! │  └───────────┼────────────────────────────────────────┼──────────┘   │
//! │              ▼                                        ▼              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`clock`] - Unique `date_synced` stamps
//! - [`session`] - Transactional session
//! - [`unit_of_work`] - Command queue and commit coordinator
//! - [`repository`] - Entity repositories and the accessor
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notesync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("sync.db")).await?;
//!
//! let repos = db.repositories();
//! repos.notes.upsert(user_id, note)?;
//! repos.content.upsert(user_id, content)?;
//! let summary = repos.commit().await?;
//! if summary.has_changes() {
//!     // notify other devices
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod session;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::SyncClock;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::{Repository, RepositoryAccessor, SyncRepository};
pub use session::Session;
pub use unit_of_work::{CommandQueue, CommitSummary, PendingCommand, UnitOfWork};
