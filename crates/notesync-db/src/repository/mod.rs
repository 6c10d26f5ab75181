//! # Repository Module
//!
//! Entity repositories and the accessor that composes them.
//!
//! ## Write Path vs Read Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Sync service                                                          │
//! │       │                                                                 │
//! │       │  repos.notes.upsert(user, item)      (enqueue only)            │
//! │       │  repos.content.delete(user, id, t)   (enqueue only)            │
//! │       │  repos.commit()                      (one transaction)         │
//! │       ▼                                                                 │
//! │  Repository<E>  ──writes──►  CommandQueue  ──►  UnitOfWork  ──►  SQLite│
//! │       │                                                                 │
//! │       └──reads (find_by_id, find_since, count)──────────────────►  SQLite│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Types
//!
//! - [`Repository`] - Typed repository for one entity kind
//! - [`SyncRepository`] - Object-safe view used for runtime routing
//! - [`RepositoryAccessor`] - All repositories sharing one unit of work

pub mod accessor;
pub mod entity;

pub use accessor::RepositoryAccessor;
pub use entity::{Repository, SyncRepository};
