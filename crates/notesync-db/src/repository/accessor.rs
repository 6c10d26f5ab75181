//! # Repository Accessor
//!
//! Every entity repository for one request, all sharing one unit of work.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RepositoryAccessor                                 │
//! │                                                                         │
//! │   notes ─────────┐                                                      │
//! │   notebooks ─────┤                                                      │
//! │   content ───────┤                                                      │
//! │   relations ─────┼──► CommandQueue ──► UnitOfWork::commit() ──► SQLite │
//! │   ...            │    (one per request)   (one transaction)            │
//! │   monographs ────┘                                                      │
//! │                                                                         │
//! │   Construction is pure wiring. The accessor never talks to storage     │
//! │   itself; only `commit` does, through the unit of work.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio_util::sync::CancellationToken;

use notesync_core::{
    Attachment, Content, EntityKind, Monograph, Note, Notebook, Relation, Reminder, Setting,
    Shortcut, UserSettings,
};

use super::entity::{Repository, SyncRepository};
use crate::error::DbResult;
use crate::pool::Database;
use crate::unit_of_work::{CommitSummary, UnitOfWork};

/// Named repositories bound to one [`UnitOfWork`].
#[derive(Debug)]
pub struct RepositoryAccessor {
    unit_of_work: UnitOfWork,
    pub notes: Repository<Note>,
    pub notebooks: Repository<Notebook>,
    pub shortcuts: Repository<Shortcut>,
    pub relations: Repository<Relation>,
    pub reminders: Repository<Reminder>,
    pub content: Repository<Content>,
    pub settings: Repository<Setting>,
    pub attachments: Repository<Attachment>,
    pub user_settings: Repository<UserSettings>,
    pub monographs: Repository<Monograph>,
}

impl RepositoryAccessor {
    /// Wires every repository to a fresh unit of work.
    pub fn new(db: &Database) -> Self {
        let unit_of_work = UnitOfWork::new(db);
        let queue = unit_of_work.queue();

        RepositoryAccessor {
            notes: Repository::new(db, queue.clone()),
            notebooks: Repository::new(db, queue.clone()),
            shortcuts: Repository::new(db, queue.clone()),
            relations: Repository::new(db, queue.clone()),
            reminders: Repository::new(db, queue.clone()),
            content: Repository::new(db, queue.clone()),
            settings: Repository::new(db, queue.clone()),
            attachments: Repository::new(db, queue.clone()),
            user_settings: Repository::new(db, queue.clone()),
            monographs: Repository::new(db, queue.clone()),
            unit_of_work,
        }
    }

    /// Repository for a kind only known at runtime.
    pub fn repository(&self, kind: EntityKind) -> &dyn SyncRepository {
        match kind {
            EntityKind::Note => &self.notes,
            EntityKind::Notebook => &self.notebooks,
            EntityKind::Shortcut => &self.shortcuts,
            EntityKind::Relation => &self.relations,
            EntityKind::Reminder => &self.reminders,
            EntityKind::Content => &self.content,
            EntityKind::Setting => &self.settings,
            EntityKind::Attachment => &self.attachments,
            EntityKind::UserSettings => &self.user_settings,
            EntityKind::Monograph => &self.monographs,
        }
    }

    /// The shared unit of work.
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    /// Commands queued across all repositories.
    pub fn pending(&self) -> usize {
        self.unit_of_work.pending()
    }

    /// Commits everything queued through any repository.
    pub async fn commit(&self) -> DbResult<CommitSummary> {
        self.unit_of_work.commit().await
    }

    /// Commits, aborting if `cancel` fires first.
    pub async fn commit_with_cancel(&self, cancel: &CancellationToken) -> DbResult<CommitSummary> {
        self.unit_of_work.commit_with_cancel(cancel).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
