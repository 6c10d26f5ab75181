//! # Sync Clock
//!
//! Hands out `date_synced` stamps. Stamps follow the wall clock in unix
//! milliseconds but never repeat: a write landing in the same millisecond as
//! the previous one gets the next millisecond instead.
//!
//! ```text
//!   wall clock   1000   1000   1000   1001   1005
//!   stamp        1000   1001   1002   1003   1005
//! ```
//!
//! Unique stamps make `date_synced` a total order per database, which is
//! what lets a fetch page end exactly at its last item.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

/// Strictly increasing millisecond stamps, shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct SyncClock {
    last: Arc<AtomicI64>,
}

impl SyncClock {
    /// Next stamp: the current time, or one past the last stamp if the
    /// clock has not moved on.
    pub fn next_stamp(&self) -> i64 {
        self.next_stamp_at(Utc::now().timestamp_millis())
    }

    fn next_stamp_at(&self, now: i64) -> i64 {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Moves the clock past a stamp already in storage.
    pub fn observe(&self, stamp: i64) {
        self.last.fetch_max(stamp, Ordering::AcqRel);
    }

    /// Last stamp handed out or observed.
    pub fn last_stamp(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }
}
