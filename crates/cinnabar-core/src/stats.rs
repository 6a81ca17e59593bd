//! Per-item access statistics.

use chrono::{DateTime, Utc};

/// Access statistics carried by every stored item.
///
/// `created` is set once, when the item is first inserted. `modified`
/// advances on every write (insert or replace), `accessed` on every read
/// that surfaces the item. `size` is the byte size reported by a
/// metadata-capable persistence backend, or 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub reads: u64,
    pub writes: u64,
    pub size: u64,
}

impl Stats {
    /// Last modification time, falling back to `created` when the item has
    /// never been rewritten.
    pub fn effective_modified(&self) -> Option<DateTime<Utc>> {
        self.modified.or(self.created)
    }

    /// Last access time, falling back to the effective modification time
    /// when the item has never been read.
    pub fn effective_accessed(&self) -> Option<DateTime<Utc>> {
        self.accessed.or_else(|| self.effective_modified())
    }
}
