//! The wrapper coupling a stored item with its identity, index-key
//! snapshot and stats.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cinnabar_core::{Stats, Uid};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// Internal record managed by the store.
///
/// `values` holds the compound key of every secondary index, captured when
/// the wrapper was built, so index removal can locate the stale entry even
/// if the caller later mutates the item. Stats are guarded by their own
/// mutex so shared-lock readers can advance them.
pub(crate) struct Wrap<T> {
    uid: OnceCell<Uid>,
    pub item: Arc<T>,
    pub values: Vec<String>,
    pub stats: Mutex<Stats>,
}

impl<T> Wrap<T> {
    pub fn new(item: Arc<T>, values: Vec<String>) -> Self {
        Self {
            uid: OnceCell::new(),
            item,
            values,
            stats: Mutex::new(Stats::default()),
        }
    }

    /// The wrapper's UID, computed at first use and stable thereafter.
    pub fn uid(&self) -> &Uid {
        self.uid.get_or_init(Uid::generate)
    }

    /// Pin the UID to a persisted identity. Only meaningful before the UID
    /// has been read.
    pub fn set_uid(&self, uid: Uid) {
        let _ = self.uid.set(uid);
    }

    /// Record a surfacing read and return the updated stats snapshot.
    pub fn touch_read(&self, now: DateTime<Utc>) -> Stats {
        let mut stats = self.stats.lock();
        stats.accessed = Some(now);
        stats.reads += 1;
        stats.clone()
    }

    /// Record a write, carrying forward the stats of the wrapper this one
    /// replaces (if any).
    pub fn absorb_write(&self, prior: Option<&Arc<Wrap<T>>>, now: DateTime<Utc>) {
        let mut stats = self.stats.lock();
        if let Some(prior) = prior {
            *stats = prior.stats.lock().clone();
        }
        if stats.created.is_none() {
            stats.created = Some(now);
        }
        stats.modified = Some(now);
        stats.writes += 1;
    }

    pub fn stats_snapshot(&self) -> Stats {
        self.stats.lock().clone()
    }
}
