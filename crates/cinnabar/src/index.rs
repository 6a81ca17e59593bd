//! Query views over a store's secondary indexes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use cinnabar_core::{compound_key, Stats};

use crate::store::{Core, State};
use crate::wrap::Wrap;

/// Per-key occupancy of an index, see `Store::index_stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub key_parts: Vec<String>,
    pub count: usize,
    pub total_size: u64,
}

/// A handle for querying one index of a store.
///
/// Obtained from `Store::in_index` / `Store::in_primary_key`. A view over
/// an index that does not exist is benign: every query returns `None`,
/// empty, or does nothing.
pub struct IndexView<'s, T> {
    core: &'s Arc<Core<T>>,
    descriptor: Option<(String, Vec<String>)>,
}

impl<'s, T: Send + Sync + fmt::Debug + 'static> IndexView<'s, T> {
    pub(crate) fn new(core: &'s Arc<Core<T>>, descriptor: Option<(String, Vec<String>)>) -> Self {
        Self { core, descriptor }
    }

    /// Whether this view refers to an existing index.
    pub fn exists(&self) -> bool {
        self.descriptor.is_some()
    }

    fn find<'a>(&self, st: &'a State<T>, keys: &[&str]) -> Option<&'a Vec<Arc<Wrap<T>>>> {
        let (id, fields) = self.descriptor.as_ref()?;
        if keys.len() != fields.len() {
            return None;
        }
        st.buckets.get(id)?.get(&compound_key(keys))
    }

    /// All items stored under the given key, in no particular order.
    /// `None` when the index is unknown, the key arity is wrong, or the
    /// bucket is absent.
    pub fn lookup(&self, keys: &[&str]) -> Option<Vec<Arc<T>>> {
        let st = self.core.state.read();
        let bucket = self.find(&st, keys)?;
        let now = Utc::now();
        Some(
            bucket
                .iter()
                .map(|wrap| {
                    self.core.access(wrap, now);
                    Arc::clone(&wrap.item)
                })
                .collect(),
        )
    }

    /// Like [`IndexView::lookup`], returning just the first item found.
    pub fn one(&self, keys: &[&str]) -> Option<Arc<T>> {
        let st = self.core.state.read();
        let wrap = Arc::clone(self.find(&st, keys)?.first()?);
        self.core.access(&wrap, Utc::now());
        Some(Arc::clone(&wrap.item))
    }

    /// Invoke the callback for every item under the key, stopping when it
    /// returns false.
    pub fn each(&self, mut cb: impl FnMut(&T) -> bool, keys: &[&str]) {
        let st = self.core.state.read();
        let Some(bucket) = self.find(&st, keys) else {
            return;
        };
        let now = Utc::now();
        for wrap in bucket {
            self.core.access(wrap, now);
            if !cb(&wrap.item) {
                return;
            }
        }
    }

    /// Every item observed under any key of this index, deduplicated by
    /// UID.
    pub fn all(&self) -> Vec<Arc<T>> {
        let st = self.core.state.read();
        let Some((id, _)) = self.descriptor.as_ref() else {
            return Vec::new();
        };
        let Some(index) = st.buckets.get(id) else {
            return Vec::new();
        };

        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for bucket in index.values() {
            for wrap in bucket {
                if seen.insert(wrap.uid().clone()) {
                    self.core.access(wrap, now);
                    items.push(Arc::clone(&wrap.item));
                }
            }
        }
        items
    }

    /// The compound key parts this index would assign to the item if it
    /// were inserted now.
    pub fn field_key(&self, item: &T) -> Option<Vec<String>> {
        let (_, fields) = self.descriptor.as_ref()?;
        Some(
            fields
                .iter()
                .map(|field| self.core.resolver.get_field(item, field))
                .collect(),
        )
    }

    /// Stats snapshots of the items stored under the given key.
    pub fn stats(&self, keys: &[&str]) -> Option<Vec<Stats>> {
        let st = self.core.state.read();
        let bucket = self.find(&st, keys)?;
        let now = Utc::now();
        Some(bucket.iter().map(|wrap| self.core.access(wrap, now)).collect())
    }
}
