//! Ordered-tree integration.
//!
//! Wrappers are kept in a balanced ordered map whose key delegates every
//! comparison to the store's resolved order. Two probes are equal iff
//! neither is less than the other, so inserting an item the comparator
//! considers equal to a stored one replaces it.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::resolve::Resolver;
use crate::wrap::Wrap;

pub(crate) struct TreeKey<T> {
    item: Arc<T>,
    resolver: Arc<Resolver<T>>,
}

impl<T: fmt::Debug> PartialEq for TreeKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: fmt::Debug> Eq for TreeKey<T> {}

impl<T: fmt::Debug> PartialOrd for TreeKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: fmt::Debug> Ord for TreeKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.resolver.less(&self.item, &other.item) {
            Ordering::Less
        } else if self.resolver.less(&other.item, &self.item) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

pub(crate) struct Tree<T> {
    map: BTreeMap<TreeKey<T>, Arc<Wrap<T>>>,
    resolver: Arc<Resolver<T>>,
}

impl<T: fmt::Debug> Tree<T> {
    pub fn new(resolver: Arc<Resolver<T>>) -> Self {
        Self {
            map: BTreeMap::new(),
            resolver,
        }
    }

    fn key(&self, item: &Arc<T>) -> TreeKey<T> {
        TreeKey {
            item: Arc::clone(item),
            resolver: Arc::clone(&self.resolver),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, probe: &Arc<T>) -> Option<Arc<Wrap<T>>> {
        self.map.get(&self.key(probe)).cloned()
    }

    /// Insert a wrapper, returning the wrapper it replaced when the tree
    /// held an equal item.
    pub fn insert_or_replace(&mut self, wrap: Arc<Wrap<T>>) -> Option<Arc<Wrap<T>>> {
        let key = self.key(&wrap.item);
        let old = self.map.remove(&key);
        self.map.insert(key, wrap);
        old
    }

    pub fn delete(&mut self, probe: &Arc<T>) -> Option<Arc<Wrap<T>>> {
        self.map.remove(&self.key(probe))
    }

    /// Walk wrappers in ascending order; `cb` returning false stops the
    /// walk.
    pub fn ascend(&self, mut cb: impl FnMut(&Arc<Wrap<T>>) -> bool) {
        for wrap in self.map.values() {
            if !cb(wrap) {
                return;
            }
        }
    }

    /// Walk ascending from the first wrapper equal to or greater than the
    /// probe.
    pub fn ascend_from(&self, at: &Arc<T>, mut cb: impl FnMut(&Arc<Wrap<T>>) -> bool) {
        for (_, wrap) in self.map.range(self.key(at)..) {
            if !cb(wrap) {
                return;
            }
        }
    }

    pub fn descend(&self, mut cb: impl FnMut(&Arc<Wrap<T>>) -> bool) {
        for wrap in self.map.values().rev() {
            if !cb(wrap) {
                return;
            }
        }
    }

    /// Walk descending from the last wrapper equal to or less than the
    /// probe.
    pub fn descend_from(&self, at: &Arc<T>, mut cb: impl FnMut(&Arc<Wrap<T>>) -> bool) {
        for (_, wrap) in self.map.range(..=self.key(at)).rev() {
            if !cb(wrap) {
                return;
            }
        }
    }
}
