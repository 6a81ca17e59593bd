//! The store façade: configuration, data operations, traversal and expiry.

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cinnabar_bus::{Event, Happening, HappeningBus, DEFAULT_QUEUE_CAPACITY};
use cinnabar_core::{
    compound_key, split_key, CinnabarError, Expirable, Fielded, Indexable, Meta, MetaPersister,
    Orderable, Persister, Result, Stats, Uid,
};
use parking_lot::RwLock;

use crate::expire::{spawn_expiry_ticker, Expirer};
use crate::index::{IndexStats, IndexView};
use crate::resolve::Resolver;
use crate::tree::Tree;
use crate::wrap::Wrap;

/// A combined comparator, expirer and fielder, installable in one call.
pub trait Indexer<T>: Send + Sync {
    fn less(&self, a: &T, b: &T) -> bool;
    fn get_field(&self, item: &T, field: &str) -> String;
    fn is_expired(&self, item: &T, now: DateTime<Utc>, stats: &Stats) -> bool;
}

#[derive(Debug, Clone)]
pub(crate) struct IndexDescriptor {
    pub id: String,
    pub position: usize,
    pub fields: Vec<String>,
    pub unique: bool,
}

pub(crate) enum Backend<T> {
    Plain(Arc<dyn Persister<T>>),
    Meta(Arc<dyn MetaPersister<T>>),
}

impl<T> Backend<T> {
    fn save(&self, id: &Uid, item: &T) -> Result<Option<Meta>> {
        match self {
            Backend::Plain(p) => p.save(id, item).map(|_| None),
            Backend::Meta(p) => p.meta_save(id, item).map(Some),
        }
    }

    fn remove(&self, id: &Uid) -> Result<()> {
        match self {
            Backend::Plain(p) => p.remove(id),
            Backend::Meta(p) => p.remove(id),
        }
    }
}

pub(crate) struct State<T> {
    pub(crate) tree: Tree<T>,
    pub(crate) descriptors: HashMap<String, IndexDescriptor>,
    pub(crate) buckets: HashMap<String, HashMap<String, Vec<Arc<Wrap<T>>>>>,
    current: Option<String>,
    primary: Option<String>,
    pub(crate) used: bool,
    persister: Option<Backend<T>>,
}

impl<T: fmt::Debug> State<T> {
    fn new(resolver: Arc<Resolver<T>>) -> Self {
        Self {
            tree: Tree::new(resolver),
            descriptors: HashMap::new(),
            buckets: HashMap::new(),
            current: None,
            primary: None,
            used: false,
            persister: None,
        }
    }

    fn create_index(&mut self, fields: &[&str]) {
        let id = compound_key(fields);
        if self.descriptors.contains_key(&id) {
            self.current = Some(id);
            return;
        }
        let descriptor = IndexDescriptor {
            id: id.clone(),
            position: self.descriptors.len(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
        };
        self.descriptors.insert(id.clone(), descriptor);
        self.current = Some(id);
    }
}

fn remove_from_bucket<T>(
    buckets: &mut HashMap<String, HashMap<String, Vec<Arc<Wrap<T>>>>>,
    index_id: &str,
    key: &str,
    wrap: &Arc<Wrap<T>>,
) {
    let Some(index) = buckets.get_mut(index_id) else {
        return;
    };
    let Some(bucket) = index.get_mut(key) else {
        return;
    };
    if let Some(pos) = bucket.iter().position(|w| Arc::ptr_eq(w, wrap)) {
        bucket.swap_remove(pos);
    }
    if bucket.is_empty() {
        index.remove(key);
    }
}

pub(crate) struct Core<T> {
    pub(crate) state: RwLock<State<T>>,
    pub(crate) resolver: Arc<Resolver<T>>,
    pub(crate) bus: HappeningBus<T>,
    expire_intervals: Sender<Duration>,
}

impl<T: Send + Sync + fmt::Debug + 'static> Core<T> {
    pub(crate) fn publish(
        &self,
        event: Event,
        old: Option<&Arc<Wrap<T>>>,
        new: Option<&Arc<Wrap<T>>>,
    ) {
        let subject = new.or(old);
        let stats = subject.map(|w| w.stats_snapshot()).unwrap_or_default();
        self.bus.publish(Happening {
            event,
            old: old.map(|w| Arc::clone(&w.item)),
            new: new.map(|w| Arc::clone(&w.item)),
            stats,
        });
    }

    /// Record a surfacing read: bump the wrapper's stats and emit an
    /// Access happening carrying the updated snapshot.
    pub(crate) fn access(&self, wrap: &Arc<Wrap<T>>, now: DateTime<Utc>) -> Stats {
        let stats = wrap.touch_read(now);
        self.bus.publish(Happening {
            event: Event::Access,
            old: None,
            new: Some(Arc::clone(&wrap.item)),
            stats: stats.clone(),
        });
        stats
    }

    pub(crate) fn compute_values(&self, st: &State<T>, item: &T) -> Vec<String> {
        let mut values = vec![String::new(); st.descriptors.len()];
        for descriptor in st.descriptors.values() {
            values[descriptor.position] = self.resolver.fields_value(item, &descriptor.fields);
        }
        values
    }

    fn apply_put(
        &self,
        st: &mut State<T>,
        item: Arc<T>,
        emit: bool,
        mirror: bool,
    ) -> (Option<Arc<T>>, Option<CinnabarError>) {
        let values = self.compute_values(st, &item);
        let wrap = Arc::new(Wrap::new(item, values));
        self.apply_add(st, wrap, emit, mirror)
    }

    /// Insert a prepared wrapper: replace in the tree, maintain every
    /// index, evict unique-key conflicts, mirror to the backend and emit
    /// the resulting happening.
    pub(crate) fn apply_add(
        &self,
        st: &mut State<T>,
        wrap: Arc<Wrap<T>>,
        emit: bool,
        mirror: bool,
    ) -> (Option<Arc<T>>, Option<CinnabarError>) {
        st.used = true;

        let now = Utc::now();
        let old = st.tree.insert_or_replace(Arc::clone(&wrap));
        wrap.absorb_write(old.as_ref(), now);

        let mut evicted = false;
        let mut err: Option<CinnabarError> = None;

        let descriptors: Vec<IndexDescriptor> = st.descriptors.values().cloned().collect();
        for descriptor in &descriptors {
            if let Some(old) = &old {
                remove_from_bucket(
                    &mut st.buckets,
                    &descriptor.id,
                    &old.values[descriptor.position],
                    old,
                );
            }

            let key = wrap.values[descriptor.position].clone();
            if descriptor.unique {
                let occupants: Vec<Arc<Wrap<T>>> = st
                    .buckets
                    .get(&descriptor.id)
                    .and_then(|index| index.get(&key))
                    .cloned()
                    .unwrap_or_default();
                for occupant in occupants {
                    if Arc::ptr_eq(&occupant, &wrap) {
                        continue;
                    }
                    let (removed, rm_err) = self.apply_rm(st, &occupant.item, mirror);
                    if let Some(removed) = removed {
                        if emit {
                            self.publish(Event::Update, Some(&removed), Some(&wrap));
                        }
                        evicted = true;
                    }
                    if err.is_none() {
                        err = rm_err;
                    }
                }
            }

            st.buckets
                .entry(descriptor.id.clone())
                .or_default()
                .entry(key)
                .or_default()
                .push(Arc::clone(&wrap));
        }

        if mirror {
            if let Some(backend) = &st.persister {
                match backend.save(wrap.uid(), &wrap.item) {
                    Ok(Some(meta)) => wrap.stats.lock().size = meta.size,
                    Ok(None) => {}
                    Err(e) => {
                        if err.is_none() {
                            err = Some(e);
                        }
                    }
                }
            }
        }

        if emit {
            if let Some(old) = &old {
                self.publish(Event::Update, Some(old), Some(&wrap));
            } else if !evicted {
                self.publish(Event::Insert, None, Some(&wrap));
            }
        }

        (old.map(|w| Arc::clone(&w.item)), err)
    }

    /// Remove the wrapper equal to the probe from the tree, every index
    /// and (when mirroring) the persistence backend.
    pub(crate) fn apply_rm(
        &self,
        st: &mut State<T>,
        probe: &Arc<T>,
        mirror: bool,
    ) -> (Option<Arc<Wrap<T>>>, Option<CinnabarError>) {
        let Some(removed) = st.tree.delete(probe) else {
            return (None, None);
        };

        let mut err = None;
        if mirror {
            if let Some(backend) = &st.persister {
                if let Err(e) = backend.remove(removed.uid()) {
                    err = Some(e);
                }
            }
        }

        let State {
            descriptors,
            buckets,
            ..
        } = st;
        for descriptor in descriptors.values() {
            remove_from_bucket(
                buckets,
                &descriptor.id,
                &removed.values[descriptor.position],
                &removed,
            );
        }

        (Some(removed), err)
    }

    /// One expiry pass: scan under the shared lock, then delete the
    /// collected victims under the exclusive lock. Items that vanished
    /// between the two phases are skipped.
    pub(crate) fn expire(&self) -> usize {
        let now = Utc::now();
        let victims: Vec<Arc<Wrap<T>>> = {
            let st = self.state.read();
            let mut collected = Vec::new();
            st.tree.ascend(|wrap| {
                let stats = wrap.stats_snapshot();
                if self.resolver.is_expired(&wrap.item, now, &stats) {
                    collected.push(Arc::clone(wrap));
                }
                true
            });
            collected
        };

        if victims.is_empty() {
            return 0;
        }

        let mut st = self.state.write();
        let mut expired = 0;
        for victim in victims {
            let (removed, _) = self.apply_rm(&mut st, &victim.item, true);
            if let Some(removed) = removed {
                self.publish(Event::Expiry, Some(&removed), None);
                expired += 1;
            }
        }
        expired
    }
}

/// Indexed, ordered storage for host-defined items.
///
/// Just like a real database, if you update an item such that its index
/// keys would change, you must put it back in to refresh the indexes and
/// trigger update notifications. Do not mutate fields that determine the
/// comparator's ordering while an item is stored; doing so strands the
/// item at an unknown position in the tree.
///
/// The store is a concurrent object: clone the handle and call any
/// operation from any thread. Configuration (indexes, primary key,
/// ordering direction, persistence) must finish before the first
/// mutation; configuring an in-use store panics.
pub struct Store<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Store {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> Store<T> {
    /// Create an empty store with no indexes and default ordering.
    pub fn new() -> Self {
        let resolver = Arc::new(Resolver::new());
        let (interval_tx, interval_rx) = mpsc::channel();
        let core = Arc::new(Core {
            state: RwLock::new(State::new(Arc::clone(&resolver))),
            resolver,
            bus: HappeningBus::start(DEFAULT_QUEUE_CAPACITY),
            expire_intervals: interval_tx,
        });
        spawn_expiry_ticker(Arc::downgrade(&core), interval_rx);
        Store { core }
    }

    /// Create a store wired to the item type's own ordering and field
    /// extraction.
    pub fn for_indexable() -> Self
    where
        T: Indexable,
    {
        let store = Self::new();
        store.with_orderable().with_fielded();
        store
    }

    pub(crate) fn configure<R>(&self, what: &str, f: impl FnOnce(&mut State<T>) -> R) -> R {
        let mut st = self.core.state.write();
        if st.used {
            panic!("cannot {what} on an in-use store");
        }
        f(&mut st)
    }

    pub(crate) fn core(&self) -> &Arc<Core<T>> {
        &self.core
    }

    /// Wire the item type's [`Orderable`] capability as this store's
    /// ordering (still overridable by an explicit comparator).
    pub fn with_orderable(&self) -> &Self
    where
        T: Orderable,
    {
        self.configure("wire orderable capability", |_| {
            self.core
                .resolver
                .set_capability_cmp(Arc::new(|a: &T, b: &T| a.less(b)));
        });
        self
    }

    /// Wire the item type's [`Fielded`] capability as this store's field
    /// extractor.
    pub fn with_fielded(&self) -> &Self
    where
        T: Fielded,
    {
        self.configure("wire fielded capability", |_| {
            self.core
                .resolver
                .set_capability_fielder(Arc::new(|item: &T, field: &str| item.get_field(field)));
        });
        self
    }

    /// Wire the item type's [`Expirable`] capability as this store's
    /// expirer.
    pub fn with_expirable(&self) -> &Self
    where
        T: Expirable,
    {
        self.configure("wire expirable capability", |_| {
            let expirer: Arc<dyn Expirer<T>> =
                Arc::new(|item: &T, now: DateTime<Utc>, stats: &Stats| item.is_expired(now, stats));
            self.core.resolver.set_capability_expirer(expirer);
        });
        self
    }

    /// Set the comparator, expirer and fielder in one call.
    ///
    /// Overriding the comparator means the primary key no longer
    /// determines item ordering.
    pub fn set_indexer(&self, indexer: Arc<dyn Indexer<T>>) -> &Self {
        self.configure("set indexer", |_| {
            let cmp = Arc::clone(&indexer);
            self.core
                .resolver
                .set_comparator(Arc::new(move |a: &T, b: &T| cmp.less(a, b)));
            let fielder = Arc::clone(&indexer);
            self.core.resolver.set_fielder(Arc::new(
                move |item: &T, field: &str| fielder.get_field(item, field),
            ));
            let expirer: Arc<dyn Expirer<T>> = Arc::new(
                move |item: &T, now: DateTime<Utc>, stats: &Stats| {
                    indexer.is_expired(item, now, stats)
                },
            );
            self.core.resolver.set_expirer(expirer);
        });
        self
    }

    /// Set just the comparator. Overriding the comparator means the
    /// primary key no longer determines item ordering.
    pub fn set_comparator(&self, comparator: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> &Self {
        self.configure("set comparator", |_| {
            self.core.resolver.set_comparator(Arc::new(comparator));
        });
        self
    }

    /// Set just the expirer.
    pub fn set_expirer(&self, expirer: impl Expirer<T> + 'static) -> &Self {
        self.configure("set expirer", |_| {
            self.core.resolver.set_expirer(Arc::new(expirer));
        });
        self
    }

    /// Set just the fielder.
    pub fn set_fielder(&self, fielder: impl Fn(&T, &str) -> String + Send + Sync + 'static) -> &Self {
        self.configure("set fielder", |_| {
            self.core.resolver.set_fielder(Arc::new(fielder));
        });
        self
    }

    /// Declare the primary key. The named fields define the default
    /// ordering (unless a comparator overrides it) and become an index.
    pub fn primary_key(&self, fields: &[&str]) -> &Self {
        self.configure("change primary key", |st| {
            self.core
                .resolver
                .set_primary_key(fields.iter().map(|f| f.to_string()).collect());
            st.create_index(fields);
            st.primary = st.current.clone();
        });
        self
    }

    /// Add a secondary index over the given fields and make it current.
    pub fn create_index(&self, fields: &[&str]) -> &Self {
        self.configure("create index", |st| st.create_index(fields));
        self
    }

    /// Mark the current (last created) index unique. Inserting an item
    /// under an occupied key of a unique index evicts the prior occupants
    /// from the entire store.
    pub fn unique(&self) -> &Self {
        self.configure("mark index unique", |st| {
            if let Some(current) = st.current.clone() {
                if let Some(descriptor) = st.descriptors.get_mut(&current) {
                    descriptor.unique = true;
                }
            }
        });
        self
    }

    /// Flip the comparator, so that lesser items are stored after greater
    /// ones.
    pub fn reversed(&self, reversed: bool) -> &Self {
        self.configure("change store order", |_| {
            self.core.resolver.set_reversed(reversed);
        });
        self
    }

    /// Set the interval of the background expiry sweep. Without an
    /// explicit interval a non-round default (~23.3s) applies shortly
    /// after construction.
    pub fn expire_interval(&self, interval: Duration) -> &Self {
        self.configure("set expire interval", |_| {
            let _ = self.core.expire_intervals.send(interval);
        });
        self
    }

    /// Attach a persistence backend and bulk-load its records. Call after
    /// all indexes are set up but before using the store. Loading emits no
    /// events and does not write back to the backend; afterwards every
    /// put/delete is mirrored.
    pub fn persistent(&self, persister: Arc<dyn Persister<T>>) -> Result<()> {
        let mut st = self.core.state.write();
        if st.used {
            panic!("cannot attach persistence to an in-use store");
        }
        st.used = true;
        st.persister = Some(Backend::Plain(Arc::clone(&persister)));

        let st = &mut *st;
        persister.load(&mut |uid, item| {
            self.load_record(st, uid, item, None);
        })
    }

    /// Like [`Store::persistent`] for a backend that reports record
    /// metadata; record sizes land in the wrappers' stats.
    pub fn persistent_meta(&self, persister: Arc<dyn MetaPersister<T>>) -> Result<()> {
        let mut st = self.core.state.write();
        if st.used {
            panic!("cannot attach persistence to an in-use store");
        }
        st.used = true;
        st.persister = Some(Backend::Meta(Arc::clone(&persister)));

        let st = &mut *st;
        persister.meta_load(&mut |uid, item, meta| {
            self.load_record(st, uid, item, Some(meta));
        })
    }

    fn load_record(&self, st: &mut State<T>, uid: Uid, item: T, meta: Option<Meta>) {
        let item = Arc::new(item);
        let values = self.core.compute_values(st, &item);
        let wrap = Arc::new(Wrap::new(item, values));
        wrap.set_uid(uid);
        let loaded = Arc::clone(&wrap);
        self.core.apply_add(st, wrap, false, false);
        if let Some(meta) = meta {
            loaded.stats.lock().size = meta.size;
        }
    }

    /// Place an item into the store, returning the equal item it replaced
    /// (if any).
    ///
    /// On a backend failure the in-memory mutation is still applied;
    /// callers may re-put to retry the mirror.
    pub fn put(&self, item: T) -> Result<Option<Arc<T>>> {
        let mut st = self.core.state.write();
        let (old, err) = self.core.apply_put(&mut st, Arc::new(item), true, true);
        match err {
            Some(e) => Err(e),
            None => Ok(old),
        }
    }

    /// Put every item under a single write-critical section.
    ///
    /// Items whose backend mirror fails remain applied in memory; the
    /// aggregate error reports how many mirrors failed.
    pub fn put_all(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        let mut st = self.core.state.write();
        let mut total = 0;
        let mut failed = 0;
        let mut first: Option<CinnabarError> = None;
        for item in items {
            total += 1;
            let (_, err) = self.core.apply_put(&mut st, Arc::new(item), true, true);
            if let Some(e) = err {
                failed += 1;
                if first.is_none() {
                    first = Some(e);
                }
            }
        }
        match first {
            Some(e) => Err(CinnabarError::BulkPut {
                failed,
                total,
                first: e.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Remove the item equal to the probe, returning it.
    pub fn delete(&self, probe: T) -> Result<Option<Arc<T>>> {
        let mut st = self.core.state.write();
        let (removed, err) = self.core.apply_rm(&mut st, &Arc::new(probe), true);
        if let Some(removed) = &removed {
            st.used = true;
            self.core.publish(Event::Remove, Some(removed), None);
        }
        match err {
            Some(e) => Err(e),
            None => Ok(removed.map(|w| Arc::clone(&w.item))),
        }
    }

    /// Return the stored item equal to the probe.
    pub fn get(&self, probe: T) -> Option<Arc<T>> {
        let st = self.core.state.read();
        let wrap = st.tree.get(&Arc::new(probe))?;
        self.core.access(&wrap, Utc::now());
        Some(Arc::clone(&wrap.item))
    }

    /// Find a simple or compound index to query. The returned view is
    /// benign when the index does not exist: lookups return `None`.
    pub fn in_index(&self, fields: &[&str]) -> IndexView<'_, T> {
        let id = compound_key(fields);
        let st = self.core.state.read();
        let descriptor = st
            .descriptors
            .get(&id)
            .map(|d| (d.id.clone(), d.fields.clone()));
        IndexView::new(&self.core, descriptor)
    }

    /// Shortcut to the primary-key index.
    pub fn in_primary_key(&self) -> IndexView<'_, T> {
        let st = self.core.state.read();
        let descriptor = st
            .primary
            .as_ref()
            .and_then(|id| st.descriptors.get(id))
            .map(|d| (d.id.clone(), d.fields.clone()));
        IndexView::new(&self.core, descriptor)
    }

    /// Walk items from lowest to highest order until the callback returns
    /// false.
    pub fn ascend(&self, mut cb: impl FnMut(&T) -> bool) {
        let st = self.core.state.read();
        st.tree.ascend(|wrap| cb(&wrap.item));
    }

    /// Walk ascending from the first item equal to `at` under the
    /// comparator.
    pub fn ascend_starting(&self, at: T, mut cb: impl FnMut(&T) -> bool) {
        let st = self.core.state.read();
        st.tree.ascend_from(&Arc::new(at), |wrap| cb(&wrap.item));
    }

    /// Walk items from highest to lowest order until the callback returns
    /// false.
    pub fn descend(&self, mut cb: impl FnMut(&T) -> bool) {
        let st = self.core.state.read();
        st.tree.descend(|wrap| cb(&wrap.item));
    }

    /// Walk descending from the last item equal to `at` under the
    /// comparator.
    pub fn descend_starting(&self, at: T, mut cb: impl FnMut(&T) -> bool) {
        let st = self.core.state.read();
        st.tree.descend_from(&Arc::new(at), |wrap| cb(&wrap.item));
    }

    /// Like [`Store::ascend`], passing each wrapper's UID and a stats
    /// snapshot alongside the item.
    pub fn info(&self, mut cb: impl FnMut(&Uid, &T, &Stats) -> bool) {
        let st = self.core.state.read();
        st.tree.ascend(|wrap| {
            let stats = wrap.stats_snapshot();
            cb(wrap.uid(), &wrap.item, &stats)
        });
    }

    /// Delete every expired item, returning how many were removed.
    pub fn expire(&self) -> usize {
        self.core.expire()
    }

    /// Number of items in the store.
    pub fn len(&self) -> usize {
        self.core.state.read().tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field lists of every index, in creation order.
    pub fn indexes(&self) -> Vec<Vec<String>> {
        let st = self.core.state.read();
        let mut out = vec![Vec::new(); st.descriptors.len()];
        for descriptor in st.descriptors.values() {
            out[descriptor.position] = descriptor.fields.clone();
        }
        out
    }

    /// Distinct compound keys of the named index, or `None` for an
    /// unknown index.
    pub fn keys(&self, fields: &[&str]) -> Option<Vec<String>> {
        let id = compound_key(fields);
        let st = self.core.state.read();
        st.descriptors.get(&id)?;
        Some(
            st.buckets
                .get(&id)
                .map(|index| index.keys().cloned().collect())
                .unwrap_or_default(),
        )
    }

    /// Per-key occupancy of the named index. `total_size` is only
    /// populated when the persistence backend reports record metadata.
    pub fn index_stats(&self, fields: &[&str]) -> Option<Vec<IndexStats>> {
        let id = compound_key(fields);
        let st = self.core.state.read();
        st.descriptors.get(&id)?;
        let Some(index) = st.buckets.get(&id) else {
            return Some(Vec::new());
        };
        Some(
            index
                .iter()
                .map(|(key, bucket)| IndexStats {
                    key_parts: split_key(key),
                    count: bucket.len(),
                    total_size: bucket.iter().map(|w| w.stats.lock().size).sum(),
                })
                .collect(),
        )
    }

    /// Register an event handler for an event kind. Handlers run on the
    /// bus dispatch worker, in commit order.
    pub fn on(
        &self,
        event: Event,
        notify: impl Fn(Event, Option<&T>, Option<&T>, &Stats) + Send + Sync + 'static,
    ) {
        self.core.bus.on(event, Arc::new(notify));
    }
}
