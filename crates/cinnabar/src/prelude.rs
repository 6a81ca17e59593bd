//! Convenience re-exports for store users.

pub use crate::{
    AgeExpirer, AgeExpirerRequireAll, CinnabarError, Event, Expirable, Expire, ExpireFn, Expirer,
    Fielded, IndexStats, IndexView, Indexable, Indexer, Meta, MetaPersister, Orderable, Persister,
    Result, Stats, Store, Uid,
};
