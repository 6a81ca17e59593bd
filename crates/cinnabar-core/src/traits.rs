//! Host capabilities an item type may implement.
//!
//! A store can be driven entirely by explicit callbacks, but item types that
//! implement these traits can be wired in once at construction instead
//! (`Store::for_indexable`). Any subset is fine; the store resolves each
//! concern independently.

use chrono::{DateTime, Utc};

use crate::stats::Stats;

/// Strict weak ordering between two items of the same type.
pub trait Orderable {
    /// Returns true when `self` sorts before `other`. Two items where
    /// neither is less than the other are considered equal by the store.
    fn less(&self, other: &Self) -> bool;
}

/// Field extraction for index keys.
pub trait Fielded {
    /// Returns the string value of the named field. Unknown fields should
    /// render as the empty string.
    fn get_field(&self, field: &str) -> String;
}

/// Per-item expiry decision.
pub trait Expirable {
    fn is_expired(&self, now: DateTime<Utc>, stats: &Stats) -> bool;
}

/// An item that can be both ordered and indexed.
pub trait Indexable: Orderable + Fielded {}

impl<T: Orderable + Fielded> Indexable for T {}
