//! Per-store resolution of ordering, field extraction and expiry.
//!
//! Each concern resolves through a chain: explicit callback, then the
//! capability adapter wired in at construction, then a default. Ordering
//! additionally falls through to the primary-key fields and finally to an
//! arbitrary-but-consistent order over the items' debug representation.
//! Configuration is frozen once the store is in use, so the resolved order
//! is stable for the lifetime of the tree.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cinnabar_core::{compound_key, Stats};
use parking_lot::RwLock;

use crate::expire::Expirer;

/// Comparator callback: returns true when the first item sorts before the
/// second.
pub type CmpFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Field extraction callback: returns the string value of a named field.
pub type FieldFn<T> = Arc<dyn Fn(&T, &str) -> String + Send + Sync>;

pub(crate) struct Resolver<T> {
    comparator: RwLock<Option<CmpFn<T>>>,
    capability_cmp: RwLock<Option<CmpFn<T>>>,
    fielder: RwLock<Option<FieldFn<T>>>,
    capability_fielder: RwLock<Option<FieldFn<T>>>,
    expirer: RwLock<Option<Arc<dyn Expirer<T>>>>,
    capability_expirer: RwLock<Option<Arc<dyn Expirer<T>>>>,
    primary_key: RwLock<Vec<String>>,
    reversed: AtomicBool,
}

impl<T: fmt::Debug> Resolver<T> {
    pub fn new() -> Self {
        Self {
            comparator: RwLock::new(None),
            capability_cmp: RwLock::new(None),
            fielder: RwLock::new(None),
            capability_fielder: RwLock::new(None),
            expirer: RwLock::new(None),
            capability_expirer: RwLock::new(None),
            primary_key: RwLock::new(Vec::new()),
            reversed: AtomicBool::new(false),
        }
    }

    /// Whether one item sorts before another under the resolved order.
    pub fn less(&self, a: &T, b: &T) -> bool {
        let less = if let Some(cmp) = self.comparator.read().as_ref() {
            cmp(a, b)
        } else if let Some(cmp) = self.capability_cmp.read().as_ref() {
            cmp(a, b)
        } else {
            let primary = self.primary_key.read();
            if primary.is_empty() {
                unsure(a, b)
            } else {
                self.fields_value(a, &primary) < self.fields_value(b, &primary)
            }
        };

        if self.reversed.load(Ordering::Relaxed) {
            !less
        } else {
            less
        }
    }

    /// The string value of a named field. Items without any configured
    /// extractor render every field as the empty string.
    pub fn get_field(&self, item: &T, field: &str) -> String {
        if let Some(fielder) = self.fielder.read().as_ref() {
            return fielder(item, field);
        }
        if let Some(fielder) = self.capability_fielder.read().as_ref() {
            return fielder(item, field);
        }
        String::new()
    }

    /// The compound key an item produces for an ordered field list.
    pub fn fields_value(&self, item: &T, fields: &[String]) -> String {
        let parts: Vec<String> = fields.iter().map(|f| self.get_field(item, f)).collect();
        compound_key(&parts)
    }

    /// Whether an item is expired under the resolved expirer. Items with no
    /// expirer never expire.
    pub fn is_expired(&self, item: &T, now: DateTime<Utc>, stats: &Stats) -> bool {
        if let Some(expirer) = self.expirer.read().as_ref() {
            return expirer.is_expired(item, now, stats);
        }
        if let Some(expirer) = self.capability_expirer.read().as_ref() {
            return expirer.is_expired(item, now, stats);
        }
        false
    }

    pub fn set_comparator(&self, cmp: CmpFn<T>) {
        *self.comparator.write() = Some(cmp);
    }

    pub fn set_capability_cmp(&self, cmp: CmpFn<T>) {
        *self.capability_cmp.write() = Some(cmp);
    }

    pub fn set_fielder(&self, fielder: FieldFn<T>) {
        *self.fielder.write() = Some(fielder);
    }

    pub fn set_capability_fielder(&self, fielder: FieldFn<T>) {
        *self.capability_fielder.write() = Some(fielder);
    }

    pub fn set_expirer(&self, expirer: Arc<dyn Expirer<T>>) {
        *self.expirer.write() = Some(expirer);
    }

    pub fn set_capability_expirer(&self, expirer: Arc<dyn Expirer<T>>) {
        *self.capability_expirer.write() = Some(expirer);
    }

    pub fn set_primary_key(&self, fields: Vec<String>) {
        *self.primary_key.write() = fields;
    }

    pub fn set_reversed(&self, reversed: bool) {
        self.reversed.store(reversed, Ordering::Relaxed);
    }
}

/// Arbitrary but consistent total order over items that provide no other
/// ordering, derived from their debug representation.
pub(crate) fn unsure<T: fmt::Debug>(a: &T, b: &T) -> bool {
    format!("{a:?}") < format!("{b:?}")
}
