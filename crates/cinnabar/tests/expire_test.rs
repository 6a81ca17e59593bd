//! Integration tests for expiry: predicate sweeps, expiry events and the
//! capability expirer.

mod support;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cinnabar::{AgeExpirer, Event, Expirable, Expire, Stats, Store};
use support::{item, store, Item};

#[test]
fn test_predicate_expiry_sweep() {
    let store = store();
    let doomed = Arc::new(AtomicI64::new(-1));
    let marker = Arc::clone(&doomed);
    store.set_expirer(
        AgeExpirer::new(None, None, None).with_predicate(Arc::new(
            move |item: &Item, _now: DateTime<Utc>, _stats: &Stats| {
                if item.a == marker.load(Ordering::SeqCst) {
                    Expire::True
                } else {
                    Expire::Null
                }
            },
        )),
    );

    let (tx, rx) = channel();
    store.on(
        Event::Expiry,
        move |_event, old: Option<&Item>, new: Option<&Item>, _stats: &Stats| {
            assert!(new.is_none());
            tx.send(old.unwrap().a).unwrap();
        },
    );

    for a in 1..=4 {
        store.put(item(a, "x", "")).unwrap();
    }

    // Nothing qualifies yet.
    assert_eq!(store.expire(), 0);

    doomed.store(3, Ordering::SeqCst);
    assert_eq!(store.expire(), 1);
    assert_eq!(store.len(), 3);
    assert!(store.get(item(3, "", "")).is_none());
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 3);

    // A second pass with an unchanged clock removes nothing further.
    assert_eq!(store.expire(), 0);

    // The slot is free for re-insertion.
    doomed.store(-1, Ordering::SeqCst);
    store.put(item(3, "back", "")).unwrap();
    assert_eq!(store.len(), 4);
}

#[test]
fn test_expiry_removes_from_indexes() {
    let store = store();
    store.create_index(&["b"]);
    store.set_expirer(|item: &Item, _now: DateTime<Utc>, _stats: &Stats| item.b == "stale");

    store.put(item(1, "stale", "")).unwrap();
    store.put(item(2, "fresh", "")).unwrap();

    assert_eq!(store.expire(), 1);
    assert!(store.in_index(&["b"]).lookup(&["stale"]).is_none());
    assert_eq!(store.in_index(&["b"]).lookup(&["fresh"]).unwrap().len(), 1);
}

#[test]
fn test_capability_expirer() {
    #[derive(Debug)]
    struct Volatile {
        n: i64,
        stale: bool,
    }

    impl Expirable for Volatile {
        fn is_expired(&self, _now: DateTime<Utc>, _stats: &Stats) -> bool {
            self.stale
        }
    }

    let store: Store<Volatile> = Store::new();
    store
        .set_comparator(|a: &Volatile, b: &Volatile| a.n < b.n)
        .with_expirable();

    store.put(Volatile { n: 1, stale: false }).unwrap();
    store.put(Volatile { n: 2, stale: true }).unwrap();

    assert_eq!(store.expire(), 1);
    assert_eq!(store.len(), 1);
    let mut remaining = Vec::new();
    store.ascend(|v| {
        remaining.push(v.n);
        true
    });
    assert_eq!(remaining, vec![1]);
}

#[test]
fn test_items_without_expirer_never_expire() {
    let store = store();
    for a in 0..10 {
        store.put(item(a, "x", "")).unwrap();
    }
    assert_eq!(store.expire(), 0);
    assert_eq!(store.len(), 10);
}

#[test]
#[should_panic(expected = "in-use store")]
fn test_expire_interval_after_use_panics() {
    let store = store();
    store.put(item(1, "one", "")).unwrap();
    store.expire_interval(Duration::from_secs(5));
}
