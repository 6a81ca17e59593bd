//! Concurrency safety tests: parallel writers and readers over one store.

mod support;

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cinnabar::{Event, Stats};
use support::{item, store, Item};

#[test]
fn test_parallel_writers_serialize() {
    let store = Arc::new(store());

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                store.put(item(worker * 1000 + i, "w", "")).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 200);

    // The tree is consistent: ascending yields strictly increasing keys.
    let mut prev = i64::MIN;
    store.ascend(|i| {
        assert!(i.a > prev);
        prev = i.a;
        true
    });
}

#[test]
fn test_every_commit_produces_one_event() {
    let store = Arc::new(store());
    let (tx, rx) = channel();
    store.on(
        Event::Insert,
        move |_event, _old: Option<&Item>, new: Option<&Item>, _stats: &Stats| {
            tx.send(new.unwrap().a).unwrap();
        },
    );

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                store.put(item(worker * 1000 + i, "w", "")).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut delivered = Vec::new();
    for _ in 0..100 {
        delivered.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered.len(), 100);
}

#[test]
fn test_readers_run_alongside_writers() {
    let store = Arc::new(store());
    for a in 0..100 {
        store.put(item(a, "seed", "")).unwrap();
    }

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for a in 100..200 {
                store.put(item(a, "more", "")).unwrap();
            }
        })
    };

    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for a in 0..100 {
                assert!(store.get(item(a, "", "")).is_some());
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(store.len(), 200);
}
