use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;

use cinnabar_core::Stats;
use parking_lot::RwLock;

use crate::event::{Event, Happening};

/// Queue capacity used by [`HappeningBus::start`] unless overridden.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// An event subscriber. Receives the event kind, the old and new item (each
/// present or absent depending on the kind) and a stats snapshot taken when
/// the happening was enqueued.
pub type NotifyFn<T> = Arc<dyn Fn(Event, Option<&T>, Option<&T>, &Stats) + Send + Sync>;

/// Subscriber lists, one per event kind. Subscribers are appended and never
/// removed.
pub struct Subscribers<T> {
    insert: RwLock<Vec<NotifyFn<T>>>,
    update: RwLock<Vec<NotifyFn<T>>>,
    remove: RwLock<Vec<NotifyFn<T>>>,
    expiry: RwLock<Vec<NotifyFn<T>>>,
    access: RwLock<Vec<NotifyFn<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            insert: RwLock::new(Vec::new()),
            update: RwLock::new(Vec::new()),
            remove: RwLock::new(Vec::new()),
            expiry: RwLock::new(Vec::new()),
            access: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Subscribers<T> {
    fn list(&self, event: Event) -> &RwLock<Vec<NotifyFn<T>>> {
        match event {
            Event::Insert => &self.insert,
            Event::Update => &self.update,
            Event::Remove => &self.remove,
            Event::Expiry => &self.expiry,
            Event::Access => &self.access,
        }
    }

    fn on(&self, event: Event, notify: NotifyFn<T>) {
        self.list(event).write().push(notify);
    }

    fn dispatch(&self, happening: &Happening<T>) {
        let handlers = self.list(happening.event).read().clone();
        for handler in handlers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                handler(
                    happening.event,
                    happening.old.as_deref(),
                    happening.new.as_deref(),
                    &happening.stats,
                );
            }));
            if result.is_err() {
                tracing::error!("subscriber panicked handling {}", happening.event);
            }
        }
    }
}

/// Bounded happening queue with a single dispatch worker.
pub struct HappeningBus<T> {
    tx: SyncSender<Happening<T>>,
    subscribers: Arc<Subscribers<T>>,
}

impl<T: Send + Sync + 'static> HappeningBus<T> {
    /// Start the bus and its dispatch worker. The worker exits when the bus
    /// (and with it the send side of the queue) is dropped.
    pub fn start(capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel::<Happening<T>>(capacity);
        let subscribers = Arc::new(Subscribers::default());

        let worker_subs = Arc::clone(&subscribers);
        thread::Builder::new()
            .name("cinnabar-bus".into())
            .spawn(move || {
                for happening in rx {
                    worker_subs.dispatch(&happening);
                }
                tracing::debug!("happening bus worker stopped");
            })
            .expect("failed to spawn bus worker");

        Self { tx, subscribers }
    }

    /// Register a subscriber for an event kind.
    pub fn on(&self, event: Event, notify: NotifyFn<T>) {
        self.subscribers.on(event, notify);
    }

    /// Enqueue a happening. Blocks when the queue is full; never blocks on
    /// the handlers themselves.
    pub fn publish(&self, happening: Happening<T>) {
        // Send fails only when the worker is gone, i.e. during teardown.
        let _ = self.tx.send(happening);
    }
}
