//! Notification bus for the cinnabar store.
//!
//! Mutations and accesses produce [`Happening`] records. A bounded queue
//! receives them and a single dispatch worker drains the queue, invoking the
//! subscribers registered for each event kind. Producers block only when the
//! queue fills, applying natural backpressure; subscriber panics are trapped
//! so a misbehaving handler cannot take the worker down.

mod bus;
mod event;

pub use bus::{HappeningBus, Subscribers, NotifyFn, DEFAULT_QUEUE_CAPACITY};
pub use event::{Event, Happening};
