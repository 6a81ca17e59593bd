use std::fmt;
use std::sync::Arc;

use cinnabar_core::Stats;

/// A kind of event emitted by the store, see `Store::on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// An item was inserted for the first time.
    Insert,
    /// An existing item was replaced with a new item.
    Update,
    /// An existing item was deleted.
    Remove,
    /// An item was removed because it expired.
    Expiry,
    /// An item was surfaced by a read operation.
    Access,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Insert => write!(f, "Insert event"),
            Event::Update => write!(f, "Update event"),
            Event::Remove => write!(f, "Remove event"),
            Event::Expiry => write!(f, "Expiry event"),
            Event::Access => write!(f, "Access event"),
        }
    }
}

/// A record placed on the notification queue describing an event and its
/// old/new/stats payload.
pub struct Happening<T> {
    pub event: Event,
    pub old: Option<Arc<T>>,
    pub new: Option<Arc<T>>,
    pub stats: Stats,
}
