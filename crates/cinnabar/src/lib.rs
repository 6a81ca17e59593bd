//! Cinnabar: an embeddable, in-memory, ordered, indexed object store.
//!
//! A caller defines opaque items, configures how to order them and how to
//! extract indexed string fields, then stores, looks up, iterates and
//! expires them. The store keeps a primary ordering in a balanced tree,
//! maintains any number of secondary hash indexes over compound string
//! keys, mirrors mutations to an optional persistence backend, and emits
//! insert/update/remove/expiry/access events through a notification bus.
//!
//! # Example
//!
//! ```no_run
//! use cinnabar::Store;
//!
//! #[derive(Debug)]
//! struct Order {
//!     id: String,
//!     customer: String,
//! }
//!
//! let store: Store<Order> = Store::new();
//! store
//!     .set_fielder(|order: &Order, field: &str| match field {
//!         "id" => order.id.clone(),
//!         "customer" => order.customer.clone(),
//!         _ => String::new(),
//!     })
//!     .primary_key(&["id"])
//!     .create_index(&["customer"]);
//!
//! store
//!     .put(Order {
//!         id: "o-1".into(),
//!         customer: "acme".into(),
//!     })
//!     .unwrap();
//!
//! let hits = store.in_index(&["customer"]).lookup(&["acme"]);
//! assert_eq!(hits.unwrap().len(), 1);
//! ```

pub mod expire;
pub mod index;
pub mod prelude;
#[cfg(feature = "reflective")]
pub mod reflective;
mod resolve;
mod store;
mod tree;
mod wrap;

pub use cinnabar_bus::{Event, Happening};
pub use cinnabar_core::{
    compound_key, split_key, CinnabarError, Expirable, Fielded, Indexable, Meta, MetaPersister,
    Orderable, Persister, Result, Stats, Uid, KEY_SEPARATOR,
};
pub use expire::{AgeExpirer, AgeExpirerRequireAll, Expire, ExpireFn, Expirer};
pub use index::{IndexStats, IndexView};
pub use resolve::{CmpFn, FieldFn};
pub use store::{Indexer, Store};
