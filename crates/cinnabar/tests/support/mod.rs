//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use cinnabar::{CinnabarError, Meta, MetaPersister, Persister, Result, Store, Uid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub a: i64,
    pub b: String,
    pub c: String,
}

pub fn item(a: i64, b: &str, c: &str) -> Item {
    Item {
        a,
        b: b.into(),
        c: c.into(),
    }
}

/// A store ordered by `a` with fields `a`, `b`, `c` extractable.
pub fn store() -> Store<Item> {
    let store: Store<Item> = Store::new();
    store
        .set_comparator(|x: &Item, y: &Item| x.a < y.a)
        .set_fielder(|item: &Item, field: &str| match field {
            "a" => item.a.to_string(),
            "b" => item.b.clone(),
            "c" => item.c.clone(),
            _ => String::new(),
        });
    store
}

/// In-memory persister storing records as JSON, for testing the mirror
/// path without touching disk.
#[derive(Default)]
pub struct MemoryPersist {
    records: Mutex<HashMap<String, Vec<u8>>>,
    /// Saves of items whose `b` field equals this value fail.
    fail_on: Option<String>,
}

impl MemoryPersist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(b: &str) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_on: Some(b.into()),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl Persister<Item> for MemoryPersist {
    fn save(&self, id: &Uid, item: &Item) -> Result<()> {
        self.meta_save(id, item).map(|_| ())
    }

    fn load(&self, load: &mut dyn FnMut(Uid, Item)) -> Result<()> {
        self.meta_load(&mut |id, item, _meta| load(id, item))
    }

    fn remove(&self, id: &Uid) -> Result<()> {
        self.records.lock().unwrap().remove(id.as_str());
        Ok(())
    }
}

impl MetaPersister<Item> for MemoryPersist {
    fn meta_save(&self, id: &Uid, item: &Item) -> Result<Meta> {
        if self.fail_on.as_deref() == Some(item.b.as_str()) {
            return Err(CinnabarError::Persist(format!("refusing to save {}", item.b)));
        }
        let data = serde_json::to_vec(item)
            .map_err(|e| CinnabarError::Serialization(e.to_string()))?;
        let size = data.len() as u64;
        self.records.lock().unwrap().insert(id.to_string(), data);
        Ok(Meta { size })
    }

    fn meta_load(&self, load: &mut dyn FnMut(Uid, Item, Meta)) -> Result<()> {
        for (id, data) in self.records.lock().unwrap().iter() {
            let item: Item = serde_json::from_slice(data)
                .map_err(|e| CinnabarError::Load(e.to_string()))?;
            load(
                Uid::from(id.as_str()),
                item,
                Meta {
                    size: data.len() as u64,
                },
            );
        }
        Ok(())
    }
}
