//! JSON-file persistence backend for the cinnabar store.
//!
//! Stores one file per record, named `<uid>.json`, inside a folder. Each
//! file holds an envelope `{id, type, item}` where `type` is an opaque
//! label checked at load time, so a folder accidentally shared between
//! stores of different item types does not load foreign records. Items
//! must be serde-serializable to use this backend.

use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use cinnabar_core::{CinnabarError, Meta, MetaPersister, Persister, Result, Uid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const RECORD_EXT: &str = "json";

#[derive(Serialize, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    item: serde_json::Value,
}

/// File-per-record persister rooted at a folder.
pub struct FilePersist<T> {
    folder: PathBuf,
    label: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> FilePersist<T> {
    /// Open (creating if needed) a record folder. The folder is probed
    /// with a throwaway write so an unwritable location fails here rather
    /// than on the first save.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self> {
        Self::with_label(folder, std::any::type_name::<T>())
    }

    /// Like [`FilePersist::open`] with an explicit type label for the
    /// record envelopes.
    pub fn with_label(folder: impl AsRef<Path>, label: impl Into<String>) -> Result<Self> {
        let folder = folder.as_ref().to_path_buf();
        fs::create_dir_all(&folder)?;

        let probe = folder.join(".probe");
        fs::write(&probe, b"probe")?;
        let _ = fs::remove_file(&probe);

        Ok(Self {
            folder,
            label: label.into(),
            _marker: PhantomData,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn record_path(&self, id: &Uid) -> PathBuf {
        self.folder.join(format!("{id}.{RECORD_EXT}"))
    }

    fn encode(&self, id: &Uid, item: &T) -> Result<Vec<u8>> {
        let item = serde_json::to_value(item)
            .map_err(|e| CinnabarError::Serialization(e.to_string()))?;
        let envelope = Envelope {
            id: id.to_string(),
            kind: self.label.clone(),
            item,
        };
        serde_json::to_vec(&envelope).map_err(|e| CinnabarError::Serialization(e.to_string()))
    }

    fn write_record(&self, id: &Uid, item: &T) -> Result<u64> {
        let data = self.encode(id, item)?;
        fs::write(self.record_path(id), &data)?;
        Ok(data.len() as u64)
    }

    /// Enumerate record files, decoding each envelope. Files that are not
    /// records (wrong name shape, unreadable, foreign type label) are
    /// skipped with a warning.
    fn load_records(&self, mut found: impl FnMut(Uid, T, Meta)) -> Result<()> {
        for entry in fs::read_dir(&self.folder)? {
            let path = entry?.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.len() == cinnabar_core::uid::UID_LEN)
                    .unwrap_or(false);
            if !is_record {
                continue;
            }

            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };

            let envelope: Envelope = match serde_json::from_slice(&data) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("undecodable record {}: {}", path.display(), e);
                    continue;
                }
            };

            if envelope.kind != self.label {
                tracing::warn!(
                    "skipping record {} of foreign type {}",
                    path.display(),
                    envelope.kind
                );
                continue;
            }

            let item: T = match serde_json::from_value(envelope.item) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("unmarshalable item in {}: {}", path.display(), e);
                    continue;
                }
            };

            found(
                Uid::from(envelope.id),
                item,
                Meta {
                    size: data.len() as u64,
                },
            );
        }
        Ok(())
    }
}

impl<T> Persister<T> for FilePersist<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn save(&self, id: &Uid, item: &T) -> Result<()> {
        self.write_record(id, item).map(|_| ())
    }

    fn load(&self, load: &mut dyn FnMut(Uid, T)) -> Result<()> {
        self.load_records(|id, item, _meta| load(id, item))
    }

    fn remove(&self, id: &Uid) -> Result<()> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<T> MetaPersister<T> for FilePersist<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn meta_save(&self, id: &Uid, item: &T) -> Result<Meta> {
        let size = self.write_record(id, item)?;
        Ok(Meta { size })
    }

    fn meta_load(&self, load: &mut dyn FnMut(Uid, T, Meta)) -> Result<()> {
        self.load_records(load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        value: i64,
    }

    fn record(id: &str, value: i64) -> Record {
        Record {
            id: id.into(),
            value,
        }
    }

    fn uid() -> Uid {
        Uid::generate()
    }

    fn storage(temp: &TempDir) -> FilePersist<Record> {
        FilePersist::with_label(temp.path(), "record").unwrap()
    }

    #[test]
    fn test_save_load_remove_roundtrip() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let a = uid();
        let b = uid();
        storage.save(&a, &record("a", 1)).unwrap();
        storage.save(&b, &record("b", 2)).unwrap();

        assert!(temp.path().join(format!("{a}.json")).exists());

        let mut loaded = Vec::new();
        storage
            .load(&mut |id, item: Record| loaded.push((id, item)))
            .unwrap();
        loaded.sort_by(|x, y| x.1.id.cmp(&y.1.id));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], (a.clone(), record("a", 1)));
        assert_eq!(loaded[1], (b, record("b", 2)));

        storage.remove(&a).unwrap();
        // Removing twice is not an error.
        storage.remove(&a).unwrap();

        let mut remaining = 0;
        storage.load(&mut |_, _: Record| remaining += 1).unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_save_replaces_record() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let id = uid();
        storage.save(&id, &record("a", 1)).unwrap();
        storage.save(&id, &record("a", 9)).unwrap();

        let mut loaded = Vec::new();
        storage
            .load(&mut |_, item: Record| loaded.push(item))
            .unwrap();
        assert_eq!(loaded, vec![record("a", 9)]);
    }

    #[test]
    fn test_foreign_files_are_skipped() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        storage.save(&uid(), &record("a", 1)).unwrap();

        // Wrong name shape, wrong extension, undecodable content, foreign
        // type label.
        fs::write(temp.path().join("notes.txt"), b"not a record").unwrap();
        fs::write(temp.path().join("short.json"), b"{}").unwrap();
        fs::write(
            temp.path().join("AB2345cdefgh.json"),
            b"{ this is not json",
        )
        .unwrap();
        fs::write(
            temp.path().join("CD2345cdefgh.json"),
            br#"{"id":"CD2345cdefgh","type":"other","item":{}}"#,
        )
        .unwrap();

        let mut count = 0;
        storage.load(&mut |_, _: Record| count += 1).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_meta_reports_file_size() {
        let temp = TempDir::new().unwrap();
        let storage = storage(&temp);

        let id = uid();
        let meta = storage.meta_save(&id, &record("a", 1)).unwrap();
        let on_disk = fs::metadata(temp.path().join(format!("{id}.json")))
            .unwrap()
            .len();
        assert_eq!(meta.size, on_disk);

        let mut metas = Vec::new();
        storage
            .meta_load(&mut |_, _: Record, meta| metas.push(meta))
            .unwrap();
        assert_eq!(metas, vec![Meta { size: on_disk }]);
    }
}
