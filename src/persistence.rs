//! Key-value persistence for whole collections.
//!
//! Each collection is serialized as one JSON document under a fixed key.
//! Reads degrade to an empty collection when the key is absent or the
//! payload is malformed.
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, error, info, trace, warn};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::{DeskError, Result};

/// Key under which the note list is stored.
pub const NOTES_KEY: &str = "notes";
/// Key under which daily check-ins are stored.
pub const CHECKINS_KEY: &str = "checkins";
/// Key under which the media library is stored.
pub const BOOKS_KEY: &str = "books";

/// Minimal string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Stores every key as `<dir>/<key>.json`, written atomically.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            debug!("Data directory does not exist, creating: {}", dir.display());
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create data directory: {}", e);
                DeskError::DirectoryError { path: dir.clone() }
            })?;
        }
        info!("Opened key-value store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            trace!("No stored value for key '{}'", key);
            return Ok(None);
        }
        let value = fs::read_to_string(&path).map_err(|e| {
            error!("Failed to read {}: {}", path.display(), e);
            DeskError::Io(e)
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);

        // Write to a sibling temp file and rename so readers never see a
        // half-written document.
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            DeskError::Io(e)
        })?;
        temp_file.write_all(value.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(&path).map_err(|e| {
            error!("Failed to persist file {}: {}", path.display(), e.error);
            DeskError::Io(e.error)
        })?;

        trace!("Stored {} bytes under key '{}'", value.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// In-process store, used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| DeskError::LockAcquisitionFailed {
                message: "Failed to acquire lock on memory store".to_string(),
            })?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| DeskError::LockAcquisitionFailed {
                message: "Failed to acquire lock on memory store".to_string(),
            })?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| DeskError::LockAcquisitionFailed {
                message: "Failed to acquire lock on memory store".to_string(),
            })?;
        values.remove(key);
        Ok(())
    }
}

/// Reads the collection stored under `key`.
///
/// Missing keys, unreadable storage and malformed JSON all yield an empty
/// collection; the latter two are logged.
pub fn load_collection<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("No '{}' collection stored, starting empty", key);
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to read '{}' collection, starting empty: {}", key, e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => {
            debug!("Loaded {} items from '{}'", items.len(), key);
            items
        }
        Err(e) => {
            warn!("Malformed '{}' collection treated as absent: {}", key, e);
            Vec::new()
        }
    }
}

/// Serializes the full collection under `key`.
pub fn save_collection<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    items: &[T],
) -> Result<()> {
    let json = serde_json::to_string(items).map_err(|e| {
        error!("Failed to serialize '{}' collection: {}", key, e);
        DeskError::Serialization(e)
    })?;
    store.set(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Note;

    #[test]
    fn missing_key_loads_empty() {
        let store = MemoryKvStore::new();
        let notes: Vec<Note> = load_collection(&store, NOTES_KEY);
        assert!(notes.is_empty());
    }

    #[test]
    fn malformed_payload_is_treated_as_absent() {
        let store = MemoryKvStore::new();
        store.set(NOTES_KEY, "{not json").unwrap();
        let notes: Vec<Note> = load_collection(&store, NOTES_KEY);
        assert!(notes.is_empty());

        store.set(NOTES_KEY, r#"{"an":"object"}"#).unwrap();
        let notes: Vec<Note> = load_collection(&store, NOTES_KEY);
        assert!(notes.is_empty());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let notes = vec![Note::new("persisted".into(), vec!["a".into()])];

        {
            let store = FileKvStore::open(dir.path().join("data")).unwrap();
            save_collection(&store, NOTES_KEY, &notes).unwrap();
        }

        let store = FileKvStore::open(dir.path().join("data")).unwrap();
        let loaded: Vec<Note> = load_collection(&store, NOTES_KEY);
        assert_eq!(loaded, notes);

        store.remove(NOTES_KEY).unwrap();
        assert!(store.get(NOTES_KEY).unwrap().is_none());
        store.remove(NOTES_KEY).unwrap();
    }
}
