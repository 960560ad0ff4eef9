//! Local Storage Module
//!
//! Keyed JSON storage with pluggable backends.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};

/// Raw string-keyed persistence port.
///
/// Production uses [`FileBackend`]; tests inject [`MemoryBackend`] so the
/// account and session stores can be exercised without touching disk.
pub trait StorageBackend: Send + Sync {
    /// Read the raw value for a key. `Ok(None)` means the key is absent.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write the raw value for a key, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// File-per-key backend rooted in the local app data directory.
pub struct FileBackend {
    storage_path: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `<local data dir>/EcoStream`.
    pub fn new() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("EcoStream");

        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }

        debug!("Storage initialized at: {:?}", storage_path);

        Self { storage_path }
    }

    /// Create a backend rooted at an explicit directory.
    pub fn at(storage_path: PathBuf) -> Self {
        if let Err(e) = std::fs::create_dir_all(&storage_path) {
            error!("Failed to create storage directory: {}", e);
        }
        Self { storage_path }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{}.json", key))
    }
}

impl Default for FileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.file_path(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::write(self.file_path(key), value).map_err(|e| StorageError::Io(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.file_path(key);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| StorageError::Io(e.to_string()))?;
            info!("Deleted stored data for key: {}", key);
        }
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Io("storage lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Io("storage lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Io("storage lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Typed JSON store over a [`StorageBackend`].
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
}

impl Storage {
    /// File-backed storage in the local app data directory.
    pub fn on_disk() -> Self {
        Self::with_backend(Arc::new(FileBackend::new()))
    }

    /// In-memory storage (tests).
    pub fn in_memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Serialize and store a value under a key.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.backend.write(key, &json)?;
        debug!("Saved data for key: {}", key);
        Ok(())
    }

    /// Load and deserialize a value. `Ok(None)` means the key is absent;
    /// an unreadable or malformed value is an error for the caller to map.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.backend.read(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Delete stored data for a key.
    pub fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(key)
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        label: String,
        count: u32,
    }

    #[test]
    fn save_then_load_roundtrips() {
        let storage = Storage::in_memory();
        let record = Record {
            label: "depot".into(),
            count: 4,
        };

        storage.save("test.record", &record).unwrap();
        let loaded: Option<Record> = storage.load("test.record").unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn load_missing_key_is_none() {
        let storage = Storage::in_memory();
        let loaded: Option<Record> = storage.load("test.absent").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn load_malformed_value_is_an_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.write("test.bad", "{not json").unwrap();

        let storage = Storage::with_backend(backend);
        let loaded: Result<Option<Record>, _> = storage.load("test.bad");
        assert!(matches!(loaded, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn delete_removes_the_key() {
        let storage = Storage::in_memory();
        storage.save("test.record", &Record { label: "x".into(), count: 1 }).unwrap();
        storage.delete("test.record").unwrap();

        let loaded: Option<Record> = storage.load("test.record").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn delete_absent_key_is_ok() {
        let storage = Storage::in_memory();
        assert!(storage.delete("test.absent").is_ok());
    }

    #[test]
    fn file_backend_roundtrips_and_reports_missing() {
        let dir = std::env::temp_dir().join(format!("ecostream-test-{}", rand::random::<u64>()));
        let backend = FileBackend::at(dir.clone());

        assert_eq!(backend.read("test.key").unwrap(), None);
        backend.write("test.key", "{\"a\":1}").unwrap();
        assert_eq!(backend.read("test.key").unwrap().as_deref(), Some("{\"a\":1}"));
        backend.remove("test.key").unwrap();
        assert_eq!(backend.read("test.key").unwrap(), None);

        std::fs::remove_dir_all(&dir).ok();
    }
}
