//! Key-value backed record collections
//!
//! A [`Repository`] keeps a JSON array of records under one storage key. It
//! reads the array once when opened and writes the whole array back on every
//! mutation. Missing or unreadable storage opens as an empty collection.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// String storage addressed by key
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `key`, if any
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value stored under `key`
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Backend that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Backend that stores each key as `<root>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// A record with a stable identifier
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn record_id(&self) -> &str;
}

/// Ordered collection of records persisted under a single key
pub struct Repository<T: Record> {
    backend: Arc<dyn StorageBackend>,
    key: String,
    records: RwLock<Vec<T>>,
}

impl<T: Record> Repository<T> {
    /// Opens the collection stored under `key`
    pub async fn open(backend: Arc<dyn StorageBackend>, key: &str) -> Self {
        let records = Self::load(backend.as_ref(), key).await;
        Self {
            backend,
            key: key.to_string(),
            records: RwLock::new(records),
        }
    }

    async fn load(backend: &dyn StorageBackend, key: &str) -> Vec<T> {
        let raw = match backend.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read stored records, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(records) => {
                tracing::debug!(key, count = records.len(), "Loaded stored records");
                records
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Stored records are corrupt, starting empty");
                Vec::new()
            }
        }
    }

    async fn persist(&self, records: &[T]) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(records)?;
        self.backend.write(&self.key, &encoded).await
    }

    /// Every record, in insertion order
    pub async fn all(&self) -> Vec<T> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.record_id() == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Replaces the whole collection
    pub async fn save_all(&self, records: Vec<T>) -> Result<(), StorageError> {
        let mut current = self.records.write().await;
        self.persist(&records).await?;
        *current = records;
        Ok(())
    }

    /// Replaces the record with the same id, or appends it
    pub async fn upsert(&self, record: T) -> Result<(), StorageError> {
        let mut current = self.records.write().await;
        let mut next = current.clone();
        match next.iter_mut().find(|r| r.record_id() == record.record_id()) {
            Some(existing) => *existing = record,
            None => next.push(record),
        }
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    /// Removes the record with `id`. Returns whether one was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut current = self.records.write().await;
        let before = current.len();
        let next: Vec<T> = current.iter().filter(|r| r.record_id() != id).cloned().collect();
        if next.len() == before {
            return Ok(false);
        }
        self.persist(&next).await?;
        *current = next;
        Ok(true)
    }

    /// Appends `record` unless one with the same id exists. Returns whether it
    /// was inserted.
    pub async fn insert_if_absent(&self, record: T) -> Result<bool, StorageError> {
        let mut current = self.records.write().await;
        if current.iter().any(|r| r.record_id() == record.record_id()) {
            return Ok(false);
        }
        let mut next = current.clone();
        next.push(record);
        self.persist(&next).await?;
        *current = next;
        Ok(true)
    }

    /// Applies `f` to every record matching `predicate` and persists once
    ///
    /// Selection and update happen under one write lock, so concurrent callers
    /// never update the same record twice. Returns the updated records.
    pub async fn update_where<P, F>(&self, predicate: P, mut f: F) -> Result<Vec<T>, StorageError>
    where
        P: Fn(&T) -> bool,
        F: FnMut(&mut T),
    {
        let mut current = self.records.write().await;
        let mut next = current.clone();
        let mut updated = Vec::new();
        for record in next.iter_mut() {
            if predicate(record) {
                f(record);
                updated.push(record.clone());
            }
        }
        if updated.is_empty() {
            return Ok(updated);
        }
        self.persist(&next).await?;
        *current = next;
        Ok(updated)
    }

    /// Applies `f` to the record with `id` and persists the result
    pub async fn update<F>(&self, id: &str, f: F) -> Result<Option<T>, StorageError>
    where
        F: FnOnce(&mut T),
    {
        let mut current = self.records.write().await;
        let mut next = current.clone();
        let Some(record) = next.iter_mut().find(|r| r.record_id() == id) else {
            return Ok(None);
        };
        f(record);
        let updated = record.clone();
        self.persist(&next).await?;
        *current = next;
        Ok(Some(updated))
    }
}
