//! JSON-file storage implementation.
//!
//! The whole store is one JSON object on disk. Every write rewrites the
//! document through a temp file in the same directory followed by a
//! rename, so readers never observe a torn file.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::KeyValueStore;

/// File-backed key-value store.
pub struct FileStore {
    path: PathBuf,
    /// Loaded lazily on first access, then kept in sync with the file.
    cache: Mutex<Option<Map<String, Value>>>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> StoreResult<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Corrupt(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
            Err(e) => Err(StoreError::Corrupt(format!("{}: {}", path.display(), e))),
        }
    }

    async fn persist(&self, document: &Map<String, Value>) -> StoreResult<()> {
        let serialized = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::serde("<document>", e))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &serialized))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!(path = %self.path.display(), keys = document.len(), "store persisted");
        Ok(())
    }

    /// Apply `mutate` to a copy of the document, persist it, and only then
    /// commit it to the cache.
    async fn write_with<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let mut guard = self.cache.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path).await?);
        }

        let mut next = guard.clone().unwrap_or_default();
        mutate(&mut next);
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(())
    }

    async fn read_with<T, F>(&self, read: F) -> StoreResult<T>
    where
        F: FnOnce(&Map<String, Value>) -> T,
    {
        let mut guard = self.cache.lock().await;
        match guard.as_ref() {
            Some(document) => Ok(read(document)),
            None => {
                let document = Self::load(&self.path).await?;
                let result = read(&document);
                *guard = Some(document);
                Ok(result)
            }
        }
    }
}

fn write_atomic(path: &Path, content: &str) -> StoreResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(content.as_bytes())?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.read_with(|document| document.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.write_with(|document| {
            document.insert(key.to_string(), value);
        })
        .await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StoreResult<()> {
        self.write_with(|document| {
            for (key, value) in entries {
                document.insert(key, value);
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.write_with(|document| {
            document.remove(key);
        })
        .await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.write_with(|document| document.clear()).await
    }

    async fn snapshot(&self) -> StoreResult<Map<String, Value>> {
        self.read_with(|document| document.clone()).await
    }
}
