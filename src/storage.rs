//! String-keyed JSON blob storage.
//!
//! A [`KeyValueStore`] only moves raw strings around. [`JsonStore`] sits on
//! top of it and owns the serialization plus the failure policy: reads fall
//! back to a caller-supplied value, writes log and report `false`. Nothing
//! here is atomic across keys.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Human-readable backend name for logging.
    fn name(&self) -> &'static str;

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store. Everything is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        // Write-then-rename so a crash never leaves a half-written blob.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Typed JSON access over any [`KeyValueStore`].
#[derive(Clone)]
pub struct JsonStore {
    backend: Arc<dyn KeyValueStore>,
}

impl JsonStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Read and parse `key`, surfacing every failure.
    pub async fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get_raw(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serde {
                key: key.to_string(),
                source,
            })
    }

    /// Read and parse `key`; absent, unreadable or malformed data yields
    /// `fallback`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_load(key).await {
            Ok(Some(value)) => {
                debug!("Loaded data from key: {}", key);
                value
            }
            Ok(None) => fallback,
            Err(e) => {
                warn!("Failed to load data, using fallback: {}", e);
                fallback
            }
        }
    }

    /// Serialize and write the whole value. Failures are logged, never raised.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(source) => {
                error!(
                    "Failed to save data: {}",
                    StoreError::Serde {
                        key: key.to_string(),
                        source
                    }
                );
                return false;
            }
        };
        match self.backend.set_raw(key, json).await {
            Ok(()) => {
                info!("Saved data to key: {}", key);
                true
            }
            Err(e) => {
                error!("Failed to save data: {}", e);
                false
            }
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key).await {
            Ok(()) => {
                debug!("Removed key: {}", key);
                true
            }
            Err(e) => {
                error!("Failed to remove data: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for JsonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}
