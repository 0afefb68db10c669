//! Persisted key-value backends for the cache store.
//!
//! The cache is written against the small async `Storage` trait so the
//! engine does not care where entries live. `FileStorage` keeps one JSON
//! file per key under a cache directory; `MemoryStorage` backs tests and
//! ephemeral use.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Application name used for the default cache directory path
const APP_NAME: &str = "holdsync";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Async key-value medium holding serialized cache entries.
///
/// Keys are flat strings; values are opaque to the backend (the cache
/// layer serializes entries to JSON before they get here).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError>;
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError>;
}

// ============================================================================
// File-backed storage
// ============================================================================

/// One JSON file per key under a cache directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Open storage under the platform cache directory
    /// (e.g. `~/.cache/holdsync`).
    pub fn open_default() -> Result<Self, StorageError> {
        let base = dirs::cache_dir()
            .ok_or_else(|| StorageError::Unavailable("no cache directory".to_string()))?;
        Self::new(base.join(APP_NAME))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

/// Keep keys filesystem-safe. Cache keys are generated from a fixed
/// namespace prefix plus ids/symbols, so this rarely has to rewrite
/// anything.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(stem) = name.to_string_lossy().strip_suffix(".json") {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory storage
// ============================================================================

/// HashMap-backed storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned lock".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned lock".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned lock".to_string()))?;
        entries.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned lock".to_string()))?;
        Ok(entries.keys().cloned().collect())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned lock".to_string()))?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
