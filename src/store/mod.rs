//! Durable key-value state
//!
//! The client keeps three pieces of durable state: the session id, the bearer
//! credential and the cached user profile. Each is a single key-value pair,
//! read when an operation needs it and never cached in memory beyond that.

mod auth;
mod session;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use auth::AuthStore;
pub use session::{SessionStore, generate_session_id};

use crate::{Error, Result};

/// Key holding the conversation session id
pub const SESSION_ID_KEY: &str = "session_id";

/// Key holding the bearer credential
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Key holding the JSON-encoded user profile
pub const USER_KEY: &str = "user";

/// Narrow storage interface the client reads and writes durable state through
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be persisted
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error
    ///
    /// # Errors
    ///
    /// Returns error if the removal cannot be persisted
    fn remove(&self, key: &str) -> Result<()>;

    /// Return the current non-empty value of `key`, or store `value` and
    /// return it. The check and the write happen under one lock.
    ///
    /// # Errors
    ///
    /// Returns error if the new value cannot be persisted
    fn get_or_insert(&self, key: &str, value: &str) -> Result<String>;
}

/// Shared handle to a key-value store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Ephemeral in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store behind a shared handle
    #[must_use]
    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?
            .remove(key);
        Ok(())
    }

    fn get_or_insert(&self, key: &str, value: &str) -> Result<String> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(occupy(&mut entries, key, value).0)
    }
}

/// Fill `key` unless it already holds a non-empty value; reports whether it wrote
fn occupy(entries: &mut BTreeMap<String, String>, key: &str, value: &str) -> (String, bool) {
    match entries.get(key) {
        Some(existing) if !existing.is_empty() => (existing.clone(), false),
        _ => {
            entries.insert(key.to_string(), value.to_string());
            (value.to_string(), true)
        }
    }
}

/// Store persisted as a single JSON object on disk
///
/// Every mutation rewrites the file through a temporary sibling and a rename,
/// so a crash never leaves a half-written state file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries if the file exists
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened state file");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn get_or_insert(&self, key: &str, value: &str) -> Result<String> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let (current, inserted) = occupy(&mut entries, key, value);
        if inserted {
            self.persist(&entries)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").is_none());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));

        store.remove("k").unwrap();
        assert!(store.get("k").is_none());

        // removing a missing key is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(SESSION_ID_KEY, "session_1_abc").unwrap();
            store.set(ACCESS_TOKEN_KEY, "tok").unwrap();
            store.remove(ACCESS_TOKEN_KEY).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(SESSION_ID_KEY).as_deref(), Some("session_1_abc"));
        assert!(reopened.get(ACCESS_TOKEN_KEY).is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_get_or_insert_keeps_existing_value() {
        let store = MemoryStore::new();
        assert_eq!(store.get_or_insert("k", "first").unwrap(), "first");
        assert_eq!(store.get_or_insert("k", "second").unwrap(), "first");

        // an empty value counts as unset
        store.set("e", "").unwrap();
        assert_eq!(store.get_or_insert("e", "filled").unwrap(), "filled");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let file = FileStore::open(&path).unwrap();
        assert_eq!(file.get_or_insert("k", "first").unwrap(), "first");
        assert_eq!(file.get_or_insert("k", "second").unwrap(), "first");
        assert_eq!(FileStore::open(&path).unwrap().get("k").as_deref(), Some("first"));
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(FileStore::open(&path).is_err());
    }
}
