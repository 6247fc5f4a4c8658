//! Session identity: a durable per-tab `sessionId` plus a fresh
//! `pageSessionId` per mount.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Durable string storage scoped to one tab (or one CLI "tab" on disk).
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("MemoryStore poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("MemoryStore poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("MemoryStore poisoned")
            .remove(key);
        Ok(())
    }
}

/// JSON object on disk, one file per store.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<cache dir>/feedlab/session.json`
    pub fn default_location() -> Self {
        Self::new(get_root_store_dir().join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), %err, "discarding unreadable session store");
            HashMap::new()
        })
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().expect("FileStore poisoned");
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("FileStore poisoned");
        let mut entries = self.read_all();
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().expect("FileStore poisoned");
        let mut entries = self.read_all();
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

pub fn get_root_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("feedlab")
}

/// Read the stored session id, creating and persisting one on first use.
///
/// A store that refuses the write still yields a usable id for this
/// page-view; it just won't survive a reload.
pub fn session_id(store: &dyn SessionStore, key: &str) -> String {
    if let Some(existing) = store.get(key).filter(|id| !id.trim().is_empty()) {
        return existing;
    }

    let fresh = Uuid::new_v4().to_string();
    match store.set(key, &fresh) {
        Ok(()) => debug!(session_id = %fresh, "created session id"),
        Err(err) => warn!(%err, "session id not persisted"),
    }
    fresh
}

pub fn page_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_created_once_and_reused() {
        let store = MemoryStore::new();
        let first = session_id(&store, "k");
        let second = session_id(&store, "k");
        assert_eq!(first, second);
        assert_eq!(store.get("k").as_deref(), Some(first.as_str()));
    }

    #[test]
    fn blank_stored_id_is_replaced() {
        let store = MemoryStore::new();
        store.set("k", "  ").unwrap();
        let id = session_id(&store, "k");
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn page_session_ids_are_unique() {
        assert_ne!(page_session_id(), page_session_id());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("feedlab-store-{}", Uuid::new_v4()));
        let path = dir.join("session.json");

        let id = session_id(&FileStore::new(&path), "feedlab.sessionId");
        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("feedlab.sessionId"), Some(id));

        reopened.remove("feedlab.sessionId").unwrap();
        assert_eq!(reopened.get("feedlab.sessionId"), None);
        let _ = std::fs::remove_dir_all(dir);
    }
}
