//! Session store backends
//!
//! `FileSessionStore` keeps one JSON file per Pi-hole under a cache
//! directory so separate CLI invocations can share a login.
//! `MemorySessionStore` is the in-process variant used by tests.

use async_trait::async_trait;
use pihole_core::{storage_error, PersistedSession, PiholeResult, SessionStore};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Filesystem-backed store: `<dir>/session-<key>.json`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("session-{}.json", key))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, key: &str) -> PiholeResult<Option<PersistedSession>> {
        let path = self.session_path(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error!("Failed to read session file", "file_session_store", e)),
        };

        match serde_json::from_slice::<PersistedSession>(&data) {
            Ok(record) => {
                debug!("Loaded session from {}", path.display());
                Ok(Some(record))
            }
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &str, session: &PersistedSession) -> PiholeResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            storage_error!("Failed to create session directory", "file_session_store", e)
        })?;

        let path = self.session_path(key);
        let json = serde_json::to_vec(session)?;

        // Readers never observe a partial record: write a sibling, then rename.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error!("Failed to write session file", "file_session_store", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error!("Failed to replace session file", "file_session_store", e))?;

        debug!("Saved session to {}", path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PiholeResult<()> {
        match tokio::fs::remove_file(self.session_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error!("Failed to remove session file", "file_session_store", e)),
        }
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, PersistedSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> PiholeResult<Option<PersistedSession>> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, session: &PersistedSession) -> PiholeResult<()> {
        self.sessions
            .write()
            .await
            .insert(key.to_string(), session.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PiholeResult<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}
