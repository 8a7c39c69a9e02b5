//! Component F: a crash-safe, TTL-evicting `(channel, user, thread) →
//! sessionId` map persisted as a single JSON file.
//!
//! I/O errors are mapped to `AgentError::Io` with path context; all reads
//! and writes go through `tokio::fs` so nothing blocks the async runtime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AgentError, AgentResult};
use crate::types::{SessionEntry, SessionMapKey, now_millis};

/// Default entry lifetime: 7 days.
pub const DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// An in-memory mirror of the on-disk session map, flushed atomically on
/// every mutation.
pub struct SessionMap {
    path: PathBuf,
    ttl_ms: i64,
    entries: HashMap<String, SessionEntry>,
}

impl SessionMap {
    /// Load the map from `path`. A missing, corrupted, or unparseable file
    /// is treated as an empty store — never an error.
    pub async fn load(path: impl Into<PathBuf>, ttl_ms: i64) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<HashMap<String, SessionEntry>>(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        Self { path, ttl_ms, entries }
    }

    /// The session id for `key`, or `None` if absent or expired.
    #[must_use]
    pub fn get(&self, key: &SessionMapKey) -> Option<String> {
        let entry = self.entries.get(&key.to_key_string())?;
        if self.is_expired(entry) { None } else { Some(entry.session_id.clone()) }
    }

    /// Purge expired entries, insert the new one, and rewrite the file
    /// atomically.
    pub async fn set(&mut self, key: &SessionMapKey, session_id: impl Into<String>) -> AgentResult<()> {
        self.purge_expired();
        self.entries.insert(key.to_key_string(), SessionEntry { session_id: session_id.into(), updated_at: now_millis() });
        self.flush().await
    }

    /// Remove `key` if present and rewrite the file. A no-op (no write) if
    /// the key was already absent.
    pub async fn delete(&mut self, key: &SessionMapKey) -> AgentResult<()> {
        if self.entries.remove(&key.to_key_string()).is_some() { self.flush().await } else { Ok(()) }
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        now_millis() - entry.updated_at > self.ttl_ms
    }

    fn purge_expired(&mut self) {
        let ttl = self.ttl_ms;
        let now = now_millis();
        self.entries.retain(|_, e| now - e.updated_at <= ttl);
    }

    async fn flush(&self) -> AgentResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| AgentError::from_io(e, parent))?;
        }
        let bytes = serde_json::to_vec_pretty(&self.entries).map_err(|e| AgentError::Io { message: e.to_string() })?;
        let tmp_path = tmp_path_for(&self.path);
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| AgentError::from_io(e, &tmp_path))?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| AgentError::from_io(e, &self.path))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().and_then(|n| n.to_str()).unwrap_or("session-map").to_string();
    name.push_str(&format!(".tmp.{}", now_millis()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(thread: Option<&str>) -> SessionMapKey {
        SessionMapKey::new("tg", "u1", thread.map(str::to_string))
    }

    #[tokio::test]
    async fn set_then_get_returns_the_session_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut map = SessionMap::load(&path, DEFAULT_TTL_MS).await;
        map.set(&key(None), "s-1").await.unwrap();
        assert_eq!(map.get(&key(None)).as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn delete_then_get_returns_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut map = SessionMap::load(&path, DEFAULT_TTL_MS).await;
        map.set(&key(None), "s-1").await.unwrap();
        map.delete(&key(None)).await.unwrap();
        assert!(map.get(&key(None)).is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut map = SessionMap::load(&path, 1).await;
        map.set(&key(None), "s-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(map.get(&key(None)).is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_purged_from_disk_on_next_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut map = SessionMap::load(&path, 1).await;
        map.set(&key(Some("a")), "s-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        map.set(&key(Some("b")), "s-2").await.unwrap();

        let reloaded = SessionMap::load(&path, 1).await;
        assert!(reloaded.get(&key(Some("a"))).is_none());
    }

    #[tokio::test]
    async fn a_corrupted_file_loads_as_an_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let map = SessionMap::load(&path, DEFAULT_TTL_MS).await;
        assert!(map.get(&key(None)).is_none());
    }

    #[tokio::test]
    async fn reload_yields_the_same_logical_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let mut map = SessionMap::load(&path, DEFAULT_TTL_MS).await;
        map.set(&key(None), "s-1").await.unwrap();
        let reloaded = SessionMap::load(&path, DEFAULT_TTL_MS).await;
        assert_eq!(reloaded.get(&key(None)).as_deref(), Some("s-1"));
    }
}
