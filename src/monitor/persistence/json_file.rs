// SPDX-License-Identifier: Apache-2.0

//! JSON file-based state store with atomic writes.
//!
//! The whole state is rewritten on every update using a write-to-temp-then-rename
//! strategy, so a crash never leaves a half-written file behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::schema::{MonitorState, PERSISTED_STATE_VERSION, PersistedStateV1};
use super::store::StateStore;
use crate::monitor::error::{Error, Result};

/// A state store backed by a single JSON file.
#[derive(Clone)]
pub struct JsonFileStateStore {
    path: PathBuf,
    state: Arc<RwLock<PersistedStateV1>>,
    // Serializes writers so renames land in update order
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStateStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path)
                .map_err(|e| Error::StateStore(format!("failed to open state file: {}", e)))?;
            let state: PersistedStateV1 = serde_json::from_reader(BufReader::new(file))
                .map_err(|e| Error::StateStore(format!("failed to parse state file: {}", e)))?;
            if state.version != PERSISTED_STATE_VERSION {
                return Err(Error::StateStore(format!(
                    "unsupported state file version {} (expected {})",
                    state.version, PERSISTED_STATE_VERSION
                )));
            }
            state
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent).map_err(|e| {
                        Error::StateStore(format!("failed to create state directory: {}", e))
                    })?;
                }
            }
            PersistedStateV1::default()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Result<PersistedStateV1> {
        let state = self
            .state
            .read()
            .map_err(|e| Error::StateStore(e.to_string()))?;
        Ok(state.clone())
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get_state(
        &self,
        connection_id: &str,
        stream_key: &str,
    ) -> Result<Option<MonitorState>> {
        let state = self
            .state
            .read()
            .map_err(|e| Error::StateStore(e.to_string()))?;
        Ok(state.get(connection_id, stream_key).cloned())
    }

    async fn set_state(
        &self,
        connection_id: &str,
        stream_key: &str,
        byte_offset: u64,
        fingerprint: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        {
            let mut state = self
                .state
                .write()
                .map_err(|e| Error::StateStore(e.to_string()))?;
            state.set(
                connection_id,
                stream_key,
                MonitorState::new(byte_offset, fingerprint),
            );
        }

        let snapshot = self.snapshot()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &snapshot))
            .await
            .map_err(|e| Error::StateStore(format!("state writer failed: {}", e)))?
    }
}

/// Write state to file atomically (write to temp, then rename)
fn atomic_write(path: &Path, state: &PersistedStateV1) -> Result<()> {
    use portable_atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::StateStore(format!("failed to create parent directory: {}", e))
            })?;
        }
    }

    // Process ID plus a counter keeps temp names unique across threads
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let file = File::create(&temp_path)
        .map_err(|e| Error::StateStore(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, state)
        .map_err(|e| Error::StateStore(format!("failed to write state: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::StateStore(format!("failed to flush state: {}", e)))?;
    drop(writer);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::StateStore(format!("failed to rename state file: {}", e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = JsonFileStateStore::open(&path).unwrap();
            store.set_state("main", "unified", 512, "ff00").await.unwrap();
            store.set_state("main", "chat", 64, "").await.unwrap();
        }

        let store = JsonFileStateStore::open(&path).unwrap();
        let unified = store.get_state("main", "unified").await.unwrap().unwrap();
        assert_eq!(unified.byte_offset, 512);
        assert_eq!(unified.last_line_fingerprint, "ff00");
        assert_eq!(
            store.get_state("main", "chat").await.unwrap().unwrap().byte_offset,
            64
        );
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/state.json");

        let store = JsonFileStateStore::open(&path).unwrap();
        store.set_state("main", "kill", 1, "a").await.unwrap();
        assert!(path.exists());

        // No temp files are left behind
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_is_versioned_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStateStore::open(&path).unwrap();
        store.set_state("main", "unified", 7, "beef").await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["connections"]["main"]["unified"]["byte_offset"], 7);
    }

    #[test]
    fn test_rejects_corrupt_and_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFileStateStore::open(&path),
            Err(Error::StateStore(_))
        ));

        fs::write(&path, r#"{"version": 9, "connections": {}}"#).unwrap();
        let err = JsonFileStateStore::open(&path).err().unwrap();
        assert!(err.to_string().contains("version 9"));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(dir.path().join("state.json")).unwrap();

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_state(&format!("conn-{}", i), "unified", i * 10, "")
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let reopened = JsonFileStateStore::open(store.path()).unwrap();
        for i in 0..8u64 {
            let state = reopened
                .get_state(&format!("conn-{}", i), "unified")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(state.byte_offset, i * 10);
        }
    }
}
