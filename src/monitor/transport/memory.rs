// SPDX-License-Identifier: Apache-2.0

//! In-memory transport. Files live in a [`MemoryFs`] that can be cloned and
//! mutated from the outside while a monitor is reading from it.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{DirEntry, FileStat, ReadSeek, RemoteFileTransport};
use crate::monitor::error::{Error, Result};

#[derive(Default)]
struct Inner {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
    connects: AtomicUsize,
}

/// Shared in-memory filesystem. Paths are normalized to start with `/`.
#[derive(Clone, Default)]
pub struct MemoryFs {
    inner: Arc<Inner>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned lock only means a test thread panicked mid-write; the map is still usable
        match self.inner.files.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace a file's contents, creating it if needed.
    pub fn write(&self, path: &str, contents: impl AsRef<[u8]>) {
        self.files()
            .insert(normalize(path), contents.as_ref().to_vec());
    }

    pub fn append(&self, path: &str, contents: impl AsRef<[u8]>) {
        self.files()
            .entry(normalize(path))
            .or_default()
            .extend_from_slice(contents.as_ref());
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files().remove(&normalize(path)).is_some()
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files().get(&normalize(path)).cloned()
    }

    /// While offline, connects fail and operations on an open session report a lost connection.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Number of successful connects made by transports over this filesystem.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

/// How [`MemoryTransport::connect`] should fail, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    Unreachable,
    BadCredentials,
}

pub struct MemoryTransport {
    fs: MemoryFs,
    connected: bool,
    fail_connect: Option<ConnectFailure>,
}

impl MemoryTransport {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            connected: false,
            fail_connect: None,
        }
    }

    pub fn failing(fs: MemoryFs, failure: ConnectFailure) -> Self {
        Self {
            fs,
            connected: false,
            fail_connect: Some(failure),
        }
    }

    fn check_session(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.fs.is_offline() {
            self.connected = false;
            return Err(Error::Connection("session closed by remote host".to_string()));
        }
        Ok(())
    }
}

impl RemoteFileTransport for MemoryTransport {
    fn connect(&mut self, _timeout: Duration) -> Result<()> {
        match self.fail_connect {
            Some(ConnectFailure::BadCredentials) => {
                return Err(Error::Authentication(
                    "server rejected password authentication".to_string(),
                ));
            }
            Some(ConnectFailure::Unreachable) => {
                return Err(Error::Connection("connection refused".to_string()));
            }
            None => {}
        }
        if self.fs.is_offline() {
            return Err(Error::Connection("connection refused".to_string()));
        }

        self.connected = true;
        self.fs.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn stat(&mut self, path: &str) -> Result<FileStat> {
        self.check_session()?;
        match self.fs.files().get(&normalize(path)) {
            Some(data) => Ok(FileStat {
                size: data.len() as u64,
                mtime: None,
            }),
            None => Err(Error::FileNotFound(path.to_string())),
        }
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn ReadSeek + '_>> {
        self.check_session()?;
        match self.fs.contents(path) {
            Some(data) => Ok(Box::new(Cursor::new(data))),
            None => Err(Error::FileNotFound(path.to_string())),
        }
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        self.check_session()?;
        let dir = normalize(path);
        let prefix = if dir == "/" { dir.clone() } else { format!("{}/", dir) };

        let files = self.fs.files();
        let mut entries: BTreeMap<String, DirEntry> = BTreeMap::new();
        for (file_path, data) in files.iter() {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            let (name, is_dir) = match rest.split_once('/') {
                Some((first, _)) => (first, true),
                None => (rest, false),
            };
            entries.entry(name.to_string()).or_insert_with(|| DirEntry {
                name: name.to_string(),
                path: format!("{}{}", prefix, name),
                size: if is_dir { 0 } else { data.len() as u64 },
                mtime: None,
                is_dir,
            });
        }

        if entries.is_empty() && dir != "/" {
            return Err(Error::FileNotFound(path.to_string()));
        }
        Ok(entries.into_values().collect())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
