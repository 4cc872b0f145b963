// SPDX-License-Identifier: Apache-2.0

//! Transport over a locally mounted directory, for game servers that share a
//! filesystem with the monitor.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use super::traits::{DirEntry, FileStat, ReadSeek, RemoteFileTransport};
use crate::monitor::error::{Error, Result};

/// Resolves remote paths beneath `root`. Paths may not escape the root.
pub struct LocalTransport {
    root: PathBuf,
    connected: bool,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(Error::Config(format!(
                        "path {:?} escapes the transport root",
                        path
                    )));
                }
            }
        }
        Ok(resolved)
    }
}

fn map_io(path: &str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::FileNotFound(path.to_string())
    } else {
        Error::Io(e)
    }
}

fn mtime_secs(metadata: &fs::Metadata) -> Option<u64> {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

impl RemoteFileTransport for LocalTransport {
    fn connect(&mut self, _timeout: Duration) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::Connection(format!(
                "root directory {:?} is not accessible",
                self.root
            )));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn stat(&mut self, path: &str) -> Result<FileStat> {
        let resolved = self.resolve(path)?;
        let metadata = fs::metadata(&resolved).map_err(|e| map_io(path, e))?;
        Ok(FileStat {
            size: metadata.len(),
            mtime: mtime_secs(&metadata),
        })
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn ReadSeek + '_>> {
        let resolved = self.resolve(path)?;
        let file = File::open(&resolved).map_err(|e| map_io(path, e))?;
        Ok(Box::new(file))
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let resolved = self.resolve(path)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&resolved).map_err(|e| map_io(path, e))?.flatten() {
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(DirEntry {
                path: format!("{}/{}", path.trim_end_matches('/'), name),
                name,
                size: metadata.len(),
                mtime: mtime_secs(&metadata),
                is_dir: metadata.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
