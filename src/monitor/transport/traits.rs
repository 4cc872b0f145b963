// SPDX-License-Identifier: Apache-2.0

//! Traits and types for remote file transports.

use std::io::{Read, Seek};
use std::time::Duration;

use crate::monitor::error::Result;

/// Size and modification time of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File size in bytes
    pub size: u64,
    /// Modification time, seconds since the Unix epoch, when the backend reports one
    pub mtime: Option<u64>,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub mtime: Option<u64>,
    pub is_dir: bool,
}

/// A readable, seekable handle. Closing is dropping.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// A single logical session to a remote filesystem.
///
/// Implementations are blocking and are driven from `spawn_blocking`. One
/// transport belongs to exactly one monitor and is never used by two readers
/// at once, which is why every operation takes `&mut self`.
pub trait RemoteFileTransport: Send {
    /// Establish the session.
    ///
    /// Fails with [`Error::Connection`] when the server is unreachable and
    /// with [`Error::Authentication`] when the credentials are rejected.
    ///
    /// [`Error::Connection`]: crate::monitor::Error::Connection
    /// [`Error::Authentication`]: crate::monitor::Error::Authentication
    fn connect(&mut self, timeout: Duration) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Fails with [`Error::FileNotFound`](crate::monitor::Error::FileNotFound) if the path does not exist.
    fn stat(&mut self, path: &str) -> Result<FileStat>;

    fn open_read(&mut self, path: &str) -> Result<Box<dyn ReadSeek + '_>>;

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>>;

    /// Close the session. Safe to call when not connected.
    fn disconnect(&mut self);

    /// Name of the backend, for logging.
    fn backend_name(&self) -> &'static str;
}
