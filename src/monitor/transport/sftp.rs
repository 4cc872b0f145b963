// SPDX-License-Identifier: Apache-2.0

//! SFTP transport built on libssh2.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::{ErrorCode, Session, Sftp};
use tracing::debug;

use super::traits::{DirEntry, FileStat, ReadSeek, RemoteFileTransport};
use crate::monitor::config::Credentials;
use crate::monitor::error::{Error, Result};

// libssh2 error codes
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;
const LIBSSH2_FX_NO_SUCH_PATH: i32 = 10;

pub struct SftpTransport {
    host: String,
    port: u16,
    credentials: Credentials,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SftpTransport {
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
            session: None,
            sftp: None,
        }
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.sftp.as_ref().ok_or(Error::NotConnected)
    }
}

fn connection_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Connection(format!("{}: {}", context, e))
}

/// Map a libssh2 error raised while operating on `path`.
fn map_ssh_error(path: &str, e: ssh2::Error) -> Error {
    match e.code() {
        ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE) | ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_PATH) => {
            Error::FileNotFound(path.to_string())
        }
        ErrorCode::SFTP(LIBSSH2_FX_PERMISSION_DENIED) => Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("{}: {}", path, e.message()),
        )),
        ErrorCode::SFTP(_) => Error::Io(std::io::Error::other(format!(
            "{}: {}",
            path,
            e.message()
        ))),
        // Session-level failures mean the connection itself is gone
        ErrorCode::Session(_) => connection_error(path, e),
    }
}

impl RemoteFileTransport for SftpTransport {
    fn connect(&mut self, timeout: Duration) -> Result<()> {
        self.disconnect();

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| connection_error(&self.host, e))?
            .next()
            .ok_or_else(|| Error::Connection(format!("{}: no address resolved", self.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                Error::ConnectTimeout(timeout)
            } else {
                connection_error(&addr.to_string(), e)
            }
        })?;

        let mut session = Session::new().map_err(|e| connection_error("session", e))?;
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connection_error("handshake", e))?;

        session
            .userauth_password(&self.credentials.username, &self.credentials.password)
            .map_err(|e| match e.code() {
                ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED)
                | ErrorCode::Session(LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED) => {
                    Error::Authentication(format!(
                        "{}@{}: {}",
                        self.credentials.username,
                        self.host,
                        e.message()
                    ))
                }
                _ => connection_error("authentication", e),
            })?;
        if !session.authenticated() {
            return Err(Error::Authentication(format!(
                "{}@{}: not authenticated",
                self.credentials.username, self.host
            )));
        }

        let sftp = session
            .sftp()
            .map_err(|e| connection_error("sftp subsystem", e))?;

        debug!(host = %self.host, port = self.port, "SFTP session established");
        self.session = Some(session);
        self.sftp = Some(sftp);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sftp.is_some()
    }

    fn stat(&mut self, path: &str) -> Result<FileStat> {
        let stat = self
            .sftp()?
            .stat(Path::new(path))
            .map_err(|e| map_ssh_error(path, e))?;
        Ok(FileStat {
            size: stat.size.unwrap_or(0),
            mtime: stat.mtime,
        })
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn ReadSeek + '_>> {
        let file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| map_ssh_error(path, e))?;
        Ok(Box::new(file))
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        let listing = self
            .sftp()?
            .readdir(Path::new(path))
            .map_err(|e| map_ssh_error(path, e))?;

        let mut entries: Vec<DirEntry> = listing
            .into_iter()
            .filter_map(|(p, stat)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    path: p.to_string_lossy().into_owned(),
                    name,
                    size: stat.size.unwrap_or(0),
                    mtime: stat.mtime,
                    is_dir: stat.is_dir(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn disconnect(&mut self) {
        self.sftp = None;
        if let Some(session) = self.session.take() {
            // Best effort: the peer may already be gone
            let _ = session.disconnect(None, "monitor closing", None);
        }
    }

    fn backend_name(&self) -> &'static str {
        "sftp"
    }
}

impl Drop for SftpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
