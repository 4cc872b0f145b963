// SPDX-License-Identifier: Apache-2.0

//! Remote file transports.
//!
//! A transport is one blocking session to the filesystem a game server writes
//! its logs to. Backends:
//! - `sftp`: password-authenticated SFTP (requires the `sftp` cargo feature)
//! - `local`: a directory mounted on this host
//! - memory: an in-process filesystem for tests and embedders

mod local;
mod memory;
#[cfg(feature = "sftp")]
mod sftp;
mod traits;

pub use local::LocalTransport;
pub use memory::{ConnectFailure, MemoryFs, MemoryTransport};
#[cfg(feature = "sftp")]
pub use sftp::SftpTransport;
pub use traits::{DirEntry, FileStat, ReadSeek, RemoteFileTransport};

use std::sync::Arc;

use crate::monitor::config::{ConnectionConfig, TransportKind};
use crate::monitor::error::{Error, Result};

/// Builds a fresh, unconnected transport for a connection.
pub type TransportFactory =
    Arc<dyn Fn(&ConnectionConfig) -> Result<Box<dyn RemoteFileTransport>> + Send + Sync>;

/// Create a transport for the configured backend.
pub fn create_transport(config: &ConnectionConfig) -> Result<Box<dyn RemoteFileTransport>> {
    match config.transport {
        TransportKind::Local => {
            let root = config.root.as_ref().ok_or_else(|| {
                Error::Config("root must be specified for the local transport".to_string())
            })?;
            Ok(Box::new(LocalTransport::new(root.clone())))
        }
        #[cfg(feature = "sftp")]
        TransportKind::Sftp => Ok(Box::new(SftpTransport::new(
            config.host.clone(),
            config.port,
            config.credentials.clone(),
        ))),
        #[cfg(not(feature = "sftp"))]
        TransportKind::Sftp => Err(Error::Config(
            "sftp transport requested but this build does not include the `sftp` feature"
                .to_string(),
        )),
    }
}

/// The factory used when none is injected.
pub fn default_transport_factory() -> TransportFactory {
    Arc::new(create_transport)
}

/// A factory handing out transports over a shared in-memory filesystem.
pub fn memory_transport_factory(fs: MemoryFs) -> TransportFactory {
    Arc::new(
        move |_config: &ConnectionConfig| -> Result<Box<dyn RemoteFileTransport>> {
            Ok(Box::new(MemoryTransport::new(fs.clone())))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_create_local_transport() {
        let dir = TempDir::new().unwrap();
        let config = ConnectionConfig::local(dir.path()).with_unified_file("/TheIsle.log");
        let mut transport = create_transport(&config).unwrap();
        assert_eq!(transport.backend_name(), "local");
        transport.connect(Duration::from_secs(1)).unwrap();
        assert!(transport.is_connected());
    }

    #[cfg(not(feature = "sftp"))]
    #[test]
    fn test_sftp_without_feature_is_config_error() {
        let config = ConnectionConfig::default();
        assert!(matches!(create_transport(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_memory_factory_shares_fs() {
        let fs = MemoryFs::new();
        fs.write("/a.log", "hello\n");
        let factory = memory_transport_factory(fs);
        let mut transport = factory(&ConnectionConfig::default()).unwrap();
        transport.connect(Duration::from_secs(1)).unwrap();
        assert_eq!(transport.stat("/a.log").unwrap().size, 6);
    }
}
