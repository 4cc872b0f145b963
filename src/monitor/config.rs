// SPDX-License-Identifier: Apache-2.0

//! Configuration for monitored connections.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::monitor::event::{StreamKind, UNIFIED_STREAM_KEY};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_READ_BYTES: u64 = 4 * 1024 * 1024;
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Whether a connection's events share one file or are split by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// One file interleaves every event kind
    #[default]
    Unified,
    /// One file per stream kind
    #[serde(alias = "per-type")]
    PerType,
}

impl FromStr for LogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unified" => Ok(LogMode::Unified),
            "per_type" | "per-type" => Ok(LogMode::PerType),
            _ => Err(format!(
                "Invalid log mode '{}'. Valid options: unified, per-type",
                s
            )),
        }
    }
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogMode::Unified => f.write_str("unified"),
            LogMode::PerType => f.write_str("per-type"),
        }
    }
}

/// Backend used to reach the server's files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Sftp,
    /// A locally mounted directory
    Local,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sftp" => Ok(TransportKind::Sftp),
            "local" => Ok(TransportKind::Local),
            _ => Err(format!(
                "Invalid transport '{}'. Valid options: sftp, local",
                s
            )),
        }
    }
}

/// Where to begin reading a file that has no persisted position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartAt {
    #[default]
    Beginning,
    End,
}

impl FromStr for StartAt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginning" => Ok(StartAt::Beginning),
            "end" => Ok(StartAt::End),
            _ => Err(format!(
                "Invalid start_at '{}'. Valid options: beginning, end",
                s
            )),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A file watched on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFile {
    pub path: String,
    /// Stream kind of a per-type file. Absent in unified mode.
    #[serde(default)]
    pub kind: Option<StreamKind>,
}

impl WatchedFile {
    pub fn unified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: None,
        }
    }

    pub fn typed(path: impl Into<String>, kind: StreamKind) -> Self {
        Self {
            path: path.into(),
            kind: Some(kind),
        }
    }

    /// Key the file's read position is persisted under.
    pub fn stream_key(&self) -> &'static str {
        self.kind
            .map(|k| k.stream_key())
            .unwrap_or(UNIFIED_STREAM_KEY)
    }
}

fn default_port() -> u16 {
    22
}

fn default_log_format() -> String {
    "the_isle_evrima".to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_max_read_bytes() -> u64 {
    DEFAULT_MAX_READ_BYTES
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}

fn default_dedup_capacity() -> usize {
    crate::monitor::dedup::DEFAULT_DEDUP_CAPACITY
}

/// Configuration for one monitored game-server connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Transport backend
    #[serde(default)]
    pub transport: TransportKind,
    /// Remote host (sftp)
    #[serde(default)]
    pub host: String,
    /// Remote port (sftp)
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub credentials: Credentials,
    /// Directory remote paths are resolved under (local)
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Key of the parser used for this server's lines
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub mode: LogMode,
    /// Files to tail
    #[serde(default)]
    pub files: Vec<WatchedFile>,
    /// Seconds between poll ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on establishing the transport session
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub start_at: StartAt,
    /// Maximum bytes consumed from one file per tick
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: u64,
    /// Maximum log line size in bytes
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    /// Number of recent event fingerprints remembered for dedup
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Sftp,
            host: String::new(),
            port: default_port(),
            credentials: Credentials::default(),
            root: None,
            log_format: default_log_format(),
            mode: LogMode::Unified,
            files: Vec::new(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            start_at: StartAt::Beginning,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl ConnectionConfig {
    pub fn sftp(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            transport: TransportKind::Sftp,
            host: host.into(),
            port,
            credentials,
            ..Default::default()
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            transport: TransportKind::Local,
            root: Some(root.into()),
            ..Default::default()
        }
    }

    pub fn with_log_format(mut self, log_format: impl Into<String>) -> Self {
        self.log_format = log_format.into();
        self
    }

    /// Watch a single unified file.
    pub fn with_unified_file(mut self, path: impl Into<String>) -> Self {
        self.mode = LogMode::Unified;
        self.files = vec![WatchedFile::unified(path)];
        self
    }

    /// Add a per-type file, switching the connection to per-type mode.
    pub fn with_typed_file(mut self, path: impl Into<String>, kind: StreamKind) -> Self {
        self.mode = LogMode::PerType;
        self.files.push(WatchedFile::typed(path, kind));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.transport {
            TransportKind::Sftp => {
                if self.host.trim().is_empty() {
                    return Err("host must be specified for the sftp transport".to_string());
                }
                if self.credentials.username.is_empty() {
                    return Err("username must be specified for the sftp transport".to_string());
                }
            }
            TransportKind::Local => {
                if self.root.is_none() {
                    return Err("root must be specified for the local transport".to_string());
                }
            }
        }

        if self.log_format.trim().is_empty() {
            return Err("log_format must not be empty".to_string());
        }

        if self.files.is_empty() {
            return Err("At least one watched file must be specified".to_string());
        }
        if let Some(f) = self.files.iter().find(|f| f.path.trim().is_empty()) {
            return Err(format!("Watched file path must not be empty: {:?}", f));
        }

        match self.mode {
            LogMode::Unified => {
                if self.files.len() != 1 {
                    return Err(format!(
                        "Unified mode watches exactly one file, got {}",
                        self.files.len()
                    ));
                }
                if let Some(kind) = self.files[0].kind {
                    return Err(format!(
                        "Unified file {} must not declare a stream kind (got {})",
                        self.files[0].path, kind
                    ));
                }
            }
            LogMode::PerType => {
                let mut seen = HashSet::new();
                for f in &self.files {
                    let Some(kind) = f.kind else {
                        return Err(format!(
                            "Per-type file {} must declare a stream kind",
                            f.path
                        ));
                    };
                    if !seen.insert(kind) {
                        return Err(format!("Stream kind {} is watched more than once", kind));
                    }
                }
            }
        }

        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be greater than zero".to_string());
        }
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be greater than zero".to_string());
        }
        if self.max_line_bytes == 0 {
            return Err("max_line_bytes must be greater than zero".to_string());
        }
        if self.max_read_bytes < self.max_line_bytes as u64 {
            return Err(format!(
                "max_read_bytes ({}) must be at least max_line_bytes ({})",
                self.max_read_bytes, self.max_line_bytes
            ));
        }
        if self.dedup_capacity == 0 {
            return Err("dedup_capacity must be greater than zero".to_string());
        }

        Ok(())
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("/var/lib/gamelog-monitor/state.json")
}

fn default_shutdown_timeout_secs() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

/// Top-level configuration: where state lives and which connections to monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the JSON file read positions are persisted to
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// How long a stopping monitor may take before its task is aborted
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            connections: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (id, conn) in &self.connections {
            if id.trim().is_empty() {
                return Err("Connection id must not be empty".to_string());
            }
            conn.validate()
                .map_err(|e| format!("connection {}: {}", id, e))?;
        }
        Ok(())
    }
}
