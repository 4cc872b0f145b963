// SPDX-License-Identifier: Apache-2.0

//! Persistence schema for read positions.
//!
//! v1 stores one entry per `(connection id, stream key)`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "connections": {
//!     "main": {
//!       "unified": {
//!         "byte_offset": 18233,
//!         "last_line_fingerprint": "9f2c...",
//!         "updated_at": "2026-01-31T04:47:54Z"
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for persisted state
pub const PERSISTED_STATE_VERSION: u8 = 1;

/// Read position of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    /// Bytes consumed so far
    pub byte_offset: u64,
    /// Hash of the last line read, empty if none
    #[serde(default)]
    pub last_line_fingerprint: String,
    pub updated_at: DateTime<Utc>,
}

impl MonitorState {
    pub fn new(byte_offset: u64, last_line_fingerprint: impl Into<String>) -> Self {
        Self {
            byte_offset,
            last_line_fingerprint: last_line_fingerprint.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Persisted state for all connections (v1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStateV1 {
    /// Schema version (always 1 for this format)
    pub version: u8,
    /// Connection id -> stream key -> position
    #[serde(default)]
    pub connections: BTreeMap<String, BTreeMap<String, MonitorState>>,
}

impl Default for PersistedStateV1 {
    fn default() -> Self {
        Self {
            version: PERSISTED_STATE_VERSION,
            connections: BTreeMap::new(),
        }
    }
}

impl PersistedStateV1 {
    pub fn get(&self, connection_id: &str, stream_key: &str) -> Option<&MonitorState> {
        self.connections.get(connection_id)?.get(stream_key)
    }

    pub fn set(&mut self, connection_id: &str, stream_key: &str, state: MonitorState) {
        self.connections
            .entry(connection_id.to_string())
            .or_default()
            .insert(stream_key.to_string(), state);
    }
}
