// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::schema::MonitorState;
use crate::monitor::error::{Error, Result};

/// Durable storage of read positions, keyed by `(connection id, stream key)`.
///
/// Shared by every monitor, so implementations must tolerate concurrent calls.
/// Each write is self-contained; no ordering is required between keys.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, connection_id: &str, stream_key: &str)
    -> Result<Option<MonitorState>>;

    async fn set_state(
        &self,
        connection_id: &str,
        stream_key: &str,
        byte_offset: u64,
        fingerprint: &str,
    ) -> Result<()>;
}

/// Process-local state store. Positions are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<(String, String), MonitorState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(
        &self,
        connection_id: &str,
        stream_key: &str,
    ) -> Result<Option<MonitorState>> {
        let states = self
            .states
            .read()
            .map_err(|e| Error::StateStore(e.to_string()))?;
        Ok(states
            .get(&(connection_id.to_string(), stream_key.to_string()))
            .cloned())
    }

    async fn set_state(
        &self,
        connection_id: &str,
        stream_key: &str,
        byte_offset: u64,
        fingerprint: &str,
    ) -> Result<()> {
        let mut states = self
            .states
            .write()
            .map_err(|e| Error::StateStore(e.to_string()))?;
        states.insert(
            (connection_id.to_string(), stream_key.to_string()),
            MonitorState::new(byte_offset, fingerprint),
        );
        Ok(())
    }
}
