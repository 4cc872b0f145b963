// SPDX-License-Identifier: Apache-2.0

//! Persistence for read positions.
//!
//! Monitors persist `(offset, fingerprint)` per stream through a [`StateStore`].
//! [`JsonFileStateStore`] keeps them in one JSON file with atomic writes;
//! [`MemoryStateStore`] keeps them for the life of the process.

mod json_file;
mod schema;
mod store;

pub use json_file::JsonFileStateStore;
pub use schema::{MonitorState, PERSISTED_STATE_VERSION, PersistedStateV1};
pub use store::{MemoryStateStore, StateStore};
