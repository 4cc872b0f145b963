// SPDX-License-Identifier: Apache-2.0

//! Remote game-server log monitoring.
//!
//! A [`LogMonitor`] tails one connection's log files through a
//! [`RemoteFileTransport`](transport::RemoteFileTransport), turns new lines into
//! [`Event`]s with the connection's [`EventParser`](parser::EventParser), drops
//! events it has already delivered and hands the rest to subscribers. Read
//! positions survive restarts through a [`StateStore`](persistence::StateStore).
//! The [`MonitorRegistry`] owns monitors keyed by connection id.

pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod log_monitor;
pub mod parser;
pub mod persistence;
pub mod reader;
pub mod registry;
pub mod subscriber;
pub mod telemetry;
pub mod transport;

pub use config::{ConnectionConfig, Credentials, EngineConfig, LogMode, StartAt, TransportKind, WatchedFile};
pub use error::{Error, Result};
pub use event::{Event, EventKind, StreamKind};
pub use log_monitor::{FileProgress, LifecycleState, LogMonitor, MonitorStatus};
pub use registry::MonitorRegistry;
pub use subscriber::{FnSubscriber, QueueSubscriber, Subscriber, Subscription};
