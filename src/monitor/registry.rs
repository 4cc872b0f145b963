// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::monitor::config::{ConnectionConfig, DEFAULT_SHUTDOWN_TIMEOUT_SECS};
use crate::monitor::error::{Error, Result};
use crate::monitor::log_monitor::{LogMonitor, MonitorStatus};
use crate::monitor::parser::ParserRegistry;
use crate::monitor::persistence::StateStore;
use crate::monitor::transport::{TransportFactory, default_transport_factory};

/// Owns one [`LogMonitor`] per connection id.
pub struct MonitorRegistry {
    monitors: RwLock<HashMap<String, Arc<LogMonitor>>>,
    parsers: ParserRegistry,
    store: Arc<dyn StateStore>,
    transport_factory: TransportFactory,
    shutdown_timeout: Duration,
}

impl MonitorRegistry {
    pub fn new(parsers: ParserRegistry, store: Arc<dyn StateStore>) -> Self {
        Self {
            monitors: RwLock::new(HashMap::new()),
            parsers,
            store,
            transport_factory: default_transport_factory(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }

    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.transport_factory = factory;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    /// Return the monitor for `connection_id`, creating it if needed.
    ///
    /// An existing monitor is returned as is; `config` is only used on creation.
    pub async fn create(
        &self,
        connection_id: &str,
        config: ConnectionConfig,
    ) -> Result<Arc<LogMonitor>> {
        if let Some(existing) = self.monitors.read().await.get(connection_id) {
            return Ok(existing.clone());
        }

        let mut monitors = self.monitors.write().await;
        if let Some(existing) = monitors.get(connection_id) {
            return Ok(existing.clone());
        }

        let parser = self.parsers.get(&config.log_format)?;
        let monitor = Arc::new(
            LogMonitor::new(
                connection_id,
                config,
                parser,
                self.store.clone(),
                self.transport_factory.clone(),
            )?
            .with_shutdown_timeout(self.shutdown_timeout),
        );
        monitors.insert(connection_id.to_string(), monitor.clone());
        info!(connection_id, "Registered log monitor");
        Ok(monitor)
    }

    pub async fn get(&self, connection_id: &str) -> Option<Arc<LogMonitor>> {
        self.monitors.read().await.get(connection_id).cloned()
    }

    /// Stop and forget a monitor. Returns false if none was registered.
    pub async fn remove(&self, connection_id: &str) -> Result<bool> {
        let removed = self.monitors.write().await.remove(connection_id);
        match removed {
            Some(monitor) => {
                monitor.stop().await?;
                info!(connection_id, "Removed log monitor");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start a registered monitor, using its configured interval when none is given.
    pub async fn start(&self, connection_id: &str, poll_interval: Option<Duration>) -> Result<()> {
        let monitor = self.require(connection_id).await?;
        let interval = poll_interval.unwrap_or_else(|| monitor.config().poll_interval());
        monitor.start(interval).await
    }

    pub async fn stop(&self, connection_id: &str) -> Result<()> {
        self.require(connection_id).await?.stop().await
    }

    /// Start every registered monitor, each with its configured interval unless
    /// `poll_interval` overrides it. Failures are logged and returned per connection.
    pub async fn start_all(&self, poll_interval: Option<Duration>) -> Vec<(String, Result<()>)> {
        let monitors = self.snapshot().await;
        let results = join_all(monitors.iter().map(|m| async move {
            let interval = poll_interval.unwrap_or_else(|| m.config().poll_interval());
            let result = m.start(interval).await;
            (m.connection_id().to_string(), result)
        }))
        .await;

        for (connection_id, result) in &results {
            if let Err(e) = result {
                warn!(connection_id, error = %e, "Log monitor failed to start");
            }
        }
        results
    }

    /// Stop every monitor concurrently.
    pub async fn stop_all(&self) {
        let monitors = self.snapshot().await;
        if monitors.is_empty() {
            return;
        }

        info!(count = monitors.len(), "Stopping all log monitors");
        let results = join_all(monitors.iter().map(|m| m.stop())).await;
        for (monitor, result) in monitors.iter().zip(results) {
            if let Err(e) = result {
                warn!(connection_id = monitor.connection_id(), error = %e, "Error stopping log monitor");
            }
        }
    }

    pub async fn status(&self, connection_id: &str) -> Option<MonitorStatus> {
        self.get(connection_id).await.map(|m| m.status())
    }

    /// Status of every monitor, ordered by connection id.
    pub async fn statuses(&self) -> Vec<MonitorStatus> {
        let mut statuses: Vec<_> = self.snapshot().await.iter().map(|m| m.status()).collect();
        statuses.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        statuses
    }

    /// Number of monitors currently running.
    pub async fn active_count(&self) -> usize {
        self.monitors
            .read()
            .await
            .values()
            .filter(|m| m.is_running())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.monitors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.monitors.read().await.is_empty()
    }

    async fn snapshot(&self) -> Vec<Arc<LogMonitor>> {
        self.monitors.read().await.values().cloned().collect()
    }

    async fn require(&self, connection_id: &str) -> Result<Arc<LogMonitor>> {
        self.get(connection_id)
            .await
            .ok_or_else(|| Error::Config(format!("no monitor registered for connection {}", connection_id)))
    }
}
