// SPDX-License-Identifier: Apache-2.0

//! Polling monitor for one connection's watched files.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::monitor::config::{ConnectionConfig, StartAt, WatchedFile};
use crate::monitor::dedup::DedupGuard;
use crate::monitor::error::{Error, Result};
use crate::monitor::event::Event;
use crate::monitor::fingerprint::event_fingerprint;
use crate::monitor::parser::EventParser;
use crate::monitor::persistence::StateStore;
use crate::monitor::reader::{IncrementalReader, ReadOutcome};
use crate::monitor::subscriber::{Subscriber, SubscriberSet, Subscription};
use crate::monitor::telemetry::MonitorCounters;
use crate::monitor::transport::{RemoteFileTransport, TransportFactory};

/// Lifecycle of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Read progress of one watched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileProgress {
    pub path: String,
    pub stream_key: String,
    pub offset: u64,
    pub fingerprint: String,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub connection_id: String,
    pub state: LifecycleState,
    pub files: Vec<FileProgress>,
    /// Poll ticks completed since the monitor was created
    pub ticks: u64,
    pub events_delivered: u64,
    pub duplicates_dropped: u64,
    /// The state store failed its last write; positions are only held in memory
    pub degraded: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Stats {
    files: Vec<FileProgress>,
    ticks: u64,
    events_delivered: u64,
    duplicates_dropped: u64,
    degraded: bool,
    last_error: Option<String>,
}

/// State shared between the monitor handle and its poll task.
struct Shared {
    lifecycle: Mutex<LifecycleState>,
    stats: Mutex<Stats>,
    subscribers: RwLock<SubscriberSet>,
}

// A poisoned lock only means a panic elsewhere mid-update; the data is still usable
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn set_lifecycle(&self, state: LifecycleState) {
        *lock(&self.lifecycle) = state;
    }

    fn lifecycle(&self) -> LifecycleState {
        *lock(&self.lifecycle)
    }

    fn record_error(&self, error: &Error) {
        lock(&self.stats).last_error = Some(error.to_string());
    }

    fn subscribers(&self) -> SubscriberSet {
        match self.subscribers.read() {
            Ok(set) => set.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[derive(Default)]
struct Control {
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

/// Tails every watched file of one connection.
///
/// One tokio task polls the files sequentially on a fixed interval, since the
/// transport session is not safe for concurrent use. Events are dispatched to
/// subscribers in line order and each file's position is persisted whenever
/// the read made progress, whether or not any line parsed.
pub struct LogMonitor {
    connection_id: String,
    config: ConnectionConfig,
    parser: Arc<dyn EventParser>,
    store: Arc<dyn StateStore>,
    transport_factory: TransportFactory,
    shutdown_timeout: Duration,
    shared: Arc<Shared>,
    control: tokio::sync::Mutex<Control>,
}

impl fmt::Debug for LogMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogMonitor")
            .field("connection_id", &self.connection_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LogMonitor {
    pub fn new(
        connection_id: impl Into<String>,
        config: ConnectionConfig,
        parser: Arc<dyn EventParser>,
        store: Arc<dyn StateStore>,
        transport_factory: TransportFactory,
    ) -> Result<Self> {
        let connection_id = connection_id.into();
        config
            .validate()
            .map_err(|e| Error::Config(format!("connection {}: {}", connection_id, e)))?;

        let files = config
            .files
            .iter()
            .map(|f| FileProgress {
                path: f.path.clone(),
                stream_key: f.stream_key().to_string(),
                offset: 0,
                fingerprint: String::new(),
                last_read_at: None,
            })
            .collect();

        Ok(Self {
            connection_id,
            config,
            parser,
            store,
            transport_factory,
            shutdown_timeout: Duration::from_secs(crate::monitor::config::DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(LifecycleState::Stopped),
                stats: Mutex::new(Stats {
                    files,
                    ..Default::default()
                }),
                subscribers: RwLock::new(SubscriberSet::new()),
            }),
            control: tokio::sync::Mutex::new(Control::default()),
        })
    }

    /// How long `stop` waits for the poll task before aborting it.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Register a subscriber for one event kind, or for all of them.
    ///
    /// Takes effect from the next poll tick.
    pub fn subscribe(&self, subscription: impl Into<Subscription>, subscriber: Arc<dyn Subscriber>) {
        let mut set = match self.shared.subscribers.write() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.add(subscription.into(), subscriber);
    }

    pub fn subscribe_all(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribe(Subscription::All, subscriber);
    }

    pub fn status(&self) -> MonitorStatus {
        let stats = lock(&self.shared.stats);
        MonitorStatus {
            connection_id: self.connection_id.clone(),
            state: self.state(),
            files: stats.files.clone(),
            ticks: stats.ticks,
            events_delivered: stats.events_delivered,
            duplicates_dropped: stats.duplicates_dropped,
            degraded: stats.degraded,
            last_error: stats.last_error.clone(),
        }
    }

    /// Connect, load persisted positions and start polling.
    ///
    /// Connection and authentication failures leave the monitor stopped and
    /// are returned to the caller. Starting a running monitor is a no-op.
    ///
    /// The poll task stops itself and records `last_error` if a reconnect is
    /// rejected with a non-retryable error or if a subscriber panics.
    pub async fn start(&self, poll_interval: Duration) -> Result<()> {
        let mut control = self.control.lock().await;
        if self.state() == LifecycleState::Running {
            return Ok(());
        }

        self.shared.set_lifecycle(LifecycleState::Starting);
        info!(
            connection_id = %self.connection_id,
            mode = %self.config.mode,
            log_format = %self.config.log_format,
            files = self.config.files.len(),
            "Starting log monitor"
        );

        let (transport, cursors) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.shared.set_lifecycle(LifecycleState::Stopped);
                self.shared.record_error(&e);
                error!(connection_id = %self.connection_id, error = %e, "Failed to start log monitor");
                return Err(e);
            }
        };

        let worker = Worker {
            connection_id: self.connection_id.clone(),
            config: self.config.clone(),
            parser: self.parser.clone(),
            store: self.store.clone(),
            transport_factory: self.transport_factory.clone(),
            transport: Some(transport),
            needs_reconnect: false,
            reader: IncrementalReader::from_config(&self.config),
            dedup: DedupGuard::new(self.config.dedup_capacity),
            cursors,
            shared: self.shared.clone(),
            counters: MonitorCounters::new(&self.connection_id),
        };

        let cancel = CancellationToken::new();
        let poll_interval = if poll_interval.is_zero() {
            self.config.poll_interval()
        } else {
            poll_interval
        };

        self.shared.set_lifecycle(LifecycleState::Running);
        let task_cancel = cancel.clone();
        let shared = self.shared.clone();
        let connection_id = self.connection_id.clone();
        control.task = Some(tokio::spawn(async move {
            let run = AssertUnwindSafe(worker.run(task_cancel, poll_interval));
            if run.catch_unwind().await.is_err() {
                error!(connection_id = %connection_id, "Poll task panicked, log monitor stopped");
                lock(&shared.stats).last_error = Some("poll task panicked".to_string());
                shared.set_lifecycle(LifecycleState::Stopped);
            }
        }));
        control.cancel = Some(cancel);

        info!(
            connection_id = %self.connection_id,
            poll_interval = ?poll_interval,
            "Log monitor running"
        );
        Ok(())
    }

    /// Stop polling and close the transport. Stopping a stopped monitor is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if self.state() == LifecycleState::Stopped {
            return Ok(());
        }

        self.shared.set_lifecycle(LifecycleState::Stopping);
        info!(connection_id = %self.connection_id, "Stopping log monitor");

        if let Some(cancel) = control.cancel.take() {
            cancel.cancel();
        }

        if let Some(mut task) = control.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(connection_id = %self.connection_id, error = %e, "Poll task ended abnormally");
                }
                Err(_) => {
                    warn!(
                        connection_id = %self.connection_id,
                        timeout = ?self.shutdown_timeout,
                        "Poll task did not stop in time, aborting"
                    );
                    task.abort();
                }
            }
        }

        self.shared.set_lifecycle(LifecycleState::Stopped);
        info!(connection_id = %self.connection_id, "Log monitor stopped");
        Ok(())
    }

    /// Create and connect a transport, then resolve each file's starting position.
    async fn prepare(&self) -> Result<(Box<dyn RemoteFileTransport>, Vec<Cursor>)> {
        let transport = (self.transport_factory)(&self.config)?;
        let (transport, connected) =
            connect_transport(transport, self.config.connect_timeout()).await;
        connected?;
        let mut transport = transport.ok_or_else(|| {
            Error::Task("transport lost while connecting".to_string())
        })?;

        let mut cursors = Vec::with_capacity(self.config.files.len());
        for file in &self.config.files {
            let stored = match self
                .store
                .get_state(&self.connection_id, file.stream_key())
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        connection_id = %self.connection_id,
                        stream_key = file.stream_key(),
                        error = %e,
                        "State store unavailable, continuing with in-memory positions"
                    );
                    lock(&self.shared.stats).degraded = true;
                    None
                }
            };

            let (offset, fingerprint) = match stored {
                Some(state) => {
                    debug!(
                        connection_id = %self.connection_id,
                        path = %file.path,
                        offset = state.byte_offset,
                        "Resuming from persisted position"
                    );
                    (state.byte_offset, state.last_line_fingerprint)
                }
                None if self.config.start_at == StartAt::End => {
                    let path = file.path.clone();
                    let (t, size) =
                        run_blocking(transport, move |t| match t.stat(&path) {
                            Ok(stat) => Ok(stat.size),
                            Err(Error::FileNotFound(_)) => Ok(0),
                            Err(e) => Err(e),
                        })
                        .await;
                    transport = t.ok_or_else(|| {
                        Error::Task("transport lost while reading file size".to_string())
                    })?;
                    (size?, String::new())
                }
                None => (0, String::new()),
            };

            cursors.push(Cursor {
                file: file.clone(),
                offset,
                fingerprint,
            });
        }

        {
            let mut stats = lock(&self.shared.stats);
            for (progress, cursor) in stats.files.iter_mut().zip(&cursors) {
                progress.offset = cursor.offset;
                progress.fingerprint = cursor.fingerprint.clone();
            }
        }

        Ok((transport, cursors))
    }
}

/// In-memory read position of one watched file.
struct Cursor {
    file: WatchedFile,
    offset: u64,
    fingerprint: String,
}

/// State owned by the poll task.
struct Worker {
    connection_id: String,
    config: ConnectionConfig,
    parser: Arc<dyn EventParser>,
    store: Arc<dyn StateStore>,
    transport_factory: TransportFactory,
    transport: Option<Box<dyn RemoteFileTransport>>,
    needs_reconnect: bool,
    reader: IncrementalReader,
    dedup: DedupGuard,
    cursors: Vec<Cursor>,
    shared: Arc<Shared>,
    counters: MonitorCounters,
}

impl Worker {
    async fn run(mut self, cancel: CancellationToken, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failed = false;
        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(connection_id = %self.connection_id, "Poll task cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.tick(&cancel).await {
                        error!(connection_id = %self.connection_id, error = %e, "Stopping log monitor after unrecoverable error");
                        self.shared.record_error(&e);
                        failed = true;
                        break;
                    }
                }
            }
        }

        self.close_transport().await;
        if failed {
            self.shared.set_lifecycle(LifecycleState::Stopped);
        }
    }

    /// Poll every file once. Errors are only returned when polling cannot continue.
    async fn tick(&mut self, cancel: &CancellationToken) -> Result<()> {
        let proceed = self.ensure_connected().await;
        lock(&self.shared.stats).ticks += 1;

        if proceed? {
            let subscribers = self.shared.subscribers();
            for idx in 0..self.cursors.len() {
                if cancel.is_cancelled() {
                    break;
                }
                self.poll_file(idx, &subscribers).await;
            }
        }
        Ok(())
    }

    /// Reconnect once if the session was lost. Returns whether the tick can proceed.
    ///
    /// Retryable failures are recorded and retried on the next tick. Credential
    /// and configuration failures are returned since retrying cannot fix them.
    async fn ensure_connected(&mut self) -> Result<bool> {
        let connected = !self.needs_reconnect
            && self.transport.as_ref().is_some_and(|t| t.is_connected());
        if connected {
            return Ok(true);
        }

        let transport = match self.transport.take() {
            Some(t) => t,
            None => match (self.transport_factory)(&self.config) {
                Ok(t) => t,
                Err(e) if e.is_retryable() => {
                    warn!(connection_id = %self.connection_id, error = %e, "Failed to create transport, retrying next tick");
                    self.shared.record_error(&e);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            },
        };

        info!(connection_id = %self.connection_id, "Reconnecting transport");
        let (transport, result) = connect_transport(transport, self.config.connect_timeout()).await;
        self.transport = transport;

        match result {
            Ok(()) => {
                self.needs_reconnect = false;
                info!(connection_id = %self.connection_id, "Transport reconnected");
                Ok(true)
            }
            Err(e) if e.is_retryable() => {
                warn!(connection_id = %self.connection_id, error = %e, "Reconnect failed, retrying next tick");
                self.shared.record_error(&e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn poll_file(&mut self, idx: usize, subscribers: &SubscriberSet) {
        let Some(transport) = self.transport.take() else {
            return;
        };

        let path = self.cursors[idx].file.path.clone();
        let offset = self.cursors[idx].offset;
        let fingerprint = self.cursors[idx].fingerprint.clone();
        let reader = self.reader;

        let read_path = path.clone();
        let (transport, result) = run_blocking(transport, move |t| {
            reader.read_new(t, &read_path, offset, &fingerprint)
        })
        .await;
        self.transport = transport;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.counters.read_error();
                warn!(connection_id = %self.connection_id, path = %path, error = %e, "Failed to read log file");
                if e.is_connection_error() {
                    self.needs_reconnect = true;
                }
                self.shared.record_error(&e);
                return;
            }
        };

        self.counters.bytes_read(outcome.bytes_read);
        self.dispatch_lines(idx, &outcome, subscribers).await;

        if outcome.has_progress() {
            self.commit(idx, &outcome).await;
        }
    }

    async fn dispatch_lines(&mut self, idx: usize, outcome: &ReadOutcome, subscribers: &SubscriberSet) {
        let kind = self.cursors[idx].file.kind;

        for line in &outcome.lines {
            let event = match kind {
                None => self.parser.parse_line(line),
                Some(k) => self.parser.parse_typed(line, k),
            };
            if event.is_unknown() {
                continue;
            }

            if !self.admit(&event) {
                continue;
            }

            subscribers.dispatch(&self.connection_id, &event).await;
            self.counters.event_delivered();
            lock(&self.shared.stats).events_delivered += 1;
        }
    }

    /// Dedup check. Returns true if the event has not been delivered before.
    fn admit(&mut self, event: &Event) -> bool {
        let fingerprint = event_fingerprint(Some(event.timestamp()), event.raw_line());
        if self.dedup.check_and_record(&fingerprint) {
            return true;
        }

        debug!(
            connection_id = %self.connection_id,
            kind = %event.kind(),
            "Dropping duplicate event"
        );
        self.counters.duplicate_dropped();
        lock(&self.shared.stats).duplicates_dropped += 1;
        false
    }

    async fn commit(&mut self, idx: usize, outcome: &ReadOutcome) {
        let cursor = &mut self.cursors[idx];
        cursor.offset = outcome.offset;
        cursor.fingerprint = outcome.fingerprint.clone();
        let stream_key = cursor.file.stream_key();

        {
            let mut stats = lock(&self.shared.stats);
            if let Some(progress) = stats.files.get_mut(idx) {
                progress.offset = outcome.offset;
                progress.fingerprint = outcome.fingerprint.clone();
                progress.last_read_at = Some(Utc::now());
            }
        }

        let result = self
            .store
            .set_state(
                &self.connection_id,
                stream_key,
                outcome.offset,
                &outcome.fingerprint,
            )
            .await;

        let mut stats = lock(&self.shared.stats);
        match result {
            Ok(()) => {
                if stats.degraded {
                    info!(connection_id = %self.connection_id, "State store recovered");
                }
                stats.degraded = false;
            }
            Err(e) => {
                if !stats.degraded {
                    warn!(
                        connection_id = %self.connection_id,
                        stream_key,
                        error = %e,
                        "State store write failed, continuing with in-memory positions"
                    );
                }
                stats.degraded = true;
                stats.last_error = Some(e.to_string());
            }
        }
    }

    async fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            let _ = run_blocking(transport, |t| {
                t.disconnect();
                Ok(())
            })
            .await;
        }
        debug!(connection_id = %self.connection_id, "Transport closed");
    }
}

/// Run a blocking transport call off the runtime. The transport is handed back
/// unless the blocking task itself failed.
async fn run_blocking<T, F>(
    mut transport: Box<dyn RemoteFileTransport>,
    f: F,
) -> (Option<Box<dyn RemoteFileTransport>>, Result<T>)
where
    F: FnOnce(&mut dyn RemoteFileTransport) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let result = f(transport.as_mut());
        (transport, result)
    })
    .await;

    match joined {
        Ok((transport, result)) => (Some(transport), result),
        Err(e) => (None, Err(Error::Task(format!("transport call failed: {}", e)))),
    }
}

/// Connect with an upper bound on the whole attempt. A timed-out transport is
/// abandoned to its blocking thread.
async fn connect_transport(
    transport: Box<dyn RemoteFileTransport>,
    timeout: Duration,
) -> (Option<Box<dyn RemoteFileTransport>>, Result<()>) {
    match tokio::time::timeout(timeout, run_blocking(transport, move |t| t.connect(timeout))).await
    {
        Ok(result) => result,
        Err(_) => (None, Err(Error::ConnectTimeout(timeout))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::BoundedReceiver;
    use crate::monitor::event::{EventKind, StreamKind};
    use crate::monitor::parser::TheIsleParser;
    use crate::monitor::persistence::{MemoryStateStore, MonitorState};
    use crate::monitor::subscriber::QueueSubscriber;
    use crate::monitor::subscriber::{BoxError, FnSubscriber};
    use crate::monitor::transport::{
        ConnectFailure, DirEntry, FileStat, MemoryFs, MemoryTransport, ReadSeek, memory_transport_factory,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LOG: &str = "/TheIsle/Saved/Logs/TheIsle.log";
    const CHAT: &str = "[2026.01.31-04.47.53:825] LogTheIsleChatData: [Global] [GROUP-1] PlayerOne [76561198000000001]: hello world\n";

    fn config() -> ConnectionConfig {
        let mut config = ConnectionConfig::local("/unused").with_unified_file(LOG);
        config.poll_interval_secs = 1;
        config
    }

    fn monitor(fs: &MemoryFs, store: Arc<dyn StateStore>) -> LogMonitor {
        LogMonitor::new(
            "main",
            config(),
            Arc::new(TheIsleParser::new().unwrap()),
            store,
            memory_transport_factory(fs.clone()),
        )
        .unwrap()
    }

    async fn wait_for_ticks(monitor: &LogMonitor, ticks: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.status().ticks < ticks {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("monitor did not tick in time");
    }

    async fn recv(rx: &mut BoundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.next())
            .await
            .expect("no event in time")
            .expect("channel closed")
    }

    async fn wait_for_state(monitor: &LogMonitor, state: LifecycleState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("monitor did not reach state in time");
    }

    /// Accepts the first login, then rejects every reconnect with bad credentials.
    struct RevokedCredentials {
        inner: MemoryTransport,
        connects: Arc<AtomicUsize>,
    }

    impl RemoteFileTransport for RevokedCredentials {
        fn connect(&mut self, timeout: Duration) -> Result<()> {
            if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.connect(timeout)
            } else {
                Err(Error::Authentication("password changed".to_string()))
            }
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        fn stat(&mut self, path: &str) -> Result<FileStat> {
            self.inner.stat(path)
        }

        fn open_read(&mut self, path: &str) -> Result<Box<dyn ReadSeek + '_>> {
            self.inner.open_read(path)
        }

        fn list_dir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
            self.inner.list_dir(path)
        }

        fn disconnect(&mut self) {
            self.inner.disconnect()
        }

        fn backend_name(&self) -> &'static str {
            "memory"
        }
    }

    struct FailingStore;

    #[async_trait]
    impl StateStore for FailingStore {
        async fn get_state(&self, _: &str, _: &str) -> Result<Option<MonitorState>> {
            Err(Error::StateStore("database offline".to_string()))
        }

        async fn set_state(&self, _: &str, _: &str, _: u64, _: &str) -> Result<()> {
            Err(Error::StateStore("database offline".to_string()))
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut bad = config();
        bad.files.clear();
        let result = LogMonitor::new(
            "main",
            bad,
            Arc::new(TheIsleParser::new().unwrap()),
            Arc::new(MemoryStateStore::new()),
            memory_transport_factory(MemoryFs::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_start_delivers_and_persists() {
        let fs = MemoryFs::new();
        fs.write(LOG, CHAT);
        let store = Arc::new(MemoryStateStore::new());
        let monitor = monitor(&fs, store.clone());

        let (subscriber, mut rx) = QueueSubscriber::new(16);
        monitor.subscribe(EventKind::Chat, Arc::new(subscriber));

        monitor.start(Duration::from_millis(20)).await.unwrap();
        assert_eq!(monitor.state(), LifecycleState::Running);

        let event = recv(&mut rx).await;
        assert_eq!(event.kind(), EventKind::Chat);

        wait_for_ticks(&monitor, 2).await;
        let state = store.get_state("main", "unified").await.unwrap().unwrap();
        assert_eq!(state.byte_offset, CHAT.len() as u64);

        monitor.stop().await.unwrap();
        assert_eq!(monitor.state(), LifecycleState::Stopped);
        assert_eq!(monitor.status().events_delivered, 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let fs = MemoryFs::new();
        let monitor = monitor(&fs, Arc::new(MemoryStateStore::new()));
        monitor.start(Duration::from_millis(20)).await.unwrap();
        monitor.start(Duration::from_millis(20)).await.unwrap();
        assert_eq!(fs.connect_count(), 1);
        monitor.stop().await.unwrap();
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_keeps_monitor_stopped() {
        let fs = MemoryFs::new();
        let failing_fs = fs.clone();
        let monitor = LogMonitor::new(
            "main",
            config(),
            Arc::new(TheIsleParser::new().unwrap()),
            Arc::new(MemoryStateStore::new()),
            Arc::new(move |_: &ConnectionConfig| -> Result<Box<dyn RemoteFileTransport>> {
                Ok(Box::new(MemoryTransport::failing(
                    failing_fs.clone(),
                    ConnectFailure::Unreachable,
                )))
            }),
        )
        .unwrap();

        let err = monitor.start(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(monitor.state(), LifecycleState::Stopped);
        assert!(monitor.status().last_error.is_some());
    }

    #[tokio::test]
    async fn test_resumes_from_persisted_offset() {
        let fs = MemoryFs::new();
        let old = "[2026.01.31-04.00.00:000] LogTheIsleChatData: [Global] [GROUP-1] Old [76561198000000003]: old\n";
        fs.write(LOG, format!("{}{}", old, CHAT));

        let store = Arc::new(MemoryStateStore::new());
        store
            .set_state("main", "unified", old.len() as u64, "")
            .await
            .unwrap();

        let monitor = monitor(&fs, store);
        let (subscriber, mut rx) = QueueSubscriber::new(16);
        monitor.subscribe_all(Arc::new(subscriber));
        monitor.start(Duration::from_millis(20)).await.unwrap();

        let Event::Chat(chat) = recv(&mut rx).await else {
            panic!("expected chat");
        };
        assert_eq!(chat.player, "PlayerOne");
        wait_for_ticks(&monitor, 2).await;
        assert!(rx.try_recv().is_none());
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_at_end_skips_existing_content() {
        let fs = MemoryFs::new();
        fs.write(LOG, CHAT);

        let mut cfg = config();
        cfg.start_at = StartAt::End;
        let monitor = LogMonitor::new(
            "main",
            cfg,
            Arc::new(TheIsleParser::new().unwrap()),
            Arc::new(MemoryStateStore::new()),
            memory_transport_factory(fs.clone()),
        )
        .unwrap();
        let (subscriber, mut rx) = QueueSubscriber::new(16);
        monitor.subscribe_all(Arc::new(subscriber));
        monitor.start(Duration::from_millis(20)).await.unwrap();
        wait_for_ticks(&monitor, 2).await;
        assert!(rx.try_recv().is_none());

        let later = CHAT.replace("hello world", "later");
        fs.append(LOG, &later);
        let Event::Chat(chat) = recv(&mut rx).await else {
            panic!("expected chat");
        };
        assert_eq!(chat.message, "later");
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_store_failure_degrades_but_continues() {
        let fs = MemoryFs::new();
        fs.write(LOG, CHAT);
        let monitor = monitor(&fs, Arc::new(FailingStore));
        let (subscriber, mut rx) = QueueSubscriber::new(16);
        monitor.subscribe_all(Arc::new(subscriber));

        monitor.start(Duration::from_millis(20)).await.unwrap();
        recv(&mut rx).await;
        wait_for_ticks(&monitor, 3).await;

        let status = monitor.status();
        assert!(status.degraded);
        // In-memory position still advances, so nothing is re-delivered
        assert_eq!(status.files[0].offset, CHAT.len() as u64);
        assert_eq!(status.events_delivered, 1);
        assert!(rx.try_recv().is_none());
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_session_loss() {
        let fs = MemoryFs::new();
        fs.write(LOG, "");
        let monitor = monitor(&fs, Arc::new(MemoryStateStore::new()));
        let (subscriber, mut rx) = QueueSubscriber::new(16);
        monitor.subscribe_all(Arc::new(subscriber));
        monitor.start(Duration::from_millis(20)).await.unwrap();

        fs.set_offline(true);
        let ticks = monitor.status().ticks;
        wait_for_ticks(&monitor, ticks + 3).await;
        assert!(monitor.status().last_error.is_some());

        fs.append(LOG, CHAT);
        fs.set_offline(false);
        assert_eq!(recv(&mut rx).await.kind(), EventKind::Chat);
        assert!(fs.connect_count() >= 2);
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_reconnect_stops_monitor() {
        let fs = MemoryFs::new();
        fs.write(LOG, "");
        let connects = Arc::new(AtomicUsize::new(0));
        let factory_fs = fs.clone();
        let factory_connects = connects.clone();
        let monitor = LogMonitor::new(
            "main",
            config(),
            Arc::new(TheIsleParser::new().unwrap()),
            Arc::new(MemoryStateStore::new()),
            Arc::new(move |_: &ConnectionConfig| -> Result<Box<dyn RemoteFileTransport>> {
                Ok(Box::new(RevokedCredentials {
                    inner: MemoryTransport::new(factory_fs.clone()),
                    connects: factory_connects.clone(),
                }))
            }),
        )
        .unwrap();
        monitor.start(Duration::from_millis(20)).await.unwrap();

        // Drop the session so the next tick has to log in again
        fs.set_offline(true);
        wait_for_state(&monitor, LifecycleState::Stopped).await;

        let status = monitor.status();
        let last_error = status.last_error.expect("rejection must be recorded");
        assert!(last_error.contains("authentication failed"), "{}", last_error);

        // No further login attempts once stopped
        let ticks = status.ticks;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.status().ticks, ticks);

        monitor.stop().await.unwrap();
        assert_eq!(monitor.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_subscriber_panic_stops_monitor() {
        let fs = MemoryFs::new();
        fs.write(LOG, "");
        let monitor = monitor(&fs, Arc::new(MemoryStateStore::new()));
        monitor.subscribe_all(Arc::new(FnSubscriber::new(
            |_e: &Event| -> std::result::Result<(), BoxError> { panic!("handler bug") },
        )));
        monitor.start(Duration::from_millis(20)).await.unwrap();

        fs.append(LOG, CHAT);
        wait_for_state(&monitor, LifecycleState::Stopped).await;
        assert_eq!(monitor.status().last_error.as_deref(), Some("poll task panicked"));
        assert!(!monitor.is_running());
        monitor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_per_type_files_use_typed_parser() {
        let fs = MemoryFs::new();
        let chat_log = "/logs/chat.log";
        let kill_log = "/logs/kills.log";
        fs.write(chat_log, "[2026.01.31-04.47.53] [LogTheIsleChatData]: [Global] [Group] PlayerOne [76561198000000001]: hi\n");
        fs.write(kill_log, "[2026.01.31-04.48.00] [LogTheIsleKills]: PlayerOne [76561198000000001] killed PlayerTwo [76561198000000002]\n");

        let mut cfg = ConnectionConfig::local("/unused")
            .with_typed_file(chat_log, StreamKind::Chat)
            .with_typed_file(kill_log, StreamKind::Kill);
        cfg.poll_interval_secs = 1;

        let store = Arc::new(MemoryStateStore::new());
        let monitor = LogMonitor::new(
            "main",
            cfg,
            Arc::new(TheIsleParser::new().unwrap()),
            store.clone(),
            memory_transport_factory(fs.clone()),
        )
        .unwrap();

        let (chat_sub, mut chat_rx) = QueueSubscriber::new(4);
        let (death_sub, mut death_rx) = QueueSubscriber::new(4);
        monitor.subscribe(EventKind::Chat, Arc::new(chat_sub));
        monitor.subscribe(EventKind::Death, Arc::new(death_sub));
        monitor.start(Duration::from_millis(20)).await.unwrap();

        assert_eq!(recv(&mut chat_rx).await.kind(), EventKind::Chat);
        assert_eq!(recv(&mut death_rx).await.kind(), EventKind::Death);

        wait_for_ticks(&monitor, 2).await;
        assert!(store.get_state("main", "chat").await.unwrap().is_some());
        assert!(store.get_state("main", "kill").await.unwrap().is_some());
        monitor.stop().await.unwrap();
    }
}
