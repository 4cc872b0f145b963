// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests driving monitors through the registry over the in-memory
//! and local-directory transports.

use std::sync::Arc;
use std::time::Duration;

use gamelog_monitor::bounded_channel::BoundedReceiver;
use gamelog_monitor::monitor::dedup::DedupGuard;
use gamelog_monitor::monitor::parser::ParserRegistry;
use gamelog_monitor::monitor::persistence::{JsonFileStateStore, MemoryStateStore, StateStore};
use gamelog_monitor::monitor::transport::{
    ConnectFailure, MemoryFs, MemoryTransport, RemoteFileTransport, memory_transport_factory,
};
use gamelog_monitor::monitor::{
    ConnectionConfig, Error, Event, EventKind, LifecycleState, LogMonitor, MonitorRegistry,
    QueueSubscriber, Subscription,
};
use tempfile::TempDir;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);
const POLL: Duration = Duration::from_millis(25);
const LOG: &str = "/TheIsle/Saved/Logs/TheIsle.log";

const LOGIN: &str = "[2026.01.31-04.40.00:000][  1]LogTheIsleJoinData: [2026.01.31-04.40.00] PlayerOne [76561198000000001] Joined The Server. Save file found Dino: BP_TyrannosaurusPrime_C, Gender: male, Growth: 0.85";
const CHAT: &str = "[2026.01.31-04.47.53:825] LogTheIsleChatData: [Global] [GROUP-1] PlayerOne [76561198000000001]: hello world";
const RCON: &str = "[2026.01.31-05.10.00:000][  4]LogTheIsleCommandData: [2026.01.31-05.10.00] AdminOne [76561198000000009] used command: RCON Command Used [announce] : Server restart in 5";

fn line(s: &str) -> String {
    format!("{}\n", s)
}

fn chat_line(n: usize) -> String {
    line(&format!(
        "[2026.01.31-04.47.{:02}:000] LogTheIsleChatData: [Global] [GROUP-1] PlayerOne [76561198000000001]: message {}",
        n % 60,
        n
    ))
}

fn registry(fs: &MemoryFs, store: Arc<dyn StateStore>) -> MonitorRegistry {
    MonitorRegistry::new(ParserRegistry::with_defaults().unwrap(), store)
        .with_transport_factory(memory_transport_factory(fs.clone()))
        .with_shutdown_timeout(Duration::from_secs(2))
}

fn unified() -> ConnectionConfig {
    ConnectionConfig::local("/unused").with_unified_file(LOG)
}

async fn subscribe(monitor: &LogMonitor, subscription: Subscription) -> BoundedReceiver<Event> {
    let (subscriber, rx) = QueueSubscriber::new(64);
    monitor.subscribe(subscription, Arc::new(subscriber));
    rx
}

async fn next_event(rx: &mut BoundedReceiver<Event>) -> Event {
    timeout(TEST_TIMEOUT, rx.next())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_for_ticks(monitor: &LogMonitor, ticks: u64) {
    timeout(TEST_TIMEOUT, async {
        while monitor.status().ticks < ticks {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for poll ticks");
}

/// Wait for `n` more ticks than have run so far.
async fn wait_more_ticks(monitor: &LogMonitor, n: u64) {
    let target = monitor.status().ticks + n;
    wait_for_ticks(monitor, target).await;
}

#[tokio::test]
async fn test_chat_line_is_delivered() {
    let fs = MemoryFs::new();
    fs.write(LOG, line(CHAT));
    let registry = registry(&fs, Arc::new(MemoryStateStore::new()));

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut rx = subscribe(&monitor, EventKind::Chat.into()).await;
    registry.start("main", Some(POLL)).await.unwrap();

    let Event::Chat(chat) = next_event(&mut rx).await else {
        panic!("expected a chat event");
    };
    assert_eq!(chat.channel, "Global");
    assert_eq!(chat.player, "PlayerOne");
    assert_eq!(chat.steam_id, "76561198000000001");
    assert_eq!(chat.message, "hello world");

    registry.stop_all().await;
}

#[tokio::test]
async fn test_quiet_file_delivers_nothing_new() {
    let fs = MemoryFs::new();
    fs.write(LOG, line(CHAT));
    let store = Arc::new(MemoryStateStore::new());
    let registry = registry(&fs, store.clone());

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut rx = subscribe(&monitor, Subscription::All).await;
    registry.start("main", Some(POLL)).await.unwrap();
    next_event(&mut rx).await;
    wait_more_ticks(&monitor, 1).await;

    let before = monitor.status();
    wait_more_ticks(&monitor, 2).await;
    let after = monitor.status();

    assert!(rx.try_recv().is_none());
    assert_eq!(before.files[0].offset, after.files[0].offset);
    assert_eq!(after.events_delivered, 1);
    assert_eq!(after.duplicates_dropped, 0);
    assert_eq!(
        store.get_state("main", "unified").await.unwrap().unwrap().byte_offset,
        line(CHAT).len() as u64
    );

    registry.stop_all().await;
}

#[tokio::test]
async fn test_unified_login_then_chat_in_order() {
    let fs = MemoryFs::new();
    fs.write(LOG, format!("{}{}", line(LOGIN), line(CHAT)));
    let registry = registry(&fs, Arc::new(MemoryStateStore::new()));

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut logins = subscribe(&monitor, EventKind::Login.into()).await;
    let mut chats = subscribe(&monitor, EventKind::Chat.into()).await;
    let mut all = subscribe(&monitor, Subscription::All).await;
    registry.start("main", Some(POLL)).await.unwrap();

    let Event::Login(login) = next_event(&mut logins).await else {
        panic!("expected a login event");
    };
    assert_eq!(login.dinosaur, "Tyrannosaurus (Prime)");
    assert!(login.is_prime);
    assert_eq!(next_event(&mut chats).await.kind(), EventKind::Chat);

    assert_eq!(next_event(&mut all).await.kind(), EventKind::Login);
    assert_eq!(next_event(&mut all).await.kind(), EventKind::Chat);

    wait_more_ticks(&monitor, 1).await;
    assert_eq!(monitor.status().events_delivered, 2);
    assert!(logins.try_recv().is_none());
    assert!(chats.try_recv().is_none());

    registry.stop_all().await;
}

#[test]
fn test_dedup_capacity_eviction() {
    let mut guard = DedupGuard::new(1000);
    for i in 0..1001 {
        assert!(guard.check_and_record(&format!("fp-{}", i)));
    }
    assert_eq!(guard.len(), 801);
    for i in 0..200 {
        assert!(!guard.seen(&format!("fp-{}", i)));
    }
    for i in 200..1001 {
        assert!(guard.seen(&format!("fp-{}", i)));
    }
}

#[tokio::test]
async fn test_wrong_credentials_never_ticks() {
    let fs = MemoryFs::new();
    fs.write(LOG, line(CHAT));
    let failing_fs = fs.clone();
    let registry = MonitorRegistry::new(
        ParserRegistry::with_defaults().unwrap(),
        Arc::new(MemoryStateStore::new()),
    )
    .with_transport_factory(Arc::new(
        move |_: &ConnectionConfig| -> gamelog_monitor::monitor::Result<Box<dyn RemoteFileTransport>> {
            Ok(Box::new(MemoryTransport::failing(
                failing_fs.clone(),
                ConnectFailure::BadCredentials,
            )))
        },
    ));

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut rx = subscribe(&monitor, Subscription::All).await;

    let err = registry.start("main", Some(POLL)).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    assert!(!err.is_retryable());
    assert_eq!(monitor.state(), LifecycleState::Stopped);

    tokio::time::sleep(POLL * 4).await;
    assert_eq!(monitor.status().ticks, 0);
    assert!(rx.try_recv().is_none());
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test]
async fn test_replayed_line_is_delivered_once() {
    let fs = MemoryFs::new();
    fs.write(LOG, line(CHAT));
    let registry = registry(&fs, Arc::new(MemoryStateStore::new()));

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut rx = subscribe(&monitor, Subscription::All).await;
    registry.start("main", Some(POLL)).await.unwrap();
    next_event(&mut rx).await;

    // The same line written again, as a stale re-read would produce it
    fs.append(LOG, line(CHAT));
    fs.append(LOG, chat_line(7));

    let Event::Chat(chat) = next_event(&mut rx).await else {
        panic!("expected a chat event");
    };
    assert_eq!(chat.message, "message 7");
    assert_eq!(monitor.status().duplicates_dropped, 1);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_offset_tracks_appended_bytes() {
    let fs = MemoryFs::new();
    fs.write(LOG, "");
    let store = Arc::new(MemoryStateStore::new());
    let registry = registry(&fs, store.clone());

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut rx = subscribe(&monitor, Subscription::All).await;
    registry.start("main", Some(POLL)).await.unwrap();

    let mut total = 0;
    for i in 0..5 {
        let l = chat_line(i);
        total += l.len() as u64;
        fs.append(LOG, &l);
        next_event(&mut rx).await;
    }
    // A partial line is not consumed until it is complete
    fs.append(LOG, "[2026.01.31-05.00.00:000] LogTheIsleChatData: [Glo");
    wait_more_ticks(&monitor, 2).await;

    let state = store.get_state("main", "unified").await.unwrap().unwrap();
    assert_eq!(state.byte_offset, total);
    assert_eq!(monitor.status().events_delivered, 5);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_rotation_restarts_from_beginning() {
    let fs = MemoryFs::new();
    fs.write(LOG, format!("{}{}{}", chat_line(1), chat_line(2), chat_line(3)));
    let store = Arc::new(MemoryStateStore::new());
    let registry = registry(&fs, store.clone());

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut rx = subscribe(&monitor, Subscription::All).await;
    registry.start("main", Some(POLL)).await.unwrap();
    for _ in 0..3 {
        next_event(&mut rx).await;
    }

    let rotated = line(LOGIN);
    fs.write(LOG, &rotated);

    assert_eq!(next_event(&mut rx).await.kind(), EventKind::Login);
    wait_more_ticks(&monitor, 1).await;
    let state = store.get_state("main", "unified").await.unwrap().unwrap();
    assert!(state.byte_offset <= rotated.len() as u64);
    assert_eq!(state.byte_offset, rotated.len() as u64);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_rcon_line_is_not_admin_command() {
    let fs = MemoryFs::new();
    fs.write(LOG, line(RCON));
    let registry = registry(&fs, Arc::new(MemoryStateStore::new()));

    let monitor = registry.create("main", unified()).await.unwrap();
    let mut admin = subscribe(&monitor, EventKind::AdminCommand.into()).await;
    let mut rcon = subscribe(&monitor, EventKind::RconCommand.into()).await;
    registry.start("main", Some(POLL)).await.unwrap();

    let Event::RconCommand(cmd) = next_event(&mut rcon).await else {
        panic!("expected an rcon event");
    };
    assert_eq!(cmd.command, "announce");
    assert_eq!(cmd.details, "Server restart in 5");
    wait_more_ticks(&monitor, 1).await;
    assert!(admin.try_recv().is_none());

    registry.stop_all().await;
}

#[tokio::test]
async fn test_unparseable_lines_still_advance_offset() {
    let fs = MemoryFs::new();
    let noise = "[2026.01.31-04.00.00:000][  0]LogInit: Build: ++UE5+Release-5.1\n";
    fs.write(LOG, noise);
    let store = Arc::new(MemoryStateStore::new());
    let registry = registry(&fs, store.clone());

    let monitor = registry.create("main", unified()).await.unwrap();
    registry.start("main", Some(POLL)).await.unwrap();
    wait_for_ticks(&monitor, 2).await;

    let state = store.get_state("main", "unified").await.unwrap().unwrap();
    assert_eq!(state.byte_offset, noise.len() as u64);
    assert_eq!(monitor.status().events_delivered, 0);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_failing_connection_does_not_affect_others() {
    let healthy = MemoryFs::new();
    healthy.write(LOG, line(CHAT));
    let unreachable = MemoryFs::new();
    unreachable.set_offline(true);

    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let good = registry(&healthy, store.clone());
    let bad = registry(&unreachable, store);

    let ok_monitor = good.create("good", unified()).await.unwrap();
    let mut rx = subscribe(&ok_monitor, Subscription::All).await;
    bad.create("bad", unified()).await.unwrap();

    assert!(bad.start("bad", Some(POLL)).await.unwrap_err().is_connection_error());
    good.start("good", Some(POLL)).await.unwrap();
    assert_eq!(next_event(&mut rx).await.kind(), EventKind::Chat);

    good.stop_all().await;
    bad.stop_all().await;
}

#[tokio::test]
async fn test_restart_resumes_from_json_state() {
    let logs = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let state_path = state_dir.path().join("state.json");
    std::fs::create_dir_all(logs.path().join("TheIsle/Saved/Logs")).unwrap();
    let log_path = logs.path().join("TheIsle/Saved/Logs/TheIsle.log");
    std::fs::write(&log_path, line(LOGIN)).unwrap();

    let config = ConnectionConfig::local(logs.path()).with_unified_file(LOG);

    {
        let store = Arc::new(JsonFileStateStore::open(&state_path).unwrap());
        let registry = MonitorRegistry::new(ParserRegistry::with_defaults().unwrap(), store);
        let monitor = registry.create("main", config.clone()).await.unwrap();
        let mut rx = subscribe(&monitor, Subscription::All).await;
        registry.start("main", Some(POLL)).await.unwrap();
        assert_eq!(next_event(&mut rx).await.kind(), EventKind::Login);
        wait_more_ticks(&monitor, 1).await;
        registry.stop_all().await;
    }

    let mut contents = std::fs::read_to_string(&log_path).unwrap();
    contents.push_str(&line(CHAT));
    std::fs::write(&log_path, contents).unwrap();

    let store = Arc::new(JsonFileStateStore::open(&state_path).unwrap());
    let registry = MonitorRegistry::new(ParserRegistry::with_defaults().unwrap(), store);
    let monitor = registry.create("main", config).await.unwrap();
    let mut rx = subscribe(&monitor, Subscription::All).await;
    registry.start("main", Some(POLL)).await.unwrap();

    // Only the line appended while stopped is delivered
    assert_eq!(next_event(&mut rx).await.kind(), EventKind::Chat);
    wait_more_ticks(&monitor, 2).await;
    assert!(rx.try_recv().is_none());

    registry.stop_all().await;
}
