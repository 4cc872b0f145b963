// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::select;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use gamelog_monitor::bounded_channel::{self, BoundedSender};
use gamelog_monitor::init::args::{CheckArgs, ListArgs, StartArgs};
use gamelog_monitor::init::config::load_config;
use gamelog_monitor::init::wait;
use gamelog_monitor::monitor::parser::ParserRegistry;
use gamelog_monitor::monitor::persistence::JsonFileStateStore;
use gamelog_monitor::monitor::subscriber::BoxError;
use gamelog_monitor::monitor::transport::create_transport;
use gamelog_monitor::monitor::{
    ConnectionConfig, EngineConfig, Error as MonitorError, Event, MonitorRegistry, Subscriber,
};

const PRINTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Start monitoring and print events as JSON lines
    Start(StartArgs),

    /// Connect to a configured server and disconnect again
    Check(CheckArgs),

    /// List a remote directory through a configured connection
    List(ListArgs),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "gamelog-monitor")]
#[command(bin_name = "gamelog-monitor")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "GAMELOG_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[arg(long, global = true, env = "GAMELOG_CONFIG")]
    /// TOML config file
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    if let Some(Commands::Version) = opt.command {
        println!("{}", get_version());
        return ExitCode::SUCCESS;
    }

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let config = match load_config(opt.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration.");
            return ExitCode::from(1);
        }
    };

    let result = match opt.command {
        Some(Commands::Start(args)) => run_start(config, args),
        Some(Commands::Check(args)) => run_check(&config, &args),
        Some(Commands::List(args)) => run_list(&config, &args),
        _ => {
            // it shouldn't be possible to get here since we mark a subcommand as
            // required
            error!("Must specify a command");
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = e, "Command failed.");
            ExitCode::from(1)
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    connection_id: &'a str,
    event: &'a Event,
}

/// Tags events with their connection and forwards them to the printer task.
struct ForwardSubscriber {
    connection_id: String,
    tx: BoundedSender<(String, Event)>,
}

#[async_trait]
impl Subscriber for ForwardSubscriber {
    async fn on_event(&self, event: &Event) -> Result<(), BoxError> {
        self.tx
            .send((self.connection_id.clone(), event.clone()))
            .await?;
        Ok(())
    }
}

#[tokio::main]
async fn run_start(config: EngineConfig, args: StartArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let selected = select_connections(&config, &args.connections)?;

    let store = Arc::new(JsonFileStateStore::open(&config.state_path)?);
    let registry = MonitorRegistry::new(ParserRegistry::with_defaults()?, store)
        .with_shutdown_timeout(config.shutdown_timeout());

    let (tx, mut rx) = bounded_channel::bounded::<(String, Event)>(args.event_queue_size.max(1));
    let printer = tokio::spawn(async move {
        while let Some((connection_id, event)) = rx.next().await {
            let line = EventLine {
                connection_id: &connection_id,
                event: &event,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
    });

    for (id, conn) in &selected {
        let monitor = match registry.create(id, (*conn).clone()).await {
            Ok(monitor) => monitor,
            Err(e @ MonitorError::UnknownLogFormat(_)) => {
                error!(
                    connection_id = %id,
                    known_formats = ?registry.parsers().formats(),
                    "Unsupported log format"
                );
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        monitor.subscribe_all(Arc::new(ForwardSubscriber {
            connection_id: id.to_string(),
            tx: tx.clone(),
        }));
    }
    drop(tx);

    let override_interval = args.poll_interval_secs.map(Duration::from_secs);
    let started = registry
        .start_all(override_interval)
        .await
        .iter()
        .filter(|(_, result)| result.is_ok())
        .count();
    if started == 0 {
        return Err("no monitor could be started".into());
    }
    info!(started, configured = selected.len(), "Monitors running");

    let mut sig_usr1 = wait::status_signal()?;
    loop {
        select! {
            r = wait::signal_wait() => {
                r?;
                info!("Shutdown signal received.");
                break;
            },
            _ = sig_usr1.recv() => {
                info!("Signal SIGUSR1 received, reporting monitor status");
                for status in registry.statuses().await {
                    info!(
                        connection_id = %status.connection_id,
                        state = ?status.state,
                        ticks = status.ticks,
                        events_delivered = status.events_delivered,
                        duplicates_dropped = status.duplicates_dropped,
                        degraded = status.degraded,
                        last_error = ?status.last_error,
                        "Monitor status"
                    );
                    for file in &status.files {
                        info!(
                            connection_id = %status.connection_id,
                            path = %file.path,
                            stream_key = %file.stream_key,
                            offset = file.offset,
                            "File position"
                        );
                    }
                }
            },
        }
    }

    registry.stop_all().await;
    // Dropping the registry releases the subscribers, which closes the printer's channel
    drop(registry);
    if tokio::time::timeout(PRINTER_DRAIN_TIMEOUT, printer).await.is_err() {
        warn!("Timed out draining event printer");
    }

    Ok(())
}

fn select_connections<'a>(
    config: &'a EngineConfig,
    wanted: &[String],
) -> Result<Vec<(&'a str, &'a ConnectionConfig)>, Box<dyn Error + Send + Sync>> {
    if config.connections.is_empty() {
        return Err("no connections configured".into());
    }
    if wanted.is_empty() {
        return Ok(config
            .connections
            .iter()
            .map(|(id, c)| (id.as_str(), c))
            .collect());
    }
    wanted
        .iter()
        .map(|id| {
            config
                .connections
                .get_key_value(id)
                .map(|(id, c)| (id.as_str(), c))
                .ok_or_else(|| format!("unknown connection: {}", id).into())
        })
        .collect()
}

fn connection<'a>(
    config: &'a EngineConfig,
    id: &str,
) -> Result<&'a ConnectionConfig, Box<dyn Error + Send + Sync>> {
    config
        .connections
        .get(id)
        .ok_or_else(|| format!("unknown connection: {}", id).into())
}

fn run_check(config: &EngineConfig, args: &CheckArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let conn = connection(config, &args.connection)?;
    let mut transport = create_transport(conn)?;

    info!(connection_id = %args.connection, backend = transport.backend_name(), "Testing connection");
    transport.connect(conn.connect_timeout())?;
    transport.disconnect();

    println!("connection {}: ok ({})", args.connection, transport.backend_name());
    Ok(())
}

fn run_list(config: &EngineConfig, args: &ListArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let conn = connection(config, &args.connection)?;
    let mut transport = create_transport(conn)?;

    transport.connect(conn.connect_timeout())?;
    let entries = transport.list_dir(&args.path);
    transport.disconnect();

    for entry in entries? {
        let kind = if entry.is_dir { "d" } else { "-" };
        println!("{} {:>12} {}", kind, entry.size, entry.path);
    }
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    // Events are printed on stdout, so logs go to stderr
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("opentelemetry=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stderr().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
