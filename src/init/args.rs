// SPDX-License-Identifier: Apache-2.0

use clap::Args;

#[derive(Debug, Args, Clone)]
pub struct StartArgs {
    /// Connections to start (default: every configured connection)
    #[arg(
        long = "connection",
        env = "GAMELOG_START_CONNECTIONS",
        value_delimiter = ','
    )]
    pub connections: Vec<String>,

    /// Override the configured poll interval of every connection (seconds)
    #[arg(long, env = "GAMELOG_POLL_INTERVAL_OVERRIDE_SECS")]
    pub poll_interval_secs: Option<u64>,

    /// Size of the queue between monitors and the event printer
    #[arg(long, env = "GAMELOG_EVENT_QUEUE_SIZE", default_value = "1000")]
    pub event_queue_size: usize,
}

impl Default for StartArgs {
    fn default() -> Self {
        StartArgs {
            connections: Vec::new(),
            poll_interval_secs: None,
            event_queue_size: 1000,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Connection to test
    #[arg(long = "connection")]
    pub connection: String,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Connection to list through
    #[arg(long = "connection")]
    pub connection: String,

    /// Remote directory
    #[arg(default_value = "/")]
    pub path: String,
}
