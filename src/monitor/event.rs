// SPDX-License-Identifier: Apache-2.0

//! Structured events extracted from game-server log lines.
//!
//! [`Event`] is a closed sum type: parsers produce it, subscribers consume it,
//! and both sides dispatch on [`EventKind`] rather than on concrete types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stream key used for the single file of a unified-mode connection.
pub const UNIFIED_STREAM_KEY: &str = "unified";

/// Kind of an [`Event`]. Subscribers register against these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Login,
    Logout,
    Chat,
    AdminCommand,
    RconCommand,
    Death,
    Unknown,
}

impl EventKind {
    /// Every kind that is ever delivered to subscribers.
    pub const DELIVERABLE: [EventKind; 6] = [
        EventKind::Login,
        EventKind::Logout,
        EventKind::Chat,
        EventKind::AdminCommand,
        EventKind::RconCommand,
        EventKind::Death,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Login => "login",
            EventKind::Logout => "logout",
            EventKind::Chat => "chat",
            EventKind::AdminCommand => "admin_command",
            EventKind::RconCommand => "rcon_command",
            EventKind::Death => "death",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a dedicated log file in per-type mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Chat,
    Kill,
    Admin,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Chat, StreamKind::Kill, StreamKind::Admin];

    /// Key under which this stream's read position is persisted.
    pub fn stream_key(&self) -> &'static str {
        match self {
            StreamKind::Chat => "chat",
            StreamKind::Kill => "kill",
            StreamKind::Admin => "admin",
        }
    }

    /// Whether an event of `kind` can come out of a file of this stream kind.
    pub fn covers(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (StreamKind::Chat, EventKind::Chat)
                | (StreamKind::Kill, EventKind::Death)
                | (StreamKind::Admin, EventKind::AdminCommand)
                | (StreamKind::Admin, EventKind::RconCommand)
        )
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(StreamKind::Chat),
            "kill" | "death" => Ok(StreamKind::Kill),
            "admin" => Ok(StreamKind::Admin),
            _ => Err(format!(
                "Invalid stream kind '{}'. Valid options: chat, kill, admin",
                s
            )),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stream_key())
    }
}

/// A player joined the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginEvent {
    pub timestamp: String,
    pub player: String,
    pub steam_id: String,
    pub dinosaur: String,
    pub gender: String,
    pub growth_fraction: f64,
    pub is_prime: bool,
    pub raw_line: String,
}

/// A player left the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogoutEvent {
    pub timestamp: String,
    pub player: String,
    pub steam_id: String,
    pub dinosaur: String,
    pub gender: String,
    pub growth_fraction: f64,
    pub is_prime: bool,
    pub safe_logged: bool,
    pub raw_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEvent {
    pub timestamp: String,
    pub channel: String,
    pub player: String,
    pub steam_id: String,
    pub message: String,
    pub raw_line: String,
}

/// An in-game admin command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminCommandEvent {
    pub timestamp: String,
    pub admin: String,
    pub admin_id: String,
    pub command: String,
    pub target: Option<String>,
    pub target_class: Option<String>,
    pub target_gender: Option<String>,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub raw_line: String,
}

/// A command that reached the server over RCON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RconCommandEvent {
    pub timestamp: String,
    pub command: String,
    pub details: String,
    pub executor_id: Option<String>,
    pub executor_name: Option<String>,
    pub raw_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeathEvent {
    pub timestamp: String,
    pub victim: String,
    pub victim_steam_id: String,
    pub victim_class: String,
    pub victim_gender: String,
    pub victim_growth: f64,
    pub victim_is_prime: bool,
    pub cause: String,
    pub killer: Option<String>,
    pub killer_steam_id: Option<String>,
    pub killer_class: Option<String>,
    pub killer_growth: Option<f64>,
    pub killer_is_prime: Option<bool>,
    pub raw_line: String,
}

/// A line no pattern recognised. Never delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownEvent {
    pub timestamp: String,
    pub raw_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Login(LoginEvent),
    Logout(LogoutEvent),
    Chat(ChatEvent),
    AdminCommand(AdminCommandEvent),
    RconCommand(RconCommandEvent),
    Death(DeathEvent),
    Unknown(UnknownEvent),
}

impl Event {
    pub fn unknown(timestamp: impl Into<String>, raw_line: impl Into<String>) -> Self {
        Event::Unknown(UnknownEvent {
            timestamp: timestamp.into(),
            raw_line: raw_line.into(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Login(_) => EventKind::Login,
            Event::Logout(_) => EventKind::Logout,
            Event::Chat(_) => EventKind::Chat,
            Event::AdminCommand(_) => EventKind::AdminCommand,
            Event::RconCommand(_) => EventKind::RconCommand,
            Event::Death(_) => EventKind::Death,
            Event::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Timestamp exactly as it appeared in the source line.
    pub fn timestamp(&self) -> &str {
        match self {
            Event::Login(e) => &e.timestamp,
            Event::Logout(e) => &e.timestamp,
            Event::Chat(e) => &e.timestamp,
            Event::AdminCommand(e) => &e.timestamp,
            Event::RconCommand(e) => &e.timestamp,
            Event::Death(e) => &e.timestamp,
            Event::Unknown(e) => &e.timestamp,
        }
    }

    pub fn raw_line(&self) -> &str {
        match self {
            Event::Login(e) => &e.raw_line,
            Event::Logout(e) => &e.raw_line,
            Event::Chat(e) => &e.raw_line,
            Event::AdminCommand(e) => &e.raw_line,
            Event::RconCommand(e) => &e.raw_line,
            Event::Death(e) => &e.raw_line,
            Event::Unknown(e) => &e.raw_line,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Event::Unknown(_))
    }
}
