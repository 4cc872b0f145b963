// SPDX-License-Identifier: Apache-2.0

//! Parser for Path of Titans server logs. Players are identified by Alderon
//! ids of the form `123-456-789`.
//!
//! ```text
//! [2026.01.31-04.47.53] [Global] PlayerOne (123-456-789): hello
//! [2026.01.31-04.47.53] PlayerOne (123-456-789) killed PlayerTwo (987-654-321)
//! [2026.01.31-04.47.53] Admin AdminOne (111-222-333): /kick PlayerTwo
//! ```

use regex::{Captures, Regex};

use super::fields::{TIMESTAMP_PATTERN, compile, split_timestamp};
use super::traits::EventParser;
use crate::monitor::error::Result;
use crate::monitor::event::{AdminCommandEvent, ChatEvent, DeathEvent, Event, StreamKind};

pub const PATH_OF_TITANS: &str = "path_of_titans";

pub const CHAT_PATTERN: &str =
    r"^\[(?P<channel>\w+)\]\s*(?P<player>.+?)\s*\((?P<player_id>\d{3}-\d{3}-\d{3})\):\s*(?P<message>.+)$";

pub const KILL_PATTERN: &str = r"^(?P<killer>.+?)\s*\((?P<killer_id>\d{3}-\d{3}-\d{3})\)\s*killed\s*(?P<victim>.+?)\s*\((?P<victim_id>\d{3}-\d{3}-\d{3})\)";

pub const ADMIN_PATTERN: &str =
    r"^Admin\s+(?P<admin>.+?)\s*\((?P<admin_id>\d{3}-\d{3}-\d{3})\):\s*(?P<command>.+)$";

fn text(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

pub struct PathOfTitansParser {
    chat: Regex,
    kill: Regex,
    admin: Regex,
    timestamp: Regex,
}

impl PathOfTitansParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            chat: compile(CHAT_PATTERN)?,
            kill: compile(KILL_PATTERN)?,
            admin: compile(ADMIN_PATTERN)?,
            timestamp: compile(TIMESTAMP_PATTERN)?,
        })
    }

    fn chat(&self, timestamp: &str, body: &str, line: &str) -> Option<Event> {
        let caps = self.chat.captures(body)?;
        Some(Event::Chat(ChatEvent {
            timestamp: timestamp.to_string(),
            channel: text(&caps, "channel"),
            player: text(&caps, "player"),
            steam_id: text(&caps, "player_id"),
            message: text(&caps, "message"),
            raw_line: line.to_string(),
        }))
    }

    fn admin(&self, timestamp: &str, body: &str, line: &str) -> Option<Event> {
        let caps = self.admin.captures(body)?;
        let executed = text(&caps, "command");
        let mut parts = executed.split_whitespace();
        let command = parts.next().unwrap_or_default().to_string();
        let target = parts.next().map(str::to_string);
        Some(Event::AdminCommand(AdminCommandEvent {
            timestamp: timestamp.to_string(),
            admin: text(&caps, "admin"),
            admin_id: text(&caps, "admin_id"),
            command,
            target,
            target_class: None,
            target_gender: None,
            previous_value: None,
            new_value: None,
            raw_line: line.to_string(),
        }))
    }

    fn kill(&self, timestamp: &str, body: &str, line: &str) -> Option<Event> {
        let caps = self.kill.captures(body)?;
        let killer = text(&caps, "killer");
        Some(Event::Death(DeathEvent {
            timestamp: timestamp.to_string(),
            victim: text(&caps, "victim"),
            victim_steam_id: text(&caps, "victim_id"),
            victim_class: String::new(),
            victim_gender: String::new(),
            victim_growth: 0.0,
            victim_is_prime: false,
            cause: format!("Killed by {}", killer),
            killer: Some(killer),
            killer_steam_id: Some(text(&caps, "killer_id")),
            killer_class: None,
            killer_growth: None,
            killer_is_prime: None,
            raw_line: line.to_string(),
        }))
    }
}

impl EventParser for PathOfTitansParser {
    fn name(&self) -> &'static str {
        PATH_OF_TITANS
    }

    fn parse_line(&self, line: &str) -> Event {
        let line = line.trim();
        let (timestamp, body) = split_timestamp(&self.timestamp, line);

        self.chat(&timestamp, body, line)
            .or_else(|| self.admin(&timestamp, body, line))
            .or_else(|| self.kill(&timestamp, body, line))
            .unwrap_or_else(|| Event::unknown(timestamp.clone(), line))
    }

    fn parse_typed(&self, line: &str, kind: StreamKind) -> Event {
        let line = line.trim();
        let (timestamp, body) = split_timestamp(&self.timestamp, line);

        let parsed = match kind {
            StreamKind::Chat => self.chat(&timestamp, body, line),
            StreamKind::Admin => self.admin(&timestamp, body, line),
            StreamKind::Kill => self.kill(&timestamp, body, line),
        };
        parsed.unwrap_or_else(|| Event::unknown(timestamp.clone(), line))
    }
}
