// SPDX-License-Identifier: Apache-2.0

//! Parser for The Isle: Evrima server logs.
//!
//! # Unified log lines
//!
//! ```text
//! [2026.01.31-04.40.00:000][  1]LogTheIsleJoinData: [2026.01.31-04.40.00] PlayerOne [76561198000000001] Joined The Server. Save file found Dino: BP_TyrannosaurusPrime_C, Gender: Male, Growth: 0.85
//! [2026.01.31-04.47.53:825] LogTheIsleChatData: [Global] [GROUP-1] PlayerOne [76561198000000001]: hello world
//! [2026.01.31-05.10.00:000][  4]LogTheIsleCommandData: RCON Command Used [announce] : Server restart in 5
//! [2026.01.31-05.00.00:000][  3]LogTheIsleKillData: [2026.01.31-05.00.00] PlayerTwo [76561198000000002] Dino: BP_Stegosaurus_C, Female, 0.5 - Died from Natural cause
//! ```
//!
//! # Per-type log lines
//!
//! ```text
//! [2026.01.31-04.47.53] [LogTheIsleChatData]: [Global] [Group] PlayerOne [76561198000000001]: hi
//! [2026.01.31-04.47.53] [LogTheIsleKills]: PlayerOne [76561198000000001] killed PlayerTwo [76561198000000002]
//! [2026.01.31-04.47.53] [LogTheIsleAdmin]: AdminOne [76561198000000009] executed: /kick PlayerTwo
//! ```

use regex::{Captures, Regex};

use super::fields::{
    TIMESTAMP_PATTERN, clean_class_name, compile, normalize_gender, parse_growth, split_timestamp,
};
use super::traits::EventParser;
use crate::monitor::error::Result;
use crate::monitor::event::{
    AdminCommandEvent, ChatEvent, DeathEvent, Event, LoginEvent, LogoutEvent, RconCommandEvent,
    StreamKind,
};

pub const THE_ISLE_EVRIMA: &str = "the_isle_evrima";

/// Player joined. Captures `timestamp`, `player`, `steam_id`, `dino`, `gender`, `growth`.
pub const LOGIN_PATTERN: &str = r"\[(?P<timestamp>[^\]]+)\].*LogTheIsleJoinData:\s*\[[^\]]+\]\s+(?P<player>\S+)\s+\[(?P<steam_id>\d+)\]\s+Joined The Server\.\s+Save file found Dino:\s*(?P<dino>BP_\w+_C),\s*Gender:\s*(?P<gender>\w+),\s*Growth:\s*(?P<growth>[\d.]+)";

/// Player left. Adds the optional `safe_logged` marker.
pub const LOGOUT_PATTERN: &str = r"\[(?P<timestamp>[^\]]+)\].*LogTheIsleJoinData:\s*\[[^\]]+\]\s+(?P<player>\S+)\s+\[(?P<steam_id>\d+)\]\s+Left The Server\s*(?P<safe_logged>whilebeing safelogged)?.*Was playing as:\s*(?P<dino>\w+),\s*Gender:\s*(?P<gender>\w+),\s*Growth:\s*(?P<growth>[\d.]+)";

pub const CHAT_PATTERN: &str = r"\[(?P<timestamp>[^\]]+)\].*LogTheIsleChatData.*\[(?P<channel>[^\]]+)\]\s+\[GROUP-\d+\]\s+(?P<player>[^\[]+)\s+\[(?P<steam_id>\d+)\]:\s*(?P<message>.+)";

/// Command received over RCON. The issuing admin is captured when the line names one.
pub const RCON_PATTERN: &str = r"\[(?P<timestamp>[^\]]+)\].*LogTheIsleCommandData:?(?:\s*\[[^\]]+\]\s+(?P<executor_name>\S+)\s+\[(?P<executor_id>\d+)\])?.*RCON Command Used\s+\[(?P<command>[^\]]+)\]\s*:\s*(?P<details>.*)";

/// In-game admin command with an optional target section.
pub const ADMIN_PATTERN: &str = r"\[(?P<timestamp>[^\]]+)\].*LogTheIsleCommandData:\s*\[[^\]]+\]\s+(?P<admin>\S+)\s+\[(?P<admin_id>\d+)\]\s+used command:\s*(?P<command>.+?)(?:\s+at:\s*(?P<target>[^,]+),\s+\[(?P<target_id>\d+)\],\s+Class:\s*(?P<target_class>\w+),\s*Gender:\s*(?P<target_gender>\w+),\s*Previous value:\s*(?P<previous>[\d.]+%?),\s*New value:\s*(?P<new>[\d.]+%?))?\s*$";

pub const DEATH_PATTERN: &str = r"\[(?P<timestamp>[^\]]+)\].*LogTheIsleKillData:\s*\[[^\]]+\]\s+(?P<victim>\S+)\s+\[(?P<victim_id>\d+)\]\s+Dino:\s*(?P<victim_dino>(?:BP_)?\w+(?:_C)?),\s*(?P<victim_gender>\w+),\s*(?P<victim_growth>[\d.]+)\s*-\s*(?P<cause>.+)";

/// Player kill encoded in a death cause.
pub const KILLER_CAUSE_PATTERN: &str = r"^Killed by\s+(?P<killer>\S+)\s+\[(?P<killer_id>\d+)\](?:\s+(?:using|as)\s+(?P<killer_dino>\w+)(?:,\s*(?P<killer_growth>[\d.]+))?)?";

pub const LEGACY_CHAT_PATTERN: &str = r"\[LogTheIsleChatData\]:\s*\[(?P<channel>\w+)\]\s*(?:\[(?P<group>\w+)\])?\s*(?P<player>.+?)\s*\[(?P<steam_id>\d{17})\]:\s*(?P<message>.+)$";

pub const LEGACY_KILL_PATTERN: &str = r"\[LogTheIsleKills\]:\s*(?P<killer>.+?)\s*\[(?P<killer_id>\d{17})\]\s*killed\s*(?P<victim>.+?)\s*\[(?P<victim_id>\d{17})\]";

pub const LEGACY_ADMIN_PATTERN: &str = r"\[LogTheIsleAdmin\]:\s*(?P<admin>.+?)\s*\[(?P<admin_id>\d{17})\]\s*executed:\s*(?P<command>.+)$";

fn text(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn opt_text(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

pub struct TheIsleParser {
    login: Regex,
    logout: Regex,
    chat: Regex,
    rcon: Regex,
    admin: Regex,
    death: Regex,
    killer_cause: Regex,
    legacy_chat: Regex,
    legacy_kill: Regex,
    legacy_admin: Regex,
    timestamp: Regex,
}

impl TheIsleParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            login: compile(LOGIN_PATTERN)?,
            logout: compile(LOGOUT_PATTERN)?,
            chat: compile(CHAT_PATTERN)?,
            rcon: compile(RCON_PATTERN)?,
            admin: compile(ADMIN_PATTERN)?,
            death: compile(DEATH_PATTERN)?,
            killer_cause: compile(KILLER_CAUSE_PATTERN)?,
            legacy_chat: compile(LEGACY_CHAT_PATTERN)?,
            legacy_kill: compile(LEGACY_KILL_PATTERN)?,
            legacy_admin: compile(LEGACY_ADMIN_PATTERN)?,
            timestamp: compile(TIMESTAMP_PATTERN)?,
        })
    }

    fn login(&self, line: &str) -> Option<Event> {
        let caps = self.login.captures(line)?;
        let (dinosaur, is_prime) = clean_class_name(&text(&caps, "dino"));
        Some(Event::Login(LoginEvent {
            timestamp: text(&caps, "timestamp"),
            player: text(&caps, "player"),
            steam_id: text(&caps, "steam_id"),
            dinosaur,
            gender: normalize_gender(&text(&caps, "gender")),
            growth_fraction: parse_growth(&text(&caps, "growth")),
            is_prime,
            raw_line: line.to_string(),
        }))
    }

    fn logout(&self, line: &str) -> Option<Event> {
        let caps = self.logout.captures(line)?;
        let (dinosaur, is_prime) = clean_class_name(&text(&caps, "dino"));
        Some(Event::Logout(LogoutEvent {
            timestamp: text(&caps, "timestamp"),
            player: text(&caps, "player"),
            steam_id: text(&caps, "steam_id"),
            dinosaur,
            gender: normalize_gender(&text(&caps, "gender")),
            growth_fraction: parse_growth(&text(&caps, "growth")),
            is_prime,
            safe_logged: caps.name("safe_logged").is_some(),
            raw_line: line.to_string(),
        }))
    }

    fn chat(&self, line: &str) -> Option<Event> {
        let caps = self.chat.captures(line)?;
        Some(Event::Chat(ChatEvent {
            timestamp: text(&caps, "timestamp"),
            channel: text(&caps, "channel"),
            player: text(&caps, "player"),
            steam_id: text(&caps, "steam_id"),
            message: text(&caps, "message"),
            raw_line: line.to_string(),
        }))
    }

    fn rcon(&self, line: &str) -> Option<Event> {
        let caps = self.rcon.captures(line)?;
        Some(Event::RconCommand(RconCommandEvent {
            timestamp: text(&caps, "timestamp"),
            command: text(&caps, "command"),
            details: text(&caps, "details"),
            executor_id: opt_text(&caps, "executor_id"),
            executor_name: opt_text(&caps, "executor_name"),
            raw_line: line.to_string(),
        }))
    }

    fn admin(&self, line: &str) -> Option<Event> {
        let caps = self.admin.captures(line)?;
        Some(Event::AdminCommand(AdminCommandEvent {
            timestamp: text(&caps, "timestamp"),
            admin: text(&caps, "admin"),
            admin_id: text(&caps, "admin_id"),
            command: text(&caps, "command"),
            target: opt_text(&caps, "target"),
            target_class: opt_text(&caps, "target_class").map(|c| clean_class_name(&c).0),
            target_gender: opt_text(&caps, "target_gender").map(|g| normalize_gender(&g)),
            previous_value: opt_text(&caps, "previous"),
            new_value: opt_text(&caps, "new"),
            raw_line: line.to_string(),
        }))
    }

    fn death(&self, line: &str) -> Option<Event> {
        let caps = self.death.captures(line)?;
        let (victim_class, victim_is_prime) = clean_class_name(&text(&caps, "victim_dino"));
        let cause = text(&caps, "cause");

        let mut event = DeathEvent {
            timestamp: text(&caps, "timestamp"),
            victim: text(&caps, "victim"),
            victim_steam_id: text(&caps, "victim_id"),
            victim_class,
            victim_gender: normalize_gender(&text(&caps, "victim_gender")),
            victim_growth: parse_growth(&text(&caps, "victim_growth")),
            victim_is_prime,
            cause,
            killer: None,
            killer_steam_id: None,
            killer_class: None,
            killer_growth: None,
            killer_is_prime: None,
            raw_line: line.to_string(),
        };

        if let Some(killer) = self.killer_cause.captures(&event.cause) {
            event.killer = opt_text(&killer, "killer");
            event.killer_steam_id = opt_text(&killer, "killer_id");
            if let Some(dino) = opt_text(&killer, "killer_dino") {
                let (class, prime) = clean_class_name(&dino);
                event.killer_class = Some(class);
                event.killer_is_prime = Some(prime);
            }
            event.killer_growth = opt_text(&killer, "killer_growth").map(|g| parse_growth(&g));
        }

        Some(Event::Death(event))
    }

    fn legacy_chat(&self, line: &str) -> Option<Event> {
        let caps = self.legacy_chat.captures(line)?;
        let (timestamp, _) = split_timestamp(&self.timestamp, line);
        let channel = format!("{} {}", text(&caps, "channel"), text(&caps, "group"));
        Some(Event::Chat(ChatEvent {
            timestamp,
            channel: channel.trim().to_string(),
            player: text(&caps, "player"),
            steam_id: text(&caps, "steam_id"),
            message: text(&caps, "message"),
            raw_line: line.to_string(),
        }))
    }

    fn legacy_kill(&self, line: &str) -> Option<Event> {
        let caps = self.legacy_kill.captures(line)?;
        let (timestamp, _) = split_timestamp(&self.timestamp, line);
        let killer = text(&caps, "killer");
        Some(Event::Death(DeathEvent {
            timestamp,
            victim: text(&caps, "victim"),
            victim_steam_id: text(&caps, "victim_id"),
            victim_class: String::new(),
            victim_gender: String::new(),
            victim_growth: 0.0,
            victim_is_prime: false,
            cause: format!("Killed by {}", killer),
            killer: Some(killer),
            killer_steam_id: opt_text(&caps, "killer_id"),
            killer_class: None,
            killer_growth: None,
            killer_is_prime: None,
            raw_line: line.to_string(),
        }))
    }

    fn legacy_admin(&self, line: &str) -> Option<Event> {
        let caps = self.legacy_admin.captures(line)?;
        let (timestamp, _) = split_timestamp(&self.timestamp, line);
        let executed = text(&caps, "command");
        let mut parts = executed.split_whitespace();
        let command = parts.next().unwrap_or_default().to_string();
        let target = parts.next().map(str::to_string);
        Some(Event::AdminCommand(AdminCommandEvent {
            timestamp,
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
}

impl EventParser for TheIsleParser {
    fn name(&self) -> &'static str {
        THE_ISLE_EVRIMA
    }

    fn parse_line(&self, line: &str) -> Event {
        let line = line.trim();
        if line.is_empty() {
            return Event::unknown("", line);
        }

        self.login(line)
            .or_else(|| self.logout(line))
            .or_else(|| self.chat(line))
            .or_else(|| self.rcon(line))
            .or_else(|| self.admin(line))
            .or_else(|| self.death(line))
            .or_else(|| self.legacy_chat(line))
            .or_else(|| self.legacy_admin(line))
            .or_else(|| self.legacy_kill(line))
            .unwrap_or_else(|| {
                let (timestamp, _) = split_timestamp(&self.timestamp, line);
                Event::unknown(timestamp, line)
            })
    }

    fn parse_typed(&self, line: &str, kind: StreamKind) -> Event {
        let line = line.trim();
        let parsed = match kind {
            StreamKind::Chat => self.chat(line).or_else(|| self.legacy_chat(line)),
            StreamKind::Admin => self
                .rcon(line)
                .or_else(|| self.admin(line))
                .or_else(|| self.legacy_admin(line)),
            StreamKind::Kill => self.death(line).or_else(|| self.legacy_kill(line)),
        };

        parsed.unwrap_or_else(|| {
            let (timestamp, _) = split_timestamp(&self.timestamp, line);
            Event::unknown(timestamp, line)
        })
    }
}
