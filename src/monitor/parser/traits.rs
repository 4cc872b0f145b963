// SPDX-License-Identifier: Apache-2.0

use crate::monitor::event::{Event, StreamKind};

/// EventParser classifies raw log lines of one game's log format.
///
/// Parsing is pure and never fails: a line no pattern recognises becomes
/// [`Event::Unknown`]. Patterns are tried in a fixed order and the first
/// match wins.
pub trait EventParser: Send + Sync {
    /// Key this parser is registered under, e.g. `the_isle_evrima`.
    fn name(&self) -> &'static str;

    /// Classify a line from a unified log that interleaves every event kind.
    fn parse_line(&self, line: &str) -> Event;

    /// Classify a line from a dedicated per-type log. Only patterns for events
    /// the stream kind covers are tried.
    fn parse_typed(&self, line: &str, kind: StreamKind) -> Event;
}
