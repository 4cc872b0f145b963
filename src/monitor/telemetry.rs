// SPDX-License-Identifier: Apache-2.0

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{KeyValue, global};

pub fn get_meter() -> Meter {
    global::meter("gamelog_monitor")
}

/// Counters for one connection's monitor. No-ops unless a meter provider is installed.
#[derive(Clone)]
pub struct MonitorCounters {
    events_delivered: Counter<u64>,
    duplicate_events: Counter<u64>,
    bytes_read: Counter<u64>,
    read_errors: Counter<u64>,
    tags: [KeyValue; 1],
}

impl MonitorCounters {
    pub fn new(connection_id: &str) -> Self {
        let meter = get_meter();
        Self {
            events_delivered: meter
                .u64_counter("gamelog_monitor_events_delivered")
                .with_description("Number of parsed events handed to subscribers.")
                .with_unit("events")
                .build(),
            duplicate_events: meter
                .u64_counter("gamelog_monitor_duplicate_events")
                .with_description("Number of parsed events suppressed as already delivered.")
                .with_unit("events")
                .build(),
            bytes_read: meter
                .u64_counter("gamelog_monitor_bytes_read")
                .with_description("Number of log bytes consumed from remote files.")
                .with_unit("bytes")
                .build(),
            read_errors: meter
                .u64_counter("gamelog_monitor_read_errors")
                .with_description("Number of failed reads of a watched file.")
                .with_unit("errors")
                .build(),
            tags: [KeyValue::new("connection_id", connection_id.to_string())],
        }
    }

    pub fn event_delivered(&self) {
        self.events_delivered.add(1, &self.tags);
    }

    pub fn duplicate_dropped(&self) {
        self.duplicate_events.add(1, &self.tags);
    }

    pub fn bytes_read(&self, n: u64) {
        if n > 0 {
            self.bytes_read.add(n, &self.tags);
        }
    }

    pub fn read_error(&self) {
        self.read_errors.add(1, &self.tags);
    }
}
