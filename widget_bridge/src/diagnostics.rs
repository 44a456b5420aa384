//! Traffic log kept per session for the host's event list.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const DEFAULT_EVENT_LOG_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Note,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub direction: Direction,
    pub kind: String,
    pub detail: String,
}

pub trait DiagnosticsSink {
    fn record(&mut self, entry: LogEntry);
}

/// Bounded ring of the most recent entries.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAP)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn kinds(&self, direction: Direction) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.direction == direction)
            .map(|entry| entry.kind.as_str())
            .collect()
    }
}

impl DiagnosticsSink for EventLog {
    fn record(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }
}

/// Lets the host keep reading a log the session writes into.
#[derive(Debug, Clone, Default)]
pub struct SharedEventLog(Arc<Mutex<EventLog>>);

impl SharedEventLog {
    pub fn new(log: EventLog) -> Self {
        Self(Arc::new(Mutex::new(log)))
    }

    pub fn snapshot(&self) -> EventLog {
        match self.0.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DiagnosticsSink for SharedEventLog {
    fn record(&mut self, entry: LogEntry) {
        match self.0.lock() {
            Ok(mut log) => log.record(entry),
            Err(poisoned) => poisoned.into_inner().record(entry),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&mut self, _entry: LogEntry) {}
}

pub(crate) fn entry(direction: Direction, kind: &str, detail: impl Into<String>) -> LogEntry {
    LogEntry {
        at: Utc::now(),
        direction,
        kind: kind.to_string(),
        detail: detail.into(),
    }
}
