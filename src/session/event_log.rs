use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub event: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {}", self.timestamp.format("%H:%M:%S"), self.event)
    }
}

/// Chronological event log with a retention cap.
///
/// Entries are only ever appended. Once `capacity` is reached the oldest entry
/// is evicted for every new one, so the remaining entries keep their order.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    evicted: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            event: event.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries dropped by the retention cap so far.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// One rendered line per entry, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut log = EventLog::default();
        log.push("first");
        log.push("second");
        log.push("third");

        let events: Vec<_> = log.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, ["first", "second", "third"]);
        assert_eq!(log.evicted(), 0);
    }

    #[test]
    fn evicts_oldest_entries_at_capacity() {
        let mut log = EventLog::with_capacity(3);
        for i in 0..5 {
            log.push(format!("event {i}"));
        }

        let events: Vec<_> = log.iter().map(|e| e.event.clone()).collect();
        assert_eq!(events, ["event 2", "event 3", "event 4"]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_the_latest_entry() {
        let mut log = EventLog::with_capacity(0);
        log.push("a");
        log.push("b");
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.last().map(|e| e.event.as_str()), Some("b"));
    }

    #[test]
    fn renders_time_prefixed_lines() {
        let mut log = EventLog::default();
        log.push("Connected to MQTT broker");

        let line = &log.lines()[0];
        // "HH:MM:SS - event"
        assert_eq!(&line[2..3], ":");
        assert!(line.ends_with(" - Connected to MQTT broker"));
    }
}
