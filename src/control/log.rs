use serde::Serialize;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use super::command::{Command, CommandSource};
use crate::engine::EngineEvent;
use crate::tone::ValidationWarning;

/// Something a front end may want to hear about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    Command {
        source: CommandSource,
        command: Command,
    },
    Engine {
        event: EngineEvent,
    },
    ToneRequested {
        request_id: u64,
        description: String,
    },
    ToneApplied {
        request_id: u64,
        units: usize,
        warnings: Vec<ValidationWarning>,
    },
    ToneFailed {
        request_id: u64,
        error: String,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub entry: LogEntry,
}

/// Ring buffer of recent events, polled by front ends with `events_since`
pub struct EventLog {
    events: VecDeque<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            max_events: max_events.max(1),
        }
    }

    /// Append an entry and return its id
    pub fn push(&mut self, entry: LogEntry) -> u64 {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let id = self.next_id;
        self.next_id += 1;
        self.events.push_back(Event { id, timestamp, entry });

        // Trim old events
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
        id
    }

    /// All retained events with an id greater than `since_id`
    pub fn events_since(&self, since_id: u64) -> Vec<Event> {
        self.events.iter().filter(|e| e.id > since_id).cloned().collect()
    }

    pub fn latest_id(&self) -> u64 {
        self.events.back().map(|e| e.id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(500)
    }
}
