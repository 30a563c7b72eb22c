//! Data model for QKD telemetry.
//!
//! This module provides the closed set of event variants the parser emits,
//! the source modes that change which fields a session must report, and the
//! timestamped record envelope used for JSON output.

pub mod event;

pub use event::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the measurement program's output reaches the parser.
///
/// The mode is the only piece of transport information the parser sees:
/// console sessions additionally echo an `INPUT_STRING:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Append-only log file written by the measurement program.
    #[default]
    File,
    /// Standard output of a spawned measurement program.
    Console,
}

impl SourceMode {
    /// Check if this is console mode.
    #[must_use]
    pub const fn is_console(self) -> bool {
        matches!(self, Self::Console)
    }
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Console => write!(f, "console"),
        }
    }
}

/// An event stamped with its arrival time, for line-delimited JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// When the event left the parser.
    pub received_at: DateTime<Utc>,
    /// The event itself, flattened into the record.
    #[serde(flatten)]
    pub event: Event,
}

impl EventRecord {
    /// Stamp an event with the current time.
    #[must_use]
    pub fn now(event: Event) -> Self {
        Self {
            received_at: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_mode_default() {
        assert_eq!(SourceMode::default(), SourceMode::File);
        assert!(SourceMode::Console.is_console());
        assert_eq!(SourceMode::Console.to_string(), "console");
    }

    #[test]
    fn test_record_flattens_event() {
        let record = EventRecord::now(Event::KbpsData { value: 3.5 });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "kbps_data");
        assert_eq!(value["value"], 3.5);
        assert!(value["received_at"].is_string());

        let back: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.event, record.event);
    }
}
