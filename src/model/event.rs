//! Telemetry events emitted by the session parser.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of bits in the all-zero key synthesized for a session that never
/// reported one.
pub const DEFAULT_KEY_BITS: usize = 128;

/// One of the two single-photon detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    /// Detector 1 (`SPD1_VALUES:` bursts).
    Spd1,
    /// Detector 2 (`SPD2_VALUES:` bursts).
    Spd2,
}

impl Detector {
    /// Event kind emitted for this detector's timestamps.
    #[must_use]
    pub const fn timestamp_kind(self) -> EventKind {
        match self {
            Self::Spd1 => EventKind::TimestampSpd1,
            Self::Spd2 => EventKind::TimestampSpd2,
        }
    }

    /// Build a timestamp event for this detector.
    #[must_use]
    pub const fn timestamp(self, value_ps: i64) -> Event {
        match self {
            Self::Spd1 => Event::TimestampSpd1 { value_ps },
            Self::Spd2 => Event::TimestampSpd2 { value_ps },
        }
    }

    /// Marker line that opens a burst for this detector.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Spd1 => "SPD1_VALUES:",
            Self::Spd2 => "SPD2_VALUES:",
        }
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spd1 => write!(f, "SPD1"),
            Self::Spd2 => write!(f, "SPD2"),
        }
    }
}

/// Discriminant of an [`Event`].
///
/// The declaration order is the order in which missing fields are
/// backfilled at the end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session boundary.
    SessionNumber,
    /// SPD1 arrival timestamp.
    TimestampSpd1,
    /// SPD2 arrival timestamp.
    TimestampSpd2,
    /// Decoy-state randomness at SPD1.
    #[serde(rename = "spd1_decaystate")]
    Spd1DecayState,
    /// Interference visibility ratio.
    Visibility,
    /// Quantum bit error rate.
    Qber,
    /// Raw key bits.
    Key,
    /// Key rate.
    KbpsData,
    /// Echoed console input.
    InputString,
}

impl EventKind {
    /// Every kind, in backfill order.
    pub const ALL: [Self; 9] = [
        Self::SessionNumber,
        Self::TimestampSpd1,
        Self::TimestampSpd2,
        Self::Spd1DecayState,
        Self::Visibility,
        Self::Qber,
        Self::Key,
        Self::KbpsData,
        Self::InputString,
    ];

    /// Wire name of this kind, as used in JSON output and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionNumber => "session_number",
            Self::TimestampSpd1 => "timestamp_spd1",
            Self::TimestampSpd2 => "timestamp_spd2",
            Self::Spd1DecayState => "spd1_decaystate",
            Self::Visibility => "visibility",
            Self::Qber => "qber",
            Self::Key => "key",
            Self::KbpsData => "kbps_data",
            Self::InputString => "input_string",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new measurement session started.
    SessionNumber {
        /// Session identifier.
        session_id: i64,
    },
    /// One SPD1 detector pulse.
    TimestampSpd1 {
        /// Arrival time in picoseconds.
        value_ps: i64,
    },
    /// One SPD2 detector pulse.
    TimestampSpd2 {
        /// Arrival time in picoseconds.
        value_ps: i64,
    },
    /// Quantum bit error rate, as reported (not normalized).
    Qber {
        /// Reported rate.
        value: f64,
    },
    /// Interference visibility ratio.
    Visibility {
        /// Reported ratio.
        value: f64,
    },
    /// Decoy-state randomness metric at SPD1.
    #[serde(rename = "spd1_decaystate")]
    Spd1DecayState {
        /// Reported metric.
        value: f64,
    },
    /// Key generation throughput.
    KbpsData {
        /// Key rate per second.
        value: f64,
    },
    /// Raw key bits after privacy amplification.
    Key {
        /// String of `'0'`/`'1'` characters.
        bits: String,
        /// Number of bits, always at least 128.
        length: usize,
    },
    /// Input token echoed by the measurement program (console mode).
    InputString {
        /// Echoed token.
        value: String,
    },
}

impl Event {
    /// Build a key event, deriving its length from the bit string.
    #[must_use]
    pub fn key(bits: impl Into<String>) -> Self {
        let bits = bits.into();
        let length = bits.len();
        Self::Key { bits, length }
    }

    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::SessionNumber { .. } => EventKind::SessionNumber,
            Self::TimestampSpd1 { .. } => EventKind::TimestampSpd1,
            Self::TimestampSpd2 { .. } => EventKind::TimestampSpd2,
            Self::Qber { .. } => EventKind::Qber,
            Self::Visibility { .. } => EventKind::Visibility,
            Self::Spd1DecayState { .. } => EventKind::Spd1DecayState,
            Self::KbpsData { .. } => EventKind::KbpsData,
            Self::Key { .. } => EventKind::Key,
            Self::InputString { .. } => EventKind::InputString,
        }
    }

    /// Scalar value carried by the event, if it has one.
    #[must_use]
    pub const fn scalar(&self) -> Option<f64> {
        match self {
            Self::Qber { value }
            | Self::Visibility { value }
            | Self::Spd1DecayState { value }
            | Self::KbpsData { value } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNumber { session_id } => write!(f, "session {session_id}"),
            Self::TimestampSpd1 { value_ps } | Self::TimestampSpd2 { value_ps } => {
                write!(f, "{} {value_ps} ps", self.kind())
            }
            Self::Qber { value }
            | Self::Visibility { value }
            | Self::Spd1DecayState { value }
            | Self::KbpsData { value } => write!(f, "{} {value}", self.kind()),
            Self::Key { bits, length } => {
                let preview: String = bits.chars().take(40).collect();
                if *length > 40 {
                    write!(f, "key [{length} bits] {preview}...")
                } else {
                    write!(f, "key [{length} bits] {preview}")
                }
            }
            Self::InputString { value } => write!(f, "input_string {value}"),
        }
    }
}
