//! Streaming decoder for the QKD measurement line protocol.
//!
//! This module turns lines of measurement program output into [`Event`]s:
//! - Line classification with a fixed priority order
//! - 40-value timestamp bursts after `SPD1_VALUES:` / `SPD2_VALUES:`
//! - Session boundaries with backfill of fields a session never reported
//! - Graceful recovery from malformed lines
//!
//! # Example
//!
//! ```rust
//! use qkd_telemetry::model::{Event, SourceMode};
//! use qkd_telemetry::parser::SessionParser;
//!
//! let mut parser = SessionParser::new(SourceMode::File);
//! let events = parser.parse_str("SESSION_NUMBER:0\nSPD1_QBER_VALUE_IS:1.25\n");
//!
//! assert_eq!(events, vec![
//!     Event::SessionNumber { session_id: 0 },
//!     Event::Qber { value: 1.25 },
//! ]);
//! ```
//!
//! The parser performs no I/O and never blocks. It is driven one line at a
//! time by a [`LineSource`](crate::source::LineSource) runner, or directly
//! through [`SessionParser::feed`] with any [`EventSink`].

mod block;
mod classify;
mod session;
mod sink;

pub use block::*;
pub use classify::*;
pub use session::*;
pub use sink::*;

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::model::{Detector, Event, EventKind, SourceMode};

/// Key payload: at least 128 binary digits and nothing else.
static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // Static pattern known to be valid
    Regex::new(r"^[01]{128,}$").unwrap()
});

/// Number of rejected lines kept in [`ParseStats::errors`].
pub const MAX_RECORDED_ERRORS: usize = 64;

/// What to do with a non-integer line inside an unfinished timestamp burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockPolicy {
    /// Drop the line and keep waiting for the rest of the burst.
    #[default]
    SkipInvalid,
    /// Close the burst and classify the line as keyed payload.
    AbortOnInvalid,
}

impl fmt::Display for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipInvalid => write!(f, "skip-invalid"),
            Self::AbortOnInvalid => write!(f, "abort-on-invalid"),
        }
    }
}

/// Why a line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// `SESSION_NUMBER:` payload is not an integer.
    #[error("invalid session number {0:?}")]
    InvalidSessionId(String),
    /// Burst line is not an integer.
    #[error("invalid {detector} timestamp {value:?}")]
    InvalidTimestamp {
        /// Detector whose burst was open.
        detector: Detector,
        /// Offending line.
        value: String,
    },
    /// Keyed payload is not a float.
    #[error("invalid {kind} value {value:?}")]
    InvalidNumber {
        /// Kind the label maps to.
        kind: EventKind,
        /// Offending payload.
        value: String,
    },
    /// `KEY_BITS:` payload is not at least 128 binary digits.
    #[error("invalid key format ({length} characters)")]
    InvalidKey {
        /// Length of the rejected payload.
        length: usize,
    },
}

/// How one line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank after trimming.
    Empty,
    /// Produced this many events.
    Emitted(usize),
    /// Marker that changed state (or nothing) without producing events.
    Consumed,
    /// Unrecognized line.
    Ignored,
    /// Malformed payload, line dropped.
    Rejected(LineError),
}

/// A rejected line with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number within the stream.
    pub line: u64,
    /// Why it was rejected.
    pub error: LineError,
    /// Original line content (truncated).
    pub content_preview: String,
}

/// Statistics about parsing operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Total lines fed to the parser.
    pub lines_processed: u64,
    /// Blank lines.
    pub empty_lines: u64,
    /// Lines that produced at least one event.
    pub lines_emitting: u64,
    /// Marker lines that produced no event.
    pub lines_consumed: u64,
    /// Unrecognized lines.
    pub lines_ignored: u64,
    /// Malformed lines.
    pub lines_rejected: u64,
    /// Events delivered, including backfill and session markers.
    pub events_emitted: u64,
    /// Events synthesized or replayed at session end.
    pub backfilled_events: u64,
    /// Session transitions.
    pub sessions_started: u64,
    /// Bursts that reached their full 40 values.
    pub blocks_completed: u64,
    /// Most recent rejected lines.
    pub errors: VecDeque<RejectedLine>,
}

impl ParseStats {
    /// Percentage of non-blank lines that were not rejected.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let meaningful = self.lines_processed - self.empty_lines;
        if meaningful == 0 {
            return 100.0;
        }
        ((meaningful - self.lines_rejected) as f64 / meaningful as f64) * 100.0
    }

    fn record(&mut self, outcome: &LineOutcome, line: &str) {
        match outcome {
            LineOutcome::Empty => self.empty_lines += 1,
            LineOutcome::Emitted(count) => {
                self.lines_emitting += 1;
                self.events_emitted += *count as u64;
            }
            LineOutcome::Consumed => self.lines_consumed += 1,
            LineOutcome::Ignored => self.lines_ignored += 1,
            LineOutcome::Rejected(error) => {
                self.lines_rejected += 1;
                if self.errors.len() == MAX_RECORDED_ERRORS {
                    self.errors.pop_front();
                }
                self.errors.push_back(RejectedLine {
                    line: self.lines_processed,
                    error: error.clone(),
                    content_preview: truncate_preview(line, 100),
                });
            }
        }
    }
}

/// Stateful decoder for one telemetry stream.
///
/// Owns all per-stream state; give every stream its own instance.
#[derive(Debug)]
pub struct SessionParser {
    mode: SourceMode,
    block_policy: BlockPolicy,
    default_input: String,
    blocks: BlockAccumulator,
    sessions: SessionTracker,
    stats: ParseStats,
}

impl SessionParser {
    /// Create a parser for the given source mode.
    #[must_use]
    pub fn new(mode: SourceMode) -> Self {
        Self {
            mode,
            block_policy: BlockPolicy::default(),
            default_input: DEFAULT_INPUT_STRING.to_string(),
            blocks: BlockAccumulator::new(),
            sessions: SessionTracker::new(),
            stats: ParseStats::default(),
        }
    }

    /// Set the policy for non-integer lines inside a burst.
    #[must_use]
    pub fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }

    /// Set the token synthesized for a missing console input string.
    #[must_use]
    pub fn with_default_input(mut self, default_input: impl Into<String>) -> Self {
        self.default_input = default_input.into();
        self
    }

    /// Source mode.
    #[must_use]
    pub const fn mode(&self) -> SourceMode {
        self.mode
    }

    /// Burst policy.
    #[must_use]
    pub const fn block_policy(&self) -> BlockPolicy {
        self.block_policy
    }

    /// Id of the open session.
    #[must_use]
    pub const fn current_session(&self) -> Option<i64> {
        self.sessions.current()
    }

    /// Burst currently collecting values.
    #[must_use]
    pub const fn block_mode(&self) -> BlockMode {
        self.blocks.mode()
    }

    /// Values accepted since the detector's last marker.
    #[must_use]
    pub const fn block_count(&self, detector: Detector) -> usize {
        self.blocks.count(detector)
    }

    /// Kinds observed in the open session.
    #[must_use]
    pub const fn seen_types(&self) -> &BTreeSet<EventKind> {
        self.sessions.seen()
    }

    /// Values retained for backfill.
    #[must_use]
    pub const fn last_values(&self) -> &LastValues {
        self.sessions.last_values()
    }

    /// Get parse statistics.
    #[must_use]
    pub const fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Feed one line, delivering resulting events to `sink`.
    pub fn feed<S: EventSink + ?Sized>(&mut self, line: &str, sink: &mut S) -> LineOutcome {
        self.stats.lines_processed += 1;
        let line = line.trim();

        let outcome = if line.is_empty() {
            LineOutcome::Empty
        } else {
            match classify(line, self.blocks.open_detector(), self.mode) {
                LineKind::Session(payload) => self.handle_session(payload, sink),
                LineKind::BlockMarker(detector) => {
                    self.blocks.open(detector);
                    debug!(%detector, session = ?self.current_session(), "Collecting timestamps");
                    LineOutcome::Consumed
                }
                LineKind::Ignored => LineOutcome::Consumed,
                LineKind::BlockPayload(detector, value) => {
                    self.handle_timestamp(detector, value, sink)
                }
                LineKind::Labeled(label, payload) => self.handle_labeled(label, payload, sink),
                LineKind::Unrecognized => {
                    trace!(line, "Ignoring unrecognized line");
                    LineOutcome::Ignored
                }
            }
        };

        self.stats.record(&outcome, line);
        outcome
    }

    /// Feed one line and collect the resulting events.
    pub fn parse_line(&mut self, line: &str) -> Vec<Event> {
        let mut events = Vec::new();
        self.feed(line, &mut events);
        events
    }

    /// Feed every line of `content` and collect the resulting events.
    pub fn parse_str(&mut self, content: &str) -> Vec<Event> {
        let mut events = Vec::new();
        for line in content.lines() {
            self.feed(line, &mut events);
        }
        events
    }

    fn handle_session<S: EventSink + ?Sized>(&mut self, payload: &str, sink: &mut S) -> LineOutcome {
        let session_id = match payload.trim().parse::<i64>() {
            Ok(id) => id,
            Err(e) => {
                warn!(payload, error = %e, "Invalid session number, skipping line");
                return LineOutcome::Rejected(LineError::InvalidSessionId(payload.to_string()));
            }
        };

        let Some(transition) =
            self.sessions
                .transition(session_id, self.mode, &self.default_input)
        else {
            trace!(session_id, "Repeated session marker");
            return LineOutcome::Consumed;
        };

        self.blocks.reset();
        self.stats.sessions_started += 1;
        self.stats.backfilled_events += transition.backfilled as u64;
        debug!(
            session_id,
            closed = ?transition.closed,
            backfilled = transition.backfilled,
            "Session started"
        );

        let count = transition.events.len();
        for event in transition.events {
            sink.deliver(event);
        }
        LineOutcome::Emitted(count)
    }

    fn handle_timestamp<S: EventSink + ?Sized>(
        &mut self,
        detector: Detector,
        value: &str,
        sink: &mut S,
    ) -> LineOutcome {
        let value_ps = match value.parse::<i64>() {
            Ok(v) => v,
            Err(_) => return self.handle_block_interruption(detector, value, sink),
        };

        let Some(push) = self.blocks.push(value_ps) else {
            return LineOutcome::Consumed;
        };

        if push.completed {
            self.stats.blocks_completed += 1;
            info!(
                %detector,
                session = ?self.current_session(),
                "Completed queuing {BLOCK_CAPACITY} timestamps"
            );
        }
        self.emit(push.event, sink);
        LineOutcome::Emitted(1)
    }

    fn handle_block_interruption<S: EventSink + ?Sized>(
        &mut self,
        detector: Detector,
        line: &str,
        sink: &mut S,
    ) -> LineOutcome {
        match self.block_policy {
            BlockPolicy::SkipInvalid => {
                debug!(%detector, line, "Dropping non-integer line inside timestamp block");
                LineOutcome::Rejected(LineError::InvalidTimestamp {
                    detector,
                    value: line.to_string(),
                })
            }
            BlockPolicy::AbortOnInvalid => {
                info!(
                    %detector,
                    accepted = self.blocks.count(detector),
                    "Timestamp block interrupted, closing it"
                );
                self.blocks.abort();
                match classify_keyed(line, self.mode) {
                    LineKind::Labeled(label, payload) => self.handle_labeled(label, payload, sink),
                    _ => LineOutcome::Ignored,
                }
            }
        }
    }

    fn handle_labeled<S: EventSink + ?Sized>(
        &mut self,
        label: Label,
        payload: &str,
        sink: &mut S,
    ) -> LineOutcome {
        let event = match label {
            Label::KeyBits => {
                if !KEY_PATTERN.is_match(payload) {
                    error!(
                        length = payload.len(),
                        preview = %truncate_preview(payload, 40),
                        "Invalid key format"
                    );
                    return LineOutcome::Rejected(LineError::InvalidKey {
                        length: payload.len(),
                    });
                }
                Event::key(payload)
            }
            Label::InputString => Event::InputString {
                value: payload.to_string(),
            },
            Label::DecoyStateRandomness
            | Label::VisibilityRatio
            | Label::QberValue
            | Label::KeyRate => {
                let value = match payload.trim().parse::<f64>() {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(label = label.prefix(), payload, error = %e, "Invalid numeric value, skipping line");
                        return LineOutcome::Rejected(LineError::InvalidNumber {
                            kind: label.kind(),
                            value: payload.to_string(),
                        });
                    }
                };
                scalar_event(label, value)
            }
        };

        debug!(event = %event, session = ?self.current_session(), "Queued event");
        self.emit(event, sink);
        LineOutcome::Emitted(1)
    }

    fn emit<S: EventSink + ?Sized>(&mut self, event: Event, sink: &mut S) {
        self.sessions.record(&event);
        sink.deliver(event);
    }
}

fn scalar_event(label: Label, value: f64) -> Event {
    match label {
        Label::DecoyStateRandomness => Event::Spd1DecayState { value },
        Label::VisibilityRatio => Event::Visibility { value },
        Label::KeyRate => Event::KbpsData { value },
        _ => Event::Qber { value },
    }
}

/// Truncate a string for preview display.
///
/// Uses character-aware truncation to avoid panicking on multi-byte UTF-8 characters.
fn truncate_preview(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
