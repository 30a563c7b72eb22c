//! Session lifecycle and end-of-session backfill.
//!
//! A session is closed when a `SESSION_NUMBER:` line carries a different id.
//! Before the new id is adopted, every field the closing session was expected
//! to report but did not is filled in: the very first session gets
//! synthesized defaults, later sessions get the last value retained from an
//! earlier session.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::model::{Event, EventKind, SourceMode, DEFAULT_KEY_BITS};

/// Default token replayed for a console session that never echoed its input.
pub const DEFAULT_INPUT_STRING: &str = "default_input";

/// Kinds a session must report.
///
/// Even sessions deliver a key, odd sessions a key rate. Console sessions
/// also echo their input string.
#[must_use]
pub fn expected_kinds(session_id: i64, mode: SourceMode) -> BTreeSet<EventKind> {
    let mut kinds = BTreeSet::from([
        EventKind::TimestampSpd1,
        EventKind::TimestampSpd2,
        EventKind::Spd1DecayState,
        EventKind::Visibility,
        EventKind::Qber,
    ]);

    if session_id.rem_euclid(2) == 0 {
        kinds.insert(EventKind::Key);
    } else {
        kinds.insert(EventKind::KbpsData);
    }

    if mode.is_console() {
        kinds.insert(EventKind::InputString);
    }

    kinds
}

/// Default event synthesized for a field the first session never reported.
///
/// Timestamp bursts have no default.
#[must_use]
pub fn default_event(kind: EventKind, default_input: &str) -> Option<Event> {
    match kind {
        EventKind::Spd1DecayState => Some(Event::Spd1DecayState { value: 0.0 }),
        EventKind::Visibility => Some(Event::Visibility { value: 0.0 }),
        EventKind::Qber => Some(Event::Qber { value: 0.0 }),
        EventKind::KbpsData => Some(Event::KbpsData { value: 0.0 }),
        EventKind::Key => Some(Event::key("0".repeat(DEFAULT_KEY_BITS))),
        EventKind::InputString => Some(Event::InputString {
            value: default_input.to_string(),
        }),
        EventKind::SessionNumber | EventKind::TimestampSpd1 | EventKind::TimestampSpd2 => None,
    }
}

/// Last value seen per kind, kept for backfilling later sessions.
///
/// Timestamp lists only hold the current session's values; scalars survive
/// session boundaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastValues {
    spd1: Vec<i64>,
    spd2: Vec<i64>,
    decay_state: Option<f64>,
    visibility: Option<f64>,
    qber: Option<f64>,
    kbps: Option<f64>,
    key: Option<String>,
    input_string: Option<String>,
}

impl LastValues {
    /// Remember the value carried by `event`.
    pub fn record(&mut self, event: &Event) {
        match event {
            Event::SessionNumber { .. } => {}
            Event::TimestampSpd1 { value_ps } => self.spd1.push(*value_ps),
            Event::TimestampSpd2 { value_ps } => self.spd2.push(*value_ps),
            Event::Spd1DecayState { value } => self.decay_state = Some(*value),
            Event::Visibility { value } => self.visibility = Some(*value),
            Event::Qber { value } => self.qber = Some(*value),
            Event::KbpsData { value } => self.kbps = Some(*value),
            Event::Key { bits, .. } => self.key = Some(bits.clone()),
            Event::InputString { value } => self.input_string = Some(value.clone()),
        }
    }

    /// Events that replay the retained value(s) of `kind`.
    #[must_use]
    pub fn replay(&self, kind: EventKind) -> Vec<Event> {
        match kind {
            EventKind::SessionNumber => Vec::new(),
            EventKind::TimestampSpd1 => self
                .spd1
                .iter()
                .map(|&value_ps| Event::TimestampSpd1 { value_ps })
                .collect(),
            EventKind::TimestampSpd2 => self
                .spd2
                .iter()
                .map(|&value_ps| Event::TimestampSpd2 { value_ps })
                .collect(),
            EventKind::Spd1DecayState => self
                .decay_state
                .map(|value| Event::Spd1DecayState { value })
                .into_iter()
                .collect(),
            EventKind::Visibility => self
                .visibility
                .map(|value| Event::Visibility { value })
                .into_iter()
                .collect(),
            EventKind::Qber => self
                .qber
                .map(|value| Event::Qber { value })
                .into_iter()
                .collect(),
            EventKind::KbpsData => self
                .kbps
                .map(|value| Event::KbpsData { value })
                .into_iter()
                .collect(),
            EventKind::Key => self.key.iter().map(Event::key).collect(),
            EventKind::InputString => self
                .input_string
                .iter()
                .map(|value| Event::InputString {
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// Retained timestamps for the current session.
    #[must_use]
    pub fn timestamps(&self, kind: EventKind) -> &[i64] {
        match kind {
            EventKind::TimestampSpd1 => &self.spd1,
            EventKind::TimestampSpd2 => &self.spd2,
            _ => &[],
        }
    }

    fn clear_timestamps(&mut self) {
        self.spd1.clear();
        self.spd2.clear();
    }
}

/// What happened when a session marker changed the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Session that was closed, if one was open.
    pub closed: Option<i64>,
    /// Expected kinds the closed session never reported.
    pub missing: BTreeSet<EventKind>,
    /// Backfill events followed by the new `SessionNumber` event.
    pub events: Vec<Event>,
    /// How many of `events` are backfill.
    pub backfilled: usize,
}

/// Per-session bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    current: Option<i64>,
    seen: BTreeSet<EventKind>,
    last: LastValues,
    closed_sessions: u64,
}

impl SessionTracker {
    /// Create a tracker with no open session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the open session.
    #[must_use]
    pub const fn current(&self) -> Option<i64> {
        self.current
    }

    /// Kinds observed since the open session started.
    #[must_use]
    pub const fn seen(&self) -> &BTreeSet<EventKind> {
        &self.seen
    }

    /// Values retained for backfill.
    #[must_use]
    pub const fn last_values(&self) -> &LastValues {
        &self.last
    }

    /// Number of sessions closed so far.
    #[must_use]
    pub const fn closed_sessions(&self) -> u64 {
        self.closed_sessions
    }

    /// Note an emitted event against the open session.
    pub fn record(&mut self, event: &Event) {
        let kind = event.kind();
        if kind == EventKind::SessionNumber {
            return;
        }
        self.seen.insert(kind);
        self.last.record(event);
    }

    /// Move to `new_id`, closing the open session.
    ///
    /// Returns `None` when `new_id` is already the open session.
    pub fn transition(
        &mut self,
        new_id: i64,
        mode: SourceMode,
        default_input: &str,
    ) -> Option<Transition> {
        if self.current == Some(new_id) {
            return None;
        }

        let closed = self.current;
        let mut missing = BTreeSet::new();
        let mut events = Vec::new();

        if let Some(closing) = closed {
            missing = expected_kinds(closing, mode)
                .difference(&self.seen)
                .copied()
                .collect();

            if !missing.is_empty() {
                let names: Vec<_> = missing.iter().map(|kind| kind.as_str()).collect();
                warn!(
                    session = closing,
                    missing = %names.join(", "),
                    "Session ended without reporting every expected field"
                );
                let first = self.closed_sessions == 0;
                for kind in &missing {
                    self.backfill(*kind, first, default_input, &mut events);
                }
            }

            self.closed_sessions += 1;
        }

        let backfilled = events.len();
        events.push(Event::SessionNumber { session_id: new_id });

        self.seen.clear();
        self.last.clear_timestamps();
        self.current = Some(new_id);

        Some(Transition {
            closed,
            missing,
            events,
            backfilled,
        })
    }

    fn backfill(&mut self, kind: EventKind, first: bool, default_input: &str, out: &mut Vec<Event>) {
        if first {
            if let Some(event) = default_event(kind, default_input) {
                debug!(kind = %kind, "Initialized missing field to its default");
                self.last.record(&event);
                out.push(event);
            }
            return;
        }

        let replayed = self.last.replay(kind);
        if replayed.is_empty() {
            debug!(kind = %kind, "No retained value to replay");
        } else {
            debug!(kind = %kind, count = replayed.len(), "Replayed retained value");
        }
        out.extend(replayed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expected_kinds_parity() {
        let even = expected_kinds(4, SourceMode::File);
        assert!(even.contains(&EventKind::Key));
        assert!(!even.contains(&EventKind::KbpsData));

        let odd = expected_kinds(-3, SourceMode::File);
        assert!(odd.contains(&EventKind::KbpsData));
        assert!(!odd.contains(&EventKind::Key));
        assert_eq!(odd.len(), 6);

        let console = expected_kinds(1, SourceMode::Console);
        assert!(console.contains(&EventKind::InputString));
    }

    #[test]
    fn test_first_marker_has_nothing_to_close() {
        let mut tracker = SessionTracker::new();
        let transition = tracker.transition(0, SourceMode::File, DEFAULT_INPUT_STRING).unwrap();

        assert_eq!(transition.closed, None);
        assert!(transition.missing.is_empty());
        assert_eq!(transition.events, vec![Event::SessionNumber { session_id: 0 }]);
        assert_eq!(tracker.closed_sessions(), 0);
    }

    #[test]
    fn test_same_id_is_not_a_transition() {
        let mut tracker = SessionTracker::new();
        tracker.transition(2, SourceMode::File, DEFAULT_INPUT_STRING);
        assert!(tracker.transition(2, SourceMode::File, DEFAULT_INPUT_STRING).is_none());
    }

    #[test]
    fn test_first_session_gets_defaults() {
        let mut tracker = SessionTracker::new();
        tracker.transition(1, SourceMode::File, DEFAULT_INPUT_STRING);
        tracker.record(&Event::Qber { value: 2.5 });

        let transition = tracker.transition(2, SourceMode::File, DEFAULT_INPUT_STRING).unwrap();
        assert_eq!(
            transition.events,
            vec![
                Event::Spd1DecayState { value: 0.0 },
                Event::Visibility { value: 0.0 },
                Event::KbpsData { value: 0.0 },
                Event::SessionNumber { session_id: 2 },
            ]
        );
        assert_eq!(transition.backfilled, 3);
    }

    #[test]
    fn test_later_session_replays_last_values() {
        let mut tracker = SessionTracker::new();
        tracker.transition(1, SourceMode::File, DEFAULT_INPUT_STRING);
        for event in [
            Event::TimestampSpd1 { value_ps: 1 },
            Event::TimestampSpd2 { value_ps: 2 },
            Event::Spd1DecayState { value: 0.1 },
            Event::Visibility { value: 0.9 },
            Event::Qber { value: 3.0 },
            Event::KbpsData { value: 7.0 },
        ] {
            tracker.record(&event);
        }
        let complete = tracker.transition(2, SourceMode::File, DEFAULT_INPUT_STRING).unwrap();
        assert_eq!(complete.backfilled, 0);

        tracker.record(&Event::TimestampSpd1 { value_ps: 10 });
        tracker.record(&Event::TimestampSpd2 { value_ps: 20 });
        tracker.record(&Event::Qber { value: 4.0 });

        let transition = tracker.transition(3, SourceMode::File, DEFAULT_INPUT_STRING).unwrap();
        assert_eq!(
            transition.events,
            vec![
                Event::Spd1DecayState { value: 0.1 },
                Event::Visibility { value: 0.9 },
                Event::SessionNumber { session_id: 3 },
            ]
        );
        // Key was never seen, so there is nothing to replay for it.
        assert!(transition.missing.contains(&EventKind::Key));
    }

    #[test]
    fn test_console_default_input() {
        let mut tracker = SessionTracker::new();
        tracker.transition(0, SourceMode::Console, "unset");
        let transition = tracker.transition(1, SourceMode::Console, "unset").unwrap();

        assert!(transition.events.contains(&Event::InputString {
            value: "unset".to_string()
        }));
        assert!(transition.events.contains(&Event::key("0".repeat(128))));
    }

    #[test]
    fn test_timestamps_cleared_on_transition() {
        let mut tracker = SessionTracker::new();
        tracker.transition(0, SourceMode::File, DEFAULT_INPUT_STRING);
        tracker.record(&Event::TimestampSpd1 { value_ps: 5 });
        tracker.record(&Event::Qber { value: 1.0 });
        assert_eq!(tracker.last_values().timestamps(EventKind::TimestampSpd1), &[5]);

        tracker.transition(1, SourceMode::File, DEFAULT_INPUT_STRING);
        assert!(tracker.last_values().timestamps(EventKind::TimestampSpd1).is_empty());
        assert!(tracker.seen().is_empty());
        assert_eq!(
            tracker.last_values().replay(EventKind::Qber),
            vec![Event::Qber { value: 1.0 }]
        );
    }
}
