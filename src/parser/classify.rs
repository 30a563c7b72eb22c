//! Line classification for the measurement protocol.
//!
//! Classification is purely lexical: it decides which handler a line belongs
//! to without parsing any payload. Payload validation happens in the
//! handlers so a malformed value can be reported against its category.

use crate::model::{Detector, EventKind, SourceMode};

/// Prefix of the session boundary marker.
pub const SESSION_PREFIX: &str = "SESSION_NUMBER:";

/// Prefix of marker lines that are consumed without effect.
///
/// Covers `NUMBER_OF_RX_KEY_BITS_AFTER_PRIVACY_AMPLIFICATION_IS:` and any
/// other suffix the measurement program may add.
pub const IGNORED_PREFIX: &str = "NUMBER_OF_RX_KEY_BITS";

/// A recognized `LABEL:value` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// `DECOY_STATE_RANDOMNESS_AT_SPD1:` followed by a float.
    DecoyStateRandomness,
    /// `VISIBILITY_RATIO_IS:` followed by a float.
    VisibilityRatio,
    /// `SPD1_QBER_VALUE_IS:` followed by a float.
    QberValue,
    /// `KEY_BITS:` followed by at least 128 binary digits.
    KeyBits,
    /// `KEY_RATE_PER_SECOND_IS:` followed by a float.
    KeyRate,
    /// `INPUT_STRING:` followed by free text (console mode only).
    InputString,
}

impl Label {
    /// Every label, in matching order.
    pub const ALL: [Self; 6] = [
        Self::DecoyStateRandomness,
        Self::VisibilityRatio,
        Self::QberValue,
        Self::KeyBits,
        Self::KeyRate,
        Self::InputString,
    ];

    /// Literal prefix, including the trailing colon.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::DecoyStateRandomness => "DECOY_STATE_RANDOMNESS_AT_SPD1:",
            Self::VisibilityRatio => "VISIBILITY_RATIO_IS:",
            Self::QberValue => "SPD1_QBER_VALUE_IS:",
            Self::KeyBits => "KEY_BITS:",
            Self::KeyRate => "KEY_RATE_PER_SECOND_IS:",
            Self::InputString => "INPUT_STRING:",
        }
    }

    /// Kind of event produced by a valid payload.
    #[must_use]
    pub const fn kind(self) -> EventKind {
        match self {
            Self::DecoyStateRandomness => EventKind::Spd1DecayState,
            Self::VisibilityRatio => EventKind::Visibility,
            Self::QberValue => EventKind::Qber,
            Self::KeyBits => EventKind::Key,
            Self::KeyRate => EventKind::KbpsData,
            Self::InputString => EventKind::InputString,
        }
    }

    /// Whether the label is only recognized in the given mode.
    #[must_use]
    pub const fn recognized_in(self, mode: SourceMode) -> bool {
        match self {
            Self::InputString => mode.is_console(),
            _ => true,
        }
    }
}

/// Category of a trimmed, non-empty line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// `SESSION_NUMBER:<payload>`.
    Session(&'a str),
    /// `SPD1_VALUES:` or `SPD2_VALUES:` with no payload.
    BlockMarker(Detector),
    /// Marker consumed without effect.
    Ignored,
    /// Expected timestamp inside an open block.
    BlockPayload(Detector, &'a str),
    /// `LABEL:<payload>`.
    Labeled(Label, &'a str),
    /// Anything else.
    Unrecognized,
}

/// Classify a line.
///
/// `open_block` is the detector whose burst is still collecting values, if
/// any. While a block is open every line that is not a session, block or
/// ignored marker is treated as block payload.
#[must_use]
pub fn classify(line: &str, open_block: Option<Detector>, mode: SourceMode) -> LineKind<'_> {
    if let Some(payload) = line.strip_prefix(SESSION_PREFIX) {
        return LineKind::Session(payload);
    }

    if line == Detector::Spd1.marker() {
        return LineKind::BlockMarker(Detector::Spd1);
    }
    if line == Detector::Spd2.marker() {
        return LineKind::BlockMarker(Detector::Spd2);
    }

    if line.starts_with(IGNORED_PREFIX) {
        return LineKind::Ignored;
    }

    if let Some(detector) = open_block {
        return LineKind::BlockPayload(detector, line);
    }

    classify_keyed(line, mode)
}

/// Classify a line against the keyed-payload table only.
#[must_use]
pub fn classify_keyed(line: &str, mode: SourceMode) -> LineKind<'_> {
    Label::ALL
        .iter()
        .filter(|label| label.recognized_in(mode))
        .find_map(|label| {
            line.strip_prefix(label.prefix())
                .map(|payload| LineKind::Labeled(*label, payload))
        })
        .unwrap_or(LineKind::Unrecognized)
}
