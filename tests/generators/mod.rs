//! Synthetic measurement-program output for tests.
//!
//! Builds protocol text the way the measurement program prints it, so tests
//! can describe a session by what it reports rather than by raw lines.

#![allow(dead_code)]

use std::fmt::Write;

/// What one generated session reports.
#[derive(Debug, Clone)]
pub struct SessionScript {
    /// Session id.
    pub id: i64,
    /// Number of SPD1 timestamps (0 omits the block).
    pub spd1: usize,
    /// Number of SPD2 timestamps (0 omits the block).
    pub spd2: usize,
    /// Decoy-state randomness.
    pub decay_state: Option<f64>,
    /// Visibility ratio.
    pub visibility: Option<f64>,
    /// QBER.
    pub qber: Option<f64>,
    /// Key bits.
    pub key: Option<String>,
    /// Key rate.
    pub kbps: Option<f64>,
    /// Echoed input string.
    pub input_string: Option<String>,
}

impl SessionScript {
    /// A session that reports everything its parity requires.
    pub fn complete(id: i64) -> Self {
        let even = id.rem_euclid(2) == 0;
        Self {
            id,
            spd1: 40,
            spd2: 40,
            decay_state: Some(0.5),
            visibility: Some(0.9),
            qber: Some(2.5),
            key: even.then(|| key_bits(128, id)),
            kbps: (!even).then_some(10.0 + id as f64),
            input_string: None,
        }
    }

    /// A session that only reports its marker.
    pub fn empty(id: i64) -> Self {
        Self {
            id,
            spd1: 0,
            spd2: 0,
            decay_state: None,
            visibility: None,
            qber: None,
            key: None,
            kbps: None,
            input_string: None,
        }
    }

    /// Add an echoed input string.
    pub fn with_input(mut self, input: &str) -> Self {
        self.input_string = Some(input.to_string());
        self
    }

    /// Render the session as protocol lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SESSION_NUMBER:{}", self.id);
        if let Some(input) = &self.input_string {
            let _ = writeln!(out, "INPUT_STRING:{input}");
        }
        if self.spd1 > 0 {
            out.push_str("SPD1_VALUES:\n");
            for i in 0..self.spd1 {
                let _ = writeln!(out, "{}", timestamp(self.id, i, 1));
            }
        }
        if self.spd2 > 0 {
            out.push_str("SPD2_VALUES:\n");
            for i in 0..self.spd2 {
                let _ = writeln!(out, "{}", timestamp(self.id, i, 2));
            }
        }
        out.push_str("NUMBER_OF_RX_KEY_BITS_AFTER_PRIVACY_AMPLIFICATION_IS:128\n");
        if let Some(v) = self.decay_state {
            let _ = writeln!(out, "DECOY_STATE_RANDOMNESS_AT_SPD1:{v}");
        }
        if let Some(v) = self.visibility {
            let _ = writeln!(out, "VISIBILITY_RATIO_IS:{v}");
        }
        if let Some(v) = self.qber {
            let _ = writeln!(out, "SPD1_QBER_VALUE_IS:{v}");
        }
        if let Some(key) = &self.key {
            let _ = writeln!(out, "KEY_BITS:{key}");
        }
        if let Some(v) = self.kbps {
            let _ = writeln!(out, "KEY_RATE_PER_SECOND_IS:{v}");
        }
        out
    }
}

/// Deterministic picosecond timestamp.
pub fn timestamp(session: i64, index: usize, detector: i64) -> i64 {
    session * 1_000_000 + detector * 10_000 + index as i64 * 125
}

/// Deterministic key of `len` bits.
pub fn key_bits(len: usize, seed: i64) -> String {
    (0..len)
        .map(|i| if (i as i64 + seed) % 3 == 0 { '1' } else { '0' })
        .collect()
}

/// Several complete sessions back to back.
pub fn measurement_log(sessions: i64) -> String {
    (0..sessions)
        .map(|id| SessionScript::complete(id).render())
        .collect()
}
