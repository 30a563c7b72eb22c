//! Accumulation of detector timestamp bursts.

use crate::model::{Detector, Event};

/// Maximum number of timestamps accepted after one block marker.
pub const BLOCK_CAPACITY: usize = 40;

/// Which burst, if any, is collecting values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockMode {
    /// No burst open.
    #[default]
    Idle,
    /// Collecting SPD1 timestamps.
    CollectingSpd1,
    /// Collecting SPD2 timestamps.
    CollectingSpd2,
}

impl BlockMode {
    /// Detector of the open burst.
    #[must_use]
    pub const fn detector(self) -> Option<Detector> {
        match self {
            Self::Idle => None,
            Self::CollectingSpd1 => Some(Detector::Spd1),
            Self::CollectingSpd2 => Some(Detector::Spd2),
        }
    }

    const fn collecting(detector: Detector) -> Self {
        match detector {
            Detector::Spd1 => Self::CollectingSpd1,
            Detector::Spd2 => Self::CollectingSpd2,
        }
    }
}

/// Result of accepting one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPush {
    /// Event to emit.
    pub event: Event,
    /// Whether this value filled the block.
    pub completed: bool,
}

/// Block state: the open mode plus a counter per detector.
#[derive(Debug, Clone, Default)]
pub struct BlockAccumulator {
    mode: BlockMode,
    spd1_count: usize,
    spd2_count: usize,
}

impl BlockAccumulator {
    /// Create an idle accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> BlockMode {
        self.mode
    }

    /// Detector still accepting values.
    #[must_use]
    pub fn open_detector(&self) -> Option<Detector> {
        self.mode
            .detector()
            .filter(|detector| self.count(*detector) < BLOCK_CAPACITY)
    }

    /// Values accepted since the detector's last marker.
    #[must_use]
    pub const fn count(&self, detector: Detector) -> usize {
        match detector {
            Detector::Spd1 => self.spd1_count,
            Detector::Spd2 => self.spd2_count,
        }
    }

    /// Open a burst for `detector`, closing the other one.
    pub fn open(&mut self, detector: Detector) {
        self.mode = BlockMode::collecting(detector);
        *self.counter_mut(detector) = 0;
    }

    /// Accept a timestamp into the open burst.
    ///
    /// Returns `None` when no burst is accepting values.
    pub fn push(&mut self, value_ps: i64) -> Option<BlockPush> {
        let detector = self.open_detector()?;
        let counter = self.counter_mut(detector);
        *counter += 1;
        let completed = *counter == BLOCK_CAPACITY;
        if completed {
            self.mode = BlockMode::Idle;
        }
        Some(BlockPush {
            event: detector.timestamp(value_ps),
            completed,
        })
    }

    /// Close the open burst early, keeping the counters.
    pub fn abort(&mut self) {
        self.mode = BlockMode::Idle;
    }

    /// Return to the idle state with both counters at zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn counter_mut(&mut self, detector: Detector) -> &mut usize {
        match detector {
            Detector::Spd1 => &mut self.spd1_count,
            Detector::Spd2 => &mut self.spd2_count,
        }
    }
}
