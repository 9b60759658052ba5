//! Sliding hysteresis window over per-iteration detection results
//!
//! Raw per-frame detection flickers (occlusion, transient misses). The window turns
//! "a person was seen in one of the last N samples" into a smoothed signal.

use std::collections::VecDeque;

/// Window size used when none is configured
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct DetectionHistory {
    samples: VecDeque<bool>,
    capacity: usize,
}

impl DetectionHistory {
    /// Create an empty window. A zero capacity is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest ones beyond capacity
    pub fn push(&mut self, sample: bool) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// True iff any sample currently in the window is positive
    pub fn has_recent_positive(&self) -> bool {
        self.samples.iter().any(|&s| s)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DetectionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
