//! Bounded feature history for one market
//!
//! Only the trailing window is ever read (feature rolling window, prediction
//! window, training batch), so the buffer keeps exactly that many entries.
//! Length saturates at capacity and never shrinks while the worker runs.

use std::collections::VecDeque;

use super::types::FeatureVector;

/// Rolling window used by feature derivation and rug-pull detection
pub const ROLLING_WINDOW: usize = 10;

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<FeatureVector>,
    capacity: usize,
    total_appended: u64,
}

impl History {
    /// Create an empty history holding at most `capacity` vectors.
    ///
    /// Capacity is raised to the rolling window so the 10-point statistics
    /// always have their inputs.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(ROLLING_WINDOW);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Size the buffer for a predictor window plus its training batch
    pub fn for_model(history_length: usize, future_steps: usize, batch_size: usize) -> Self {
        Self::new(history_length + future_steps + batch_size)
    }

    pub fn push(&mut self, vector: FeatureVector) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(vector);
        self.total_appended += 1;
    }

    /// Retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every vector appended since the worker started
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn last(&self) -> Option<&FeatureVector> {
        self.entries.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &FeatureVector> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The last `n` entries (or fewer), oldest first
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &FeatureVector> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Contiguous view of the retained entries, oldest first
    pub fn as_slice(&mut self) -> &[FeatureVector] {
        self.entries.make_contiguous()
    }
}
