use std::collections::VecDeque;

use super::types::TimeSeriesSample;

/// Two samples per second for two minutes.
pub const DEFAULT_HISTORY_CAPACITY: usize = 240;

/// Fixed-capacity series with oldest-first eviction.
///
/// Single owner; callers serialise access themselves.
#[derive(Clone, Debug)]
pub struct TimeSeriesBuffer {
    samples: VecDeque<TimeSeriesSample>,
    capacity: usize,
}

impl TimeSeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        TimeSeriesBuffer {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY) + 1),
            capacity,
        }
    }

    /// Appends at the tail, then evicts the single oldest sample if the
    /// buffer went over capacity.
    pub fn append(&mut self, sample: TimeSeriesSample) {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn as_sequence(&self) -> impl ExactSizeIterator<Item = &TimeSeriesSample> + '_ {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<TimeSeriesSample> {
        self.samples.iter().cloned().collect()
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

    pub fn first(&self) -> Option<&TimeSeriesSample> {
        self.samples.front()
    }

    pub fn last(&self) -> Option<&TimeSeriesSample> {
        self.samples.back()
    }
}

impl Default for TimeSeriesBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
