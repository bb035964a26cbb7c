//! Throughput samples and bounded sample history

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One throughput reading taken during an active phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    /// Position of the sample within its phase, starting at 0
    pub index: u64,
    /// Instantaneous throughput in Mbit/s
    pub mbps: f64,
}

/// Append-only ring of the most recent samples
///
/// Once `capacity` is reached the oldest sample is dropped for each new one.
/// Indices keep counting up across evictions.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    capacity: usize,
    next_index: u64,
    samples: VecDeque<SpeedSample>,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_index: 0,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, mbps: f64) -> SpeedSample {
        let sample = SpeedSample {
            index: self.next_index,
            mbps,
        };
        self.next_index += 1;

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        sample
    }

    pub fn last(&self) -> Option<SpeedSample> {
        self.samples.back().copied()
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

    /// Total samples ever pushed, including evicted ones
    pub fn total_pushed(&self) -> u64 {
        self.next_index
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpeedSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<SpeedSample> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_drops_oldest() {
        let mut history = SampleHistory::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            history.push(v);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(history.total_pushed(), 5);
        let kept: Vec<f64> = history.iter().map(|s| s.mbps).collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0]);
        let indices: Vec<u64> = history.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut history = SampleHistory::new(0);
        history.push(1.0);
        history.push(2.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().mbps, 2.0);
    }
}
