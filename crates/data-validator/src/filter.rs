//! Gauge smoothing
//!
//! Keeps the most recent readings of one gauge and reports their median, so
//! a single corrupted reply cannot swing the needle.

use crate::error::ValidationError;
use std::collections::VecDeque;

/// Median over the last `capacity` readings of one gauge
#[derive(Debug, Clone)]
pub struct MedianFilter {
    recent: VecDeque<f64>,
    capacity: usize,
}

impl MedianFilter {
    /// Window sizes must be odd so the median is an actual reading
    pub fn new(capacity: usize) -> Result<Self, ValidationError> {
        if capacity == 0 || capacity % 2 == 0 {
            return Err(ValidationError::InvalidWindow(capacity));
        }
        Ok(Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Record a reading and return the value to display.
    ///
    /// Until the window is full the reading is shown as is.
    pub fn filter(&mut self, reading: f64) -> f64 {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(reading);

        if self.is_warm() {
            self.median().unwrap_or(reading)
        } else {
            reading
        }
    }

    /// Median of the readings held so far; even counts take the lower middle
    pub fn median(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.recent.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        Some(sorted[(sorted.len() - 1) / 2])
    }

    /// Most recent raw reading
    pub fn latest(&self) -> Option<f64> {
        self.recent.back().copied()
    }

    /// Window is full and output is smoothed
    pub fn is_warm(&self) -> bool {
        self.recent.len() == self.capacity
    }

    /// Forget all readings, e.g. after the ignition cycles
    pub fn reset(&mut self) {
        self.recent.clear();
    }

    pub fn window_size(&self) -> usize {
        self.capacity
    }
}
