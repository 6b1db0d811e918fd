//! [`RetryGuard`] – detects an area the mission keeps failing to reach.
//!
//! The controller records the area id every time planning towards it
//! fails.  Once the same id has been recorded `threshold` times in a row
//! [`RetryGuard::record`] returns `true` and the area should be skipped.
//! A success for that area (or any other id) breaks the streak.
//!
//! # Example
//!
//! ```rust
//! use talus_mission::guard::RetryGuard;
//!
//! let mut guard = RetryGuard::new(3);
//! assert!(!guard.record("ridge"));
//! assert!(!guard.record("ridge"));
//! assert!(guard.record("ridge"));
//!
//! guard.reset();
//! assert!(!guard.record("ridge"));
//! ```

use std::collections::VecDeque;

pub struct RetryGuard {
    threshold: usize,
    history: VecDeque<String>,
}

impl RetryGuard {
    /// A `threshold` of zero is treated as one.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record a failure for `key`; `true` once the streak reaches the
    /// threshold.
    pub fn record(&mut self, key: &str) -> bool {
        self.history.push_back(key.to_string());
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        self.is_exhausted()
    }

    /// Length of the current streak of identical keys.
    pub fn streak(&self) -> usize {
        match self.history.back() {
            Some(last) => self.history.iter().rev().take_while(|k| *k == last).count(),
            None => 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.history.len() >= self.threshold && self.streak() >= self.threshold
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
