//! Sliding-window request counter with one-second slots.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Counts events over a sliding window, bucketed per second.
///
/// Slots outside the window are evicted lazily on the next access, so an
/// idle counter holds at most `window` seconds of slots.
pub struct SlidingWindowCounter {
    window_secs: u64,
    start: Instant,
    slots: VecDeque<(u64, u64)>,
}

impl SlidingWindowCounter {
    /// Create a counter over `window`; sub-second windows round up to one
    /// slot.
    pub fn new(window: Duration) -> Self {
        Self {
            window_secs: window.as_secs().max(1),
            start: Instant::now(),
            slots: VecDeque::new(),
        }
    }

    /// Record one event.
    pub fn increment(&mut self) {
        let now = self.start.elapsed().as_secs();
        self.evict(now);
        match self.slots.back_mut() {
            Some((sec, count)) if *sec == now => *count += 1,
            _ => self.slots.push_back((now, 1)),
        }
    }

    /// Events within the window.
    pub fn count(&mut self) -> u64 {
        let now = self.start.elapsed().as_secs();
        self.evict(now);
        self.slots.iter().map(|(_, count)| count).sum()
    }

    fn evict(&mut self, now: u64) {
        while let Some((sec, _)) = self.slots.front() {
            if sec + self.window_secs <= now {
                self.slots.pop_front();
            } else {
                break;
            }
        }
    }
}
