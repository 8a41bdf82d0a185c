//! Recent trigger and photo timings.
//!
//! Kept as an extension point for adaptive frame timing. Nothing in the
//! motion code reads these samples yet.

use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept per series.
pub const STATS_CAPACITY: usize = 5;

/// Two bounded histories, newest first. Pushing into a full history drops
/// its oldest sample.
#[derive(Debug, Clone, Default)]
pub struct TimingStatsBuffer {
    triggers: VecDeque<Duration>,
    photos: VecDeque<Duration>,
}

impl TimingStatsBuffer {
    pub fn new() -> Self {
        Self {
            triggers: VecDeque::with_capacity(STATS_CAPACITY),
            photos: VecDeque::with_capacity(STATS_CAPACITY),
        }
    }

    /// Record the time between two trigger events.
    pub fn record_trigger(&mut self, elapsed: Duration) {
        push_bounded(&mut self.triggers, elapsed);
    }

    /// Record the time from trigger to photo completion.
    pub fn record_photo(&mut self, elapsed: Duration) {
        push_bounded(&mut self.photos, elapsed);
    }

    pub fn triggers(&self) -> impl Iterator<Item = Duration> + '_ {
        self.triggers.iter().copied()
    }

    pub fn photos(&self) -> impl Iterator<Item = Duration> + '_ {
        self.photos.iter().copied()
    }

    pub fn clear(&mut self) {
        self.triggers.clear();
        self.photos.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty() && self.photos.is_empty()
    }
}

fn push_bounded(samples: &mut VecDeque<Duration>, sample: Duration) {
    samples.push_front(sample);
    samples.truncate(STATS_CAPACITY);
}
