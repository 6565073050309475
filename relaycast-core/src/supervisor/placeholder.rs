//! Placeholder playback progress accounting.
//!
//! The placeholder loop must resume where it left off across restarts,
//! pauses, and crashes, so the clock accumulates only the time its
//! process was actually running and unpaused. Every exit path flushes
//! the in-flight segment into the accumulator before clearing the
//! segment marker; flushing twice is harmless.

use std::time::Duration;

use tokio::time::Instant;

/// Cumulative elapsed playback of the placeholder loop.
#[derive(Debug, Default)]
pub(crate) struct PlaceholderClock {
    elapsed: Duration,
    segment_start: Option<Instant>,
}

impl PlaceholderClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a running segment. Called the instant the
    /// placeholder pipeline is recorded as active, and again on resume.
    pub fn begin_segment(&mut self) {
        self.segment_start = Some(Instant::now());
    }

    /// Folds the in-flight segment into the accumulator. Idempotent.
    pub fn flush(&mut self) {
        if let Some(start) = self.segment_start.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Seek offset for the next placeholder start, in whole seconds.
    pub fn start_offset_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }

    /// Accumulated time plus any in-flight segment.
    pub fn running_total(&self) -> Duration {
        self.elapsed
            + self
                .segment_start
                .map(|start| start.elapsed())
                .unwrap_or_default()
    }
}
