//! Capture statistics

use serde::{Deserialize, Serialize};

/// Snapshot of a capture worker's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Frames published to the sink
    pub frames_captured: u64,

    /// Lock attempts that timed out
    pub lock_timeouts: u64,

    /// Failed frame reads
    pub capture_errors: u64,

    pub is_running: bool,
}

impl CaptureStats {
    /// Frame rate over the interval since `previous`
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_captured.saturating_sub(previous.frames_captured);
        frames_delta as f64 / elapsed_secs
    }

    /// Share of lock attempts that timed out
    pub fn contention_rate(&self) -> f64 {
        let attempts = self.frames_captured + self.capture_errors + self.lock_timeouts;
        if attempts == 0 {
            return 0.0;
        }

        self.lock_timeouts as f64 / attempts as f64
    }
}
