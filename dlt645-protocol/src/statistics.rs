//! Link statistics collection

use dlt645_core::Dlt645Error;
use std::fmt;

/// Per-link counters
///
/// Kept by the client request engine and by every server connection. Useful to spot a
/// noisy serial line (checksum errors) or a meter that stops answering (timeouts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatistics {
    /// Total number of frames sent
    pub frames_sent: u64,
    /// Total number of frames received and decoded
    pub frames_received: u64,
    /// Number of byte sequences rejected for structural or semantic errors
    pub frames_rejected: u64,
    /// Number of checksum errors
    pub checksum_errors: u64,
    /// Number of timeout events
    pub timeouts: u64,
    /// Number of repeated requests
    pub retries: u64,
}

impl LinkStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_frames_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn increment_frames_received(&mut self) {
        self.frames_received += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn increment_retries(&mut self) {
        self.retries += 1;
    }

    /// Count a decoding failure under the matching counter
    pub fn record_rejection(&mut self, error: &Dlt645Error) {
        match error {
            Dlt645Error::ChecksumMismatch { .. } => self.checksum_errors += 1,
            _ => self.frames_rejected += 1,
        }
    }

    /// Get error rate as a percentage of all frames seen
    ///
    /// Returns 0.0 if no frames have been seen.
    pub fn error_rate(&self) -> f64 {
        let errors = self.frames_rejected + self.checksum_errors;
        let total = self.frames_received + errors;
        if total == 0 {
            0.0
        } else {
            (errors as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for LinkStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} received={} rejected={} checksum_errors={} timeouts={} retries={}",
            self.frames_sent,
            self.frames_received,
            self.frames_rejected,
            self.checksum_errors,
            self.timeouts,
            self.retries
        )
    }
}
