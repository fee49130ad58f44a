//! Rolling-window bandwidth sampling, learned compression-ratio tracking,
//! and queue status/ETA derivation.
//!
//! `now` is always passed in rather than read from the clock, so the
//! pruning and rate arithmetic can be driven deterministically in tests.

use std::collections::VecDeque;
use std::time::Duration;

/// Byte-range samples older than this are dropped on every update.
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Downloading,
}

/// Snapshot of the tracker's state, suitable for exposing to a host UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueStats {
    pub status: Status,
    pub bytes_queued: u64,
    pub rate_bytes_per_sec: Option<f64>,
    pub eta_seconds: Option<f64>,
}

/// Tracks recent transfer samples and a running compression-ratio estimate
/// to convert a task's compressed-byte estimate into an expected decoded
/// size.
pub struct BandwidthTracker {
    samples: VecDeque<(Duration, u64)>,
    compression_ratio_sum: f64,
    compression_ratio_count: u64,
    bytes_queued: u64,
}

impl BandwidthTracker {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            compression_ratio_sum: 0.0,
            compression_ratio_count: 0,
            bytes_queued: 0,
        }
    }

    /// Record a progress event of `bytes` received at `now` (monotonic
    /// clock reading since some fixed epoch) and prune samples older than
    /// [`SAMPLE_WINDOW`].
    pub fn record_progress(&mut self, now: Duration, bytes: u64) {
        self.samples.push_back((now, bytes));
        while let Some(&(oldest, _)) = self.samples.front() {
            if now.saturating_sub(oldest) > SAMPLE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// `Σbytes / (now - oldestSampleTs)`, undefined with fewer than two
    /// samples or a window under 0.5 s.
    pub fn rate_bytes_per_sec(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let oldest = self.samples.front()?.0;
        let newest = self.samples.back()?.0;
        let span = newest.saturating_sub(oldest);
        if span < Duration::from_millis(500) {
            return None;
        }
        let total: u64 = self.samples.iter().map(|(_, b)| b).sum();
        Some(total as f64 / span.as_secs_f64())
    }

    /// Fold one completed task's actual-vs-estimated byte count into the
    /// running compression-ratio mean.
    pub fn record_task_complete(&mut self, actual_bytes: u64, expected_bytes: u64) {
        if expected_bytes == 0 {
            return;
        }
        let ratio = actual_bytes as f64 / expected_bytes as f64;
        self.compression_ratio_sum += ratio;
        self.compression_ratio_count += 1;
    }

    /// The running mean of `actualBytes / expectedBytes`, or `1.0` before
    /// any task has completed.
    pub fn compression_ratio(&self) -> f64 {
        if self.compression_ratio_count == 0 {
            1.0
        } else {
            self.compression_ratio_sum / self.compression_ratio_count as f64
        }
    }

    /// Update the queued-bytes estimate from the sum of in-flight tasks'
    /// compressed-size estimates, corrected by the learned compression
    /// ratio.
    pub fn set_bytes_queued(&mut self, estimated_compressed_bytes: u64) {
        self.bytes_queued = (estimated_compressed_bytes as f64 * self.compression_ratio()).round() as u64;
    }

    pub fn stats(&self) -> QueueStats {
        let rate = self.rate_bytes_per_sec();
        let eta = match (rate, self.bytes_queued) {
            (Some(r), bytes) if r > 0.0 && bytes > 0 => Some(bytes as f64 / r),
            _ => None,
        };
        QueueStats {
            status: if self.bytes_queued > 0 { Status::Downloading } else { Status::Idle },
            bytes_queued: self.bytes_queued,
            rate_bytes_per_sec: rate,
            eta_seconds: eta,
        }
    }
}

impl Default for BandwidthTracker {
    fn default() -> Self {
        Self::new()
    }
}
