//! Per-stream counters and a rolling bandwidth estimate.
//!
//! Workers own a [`StatsRecorder`] and publish snapshots through a
//! `tokio::sync::watch` channel; handles read the latest snapshot
//! without touching the worker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Snapshot of a stream's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames sent (sender) or delivered to the sink (receiver).
    pub frames: u64,
    /// Bytes on the wire, headers included.
    pub bytes: u64,
    /// Datagrams sent or accepted.
    pub fragments: u64,
    /// Frames lost, dropped by a full queue, stale, corrupt, or
    /// undecodable.
    pub dropped: u64,
    /// Wire bit rate over the last second.
    pub bitrate: u64,
}

// ── BandwidthEstimator ───────────────────────────────────────────

/// Rolling-window throughput estimator.
///
/// Records `(timestamp, bytes)` samples and averages them over the
/// most recent `window`.
pub struct BandwidthEstimator {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
}

impl BandwidthEstimator {
    /// Create an estimator with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Estimated throughput in bytes/second over the window.
    pub fn estimate_bps(&self) -> u64 {
        let (Some((first, _)), Some((last, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0;
        };
        let elapsed = last.duration_since(*first).max(Duration::from_millis(1));
        (self.total_bytes as f64 / elapsed.as_secs_f64()) as u64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) <= self.window {
                break;
            }
            self.samples.pop_front();
            self.total_bytes = self.total_bytes.saturating_sub(bytes);
        }
    }
}

impl Default for BandwidthEstimator {
    fn default() -> Self {
        Self::new()
    }
}

// ── StatsRecorder ────────────────────────────────────────────────

/// Worker-side accumulator.
pub(crate) struct StatsRecorder {
    current: StreamStats,
    bandwidth: BandwidthEstimator,
    tx: watch::Sender<StreamStats>,
}

impl StatsRecorder {
    pub(crate) fn new() -> (Self, watch::Receiver<StreamStats>) {
        let (tx, rx) = watch::channel(StreamStats::default());
        (
            Self {
                current: StreamStats::default(),
                bandwidth: BandwidthEstimator::new(),
                tx,
            },
            rx,
        )
    }

    /// Account for datagrams moved on the wire.
    pub(crate) fn wire(&mut self, fragments: u64, bytes: u64) {
        self.current.fragments += fragments;
        self.current.bytes += bytes;
        self.bandwidth.record(bytes);
        self.current.bitrate = self.bandwidth.estimate_bps() * 8;
    }

    pub(crate) fn frame(&mut self) {
        self.current.frames += 1;
    }

    pub(crate) fn dropped(&mut self, frames: u64) {
        self.current.dropped += frames;
    }

    pub(crate) fn publish(&self) {
        self.tx.send_replace(self.current);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_estimator_returns_zero() {
        assert_eq!(BandwidthEstimator::new().estimate_bps(), 0);
    }

    #[test]
    fn two_samples_one_second_apart() {
        let mut est = BandwidthEstimator::with_window(Duration::from_secs(5));
        let t0 = Instant::now();
        est.record_at(t0, 1_000_000);
        est.record_at(t0 + Duration::from_secs(1), 1_000_000);
        let bps = est.estimate_bps();
        assert!((1_900_000..=2_100_000).contains(&bps), "bps = {bps}");
    }

    #[test]
    fn evicts_old_samples() {
        let mut est = BandwidthEstimator::with_window(Duration::from_millis(500));
        let t0 = Instant::now();
        est.record_at(t0, 1000);
        est.record_at(t0 + Duration::from_secs(1), 500);
        assert_eq!(est.sample_count(), 1);
    }

    #[test]
    fn recorder_publishes_snapshots() {
        let (mut rec, rx) = StatsRecorder::new();
        rec.wire(4, 5112);
        rec.frame();
        rec.dropped(2);
        assert_eq!(rx.borrow().frames, 0);

        rec.publish();
        let stats = *rx.borrow();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.fragments, 4);
        assert_eq!(stats.bytes, 5112);
        assert_eq!(stats.dropped, 2);
        assert!(stats.bitrate > 0);
    }
}
