//! Capture backend seam.
//!
//! Platform capture (screen duplication, camera, audio devices) lives
//! outside this crate. A backend enumerates sources and, once started,
//! pushes raw frames into a [`FrameArrived`] handle from its own
//! device-paced thread.

pub mod synthetic;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::error::MirrorError;
use crate::frame::{AudioFrame, VideoFrame};
use crate::source::{Source, SourceKind};

pub use synthetic::SyntheticCapture;

/// Raw frames buffered between a capture thread and its pipeline.
pub const CAPTURE_QUEUE_DEPTH: usize = 4;

// ── Descriptions ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCaptureDescription {
    pub width: u32,
    pub height: u32,
    pub fps: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCaptureDescription {
    pub sample_rate: u32,
}

// ── FrameArrived ─────────────────────────────────────────────────

/// Push end of a capture queue, handed to the backend.
///
/// Never blocks: when the pipeline is behind, the frame is dropped and
/// counted so the device thread keeps its pace.
pub struct FrameArrived<T> {
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for FrameArrived<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> FrameArrived<T> {
    /// Create a queue of `depth` frames and return both ends.
    pub fn channel(depth: usize) -> (Self, CaptureQueue<T>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                dropped: Arc::clone(&dropped),
            },
            CaptureQueue { rx, dropped },
        )
    }

    /// Offer a captured frame. Returns `false` once the pipeline is
    /// gone, after which the backend should stop capturing.
    pub fn sink(&self, frame: T) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── CaptureQueue ─────────────────────────────────────────────────

/// Pull end of a capture queue, owned by the pipeline.
pub struct CaptureQueue<T> {
    rx: mpsc::Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> CaptureQueue<T> {
    /// Next frame, or `None` once every [`FrameArrived`] is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Blocking variant for use outside the runtime.
    pub fn blocking_recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Frames the capture side had to discard so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── Backend traits ───────────────────────────────────────────────

/// A running capture. Stopping is idempotent.
pub trait CaptureHandle: Send {
    fn stop(&mut self);
}

pub trait CaptureBackend: Send + Sync {
    /// Whether this platform can capture sources of `kind` at all.
    fn supports(&self, kind: SourceKind) -> bool;

    /// Enumerate the sources of `kind`.
    fn sources(&self, kind: SourceKind) -> Result<Vec<Source>, MirrorError>;

    /// Start capturing video from `source`. Must not block until
    /// capture stops; the backend keeps its own capture thread.
    fn start_video(
        &self,
        source: &Source,
        description: VideoCaptureDescription,
        arrived: FrameArrived<VideoFrame>,
    ) -> Result<Box<dyn CaptureHandle>, MirrorError>;

    /// Start capturing audio from `source`.
    fn start_audio(
        &self,
        source: &Source,
        description: AudioCaptureDescription,
        arrived: FrameArrived<AudioFrame>,
    ) -> Result<Box<dyn CaptureHandle>, MirrorError>;
}

/// Wall-clock capture timestamp in milliseconds.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_without_blocking() {
        let (arrived, mut rx) = FrameArrived::channel(1);
        assert!(arrived.sink(1u32));
        assert!(arrived.sink(2u32));
        assert_eq!(arrived.dropped(), 1);
        assert_eq!(rx.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn closed_queue_stops_capture() {
        let (arrived, rx) = FrameArrived::channel(1);
        drop(rx);
        assert!(!arrived.sink(1u32));
    }
}
