//! Frame Sink contract.
//!
//! A [`FrameSink`] is the application's side of a stream. Its methods
//! run synchronously on the stream's worker, between two network reads
//! or two captured frames, so they should return promptly: a callback
//! that blocks stalls every later frame of that stream. Other streams
//! keep running, because the worker hands its runtime thread over to
//! the rest of the pool for the duration of each callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::frame::{AudioFrame, VideoFrame};

/// Consumer of the frames produced by a sender or receiver.
///
/// Receivers deliver decoded frames. Senders deliver the raw captured
/// frames before encoding, which serves as a local preview.
pub trait FrameSink: Send + Sync {
    /// Return `false` to stop the stream gracefully.
    fn on_video(&self, _frame: &VideoFrame) -> bool {
        true
    }

    /// Return `false` to stop the stream gracefully.
    fn on_audio(&self, _frame: &AudioFrame) -> bool {
        true
    }

    /// Called exactly once when the stream closes, whatever the cause.
    /// No frame callback follows it.
    fn on_close(&self) {}
}

/// A sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl FrameSink for NullSink {}

// ── SinkGuard ────────────────────────────────────────────────────

/// Enforces the close-once contract around a caller's sink.
pub(crate) struct SinkGuard {
    sink: Arc<dyn FrameSink>,
    closed: AtomicBool,
}

impl SinkGuard {
    pub(crate) fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            sink,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn video(&self, frame: &VideoFrame) -> bool {
        !self.is_closed() && outside_pool(|| self.sink.on_video(frame))
    }

    pub(crate) fn audio(&self, frame: &AudioFrame) -> bool {
        !self.is_closed() && outside_pool(|| self.sink.on_audio(frame))
    }

    /// Fire `on_close` unless it already ran. Returns whether this call
    /// was the one that closed the sink.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        outside_pool(|| self.sink.on_close());
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Run caller code so that it cannot starve the worker pool. On a
/// multi-thread runtime the current worker's queue moves to another
/// thread while `f` runs; anywhere else `f` runs inline.
fn outside_pool<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
