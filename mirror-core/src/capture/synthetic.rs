//! Deterministic software capture backend.
//!
//! Produces a moving NV12 gradient and a stereo sine tone on background
//! threads. Used by the loopback tool and by tests that need a real
//! device-paced source without hardware.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::capture::{
    AudioCaptureDescription, CaptureBackend, CaptureHandle, FrameArrived, VideoCaptureDescription,
    timestamp_ms,
};
use crate::error::MirrorError;
use crate::frame::{AudioFrame, VideoFrame};
use crate::source::{Source, SourceKind};

/// Audio is delivered in 20 ms blocks.
const AUDIO_BLOCK: Duration = Duration::from_millis(20);
const AUDIO_CHANNELS: u8 = 2;
const TONE_HZ: f32 = 440.0;

#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    screens: usize,
    audio_inputs: usize,
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self {
            screens: 1,
            audio_inputs: 1,
        }
    }
}

impl SyntheticCapture {
    pub fn new(screens: usize, audio_inputs: usize) -> Self {
        Self {
            screens,
            audio_inputs,
        }
    }

    fn make_sources(kind: SourceKind, count: usize) -> Vec<Source> {
        (0..count)
            .map(|index| Source {
                index,
                kind,
                id: format!("synthetic-{}-{index}", kind.name()),
                name: format!("Synthetic {} {index}", kind.name()),
                is_default: index == 0,
            })
            .collect()
    }
}

impl CaptureBackend for SyntheticCapture {
    fn supports(&self, kind: SourceKind) -> bool {
        matches!(kind, SourceKind::Screen | SourceKind::Audio)
    }

    fn sources(&self, kind: SourceKind) -> Result<Vec<Source>, MirrorError> {
        Ok(match kind {
            SourceKind::Screen => Self::make_sources(kind, self.screens),
            SourceKind::Audio => Self::make_sources(kind, self.audio_inputs),
            SourceKind::Camera => Vec::new(),
        })
    }

    fn start_video(
        &self,
        source: &Source,
        description: VideoCaptureDescription,
        arrived: FrameArrived<VideoFrame>,
    ) -> Result<Box<dyn CaptureHandle>, MirrorError> {
        if source.kind != SourceKind::Screen {
            return Err(MirrorError::Unsupported("synthetic capture only provides screens"));
        }

        let interval = Duration::from_secs_f64(1.0 / description.fps.max(1) as f64);
        let handle = SyntheticHandle::spawn(format!("capture-{}", source.id), move |running| {
            let mut tick: u32 = 0;
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                let frame = gradient(description.width, description.height, tick);
                if !arrived.sink(frame) {
                    break;
                }
                tick = tick.wrapping_add(1);
                pace(started, interval);
            }
        })?;

        Ok(Box::new(handle))
    }

    fn start_audio(
        &self,
        source: &Source,
        description: AudioCaptureDescription,
        arrived: FrameArrived<AudioFrame>,
    ) -> Result<Box<dyn CaptureHandle>, MirrorError> {
        if source.kind != SourceKind::Audio {
            return Err(MirrorError::Unsupported("not an audio source"));
        }

        let sample_rate = description.sample_rate.max(1);
        let per_block = (sample_rate as u64 * AUDIO_BLOCK.as_millis() as u64 / 1000).max(1) as usize;
        let handle = SyntheticHandle::spawn(format!("capture-{}", source.id), move |running| {
            let mut phase = 0.0f32;
            let step = TAU * TONE_HZ / sample_rate as f32;
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                let mut samples = Vec::with_capacity(per_block * AUDIO_CHANNELS as usize);
                for _ in 0..per_block {
                    let value = (phase.sin() * i16::MAX as f32 * 0.25) as i16;
                    for _ in 0..AUDIO_CHANNELS {
                        samples.push(value);
                    }
                    phase = (phase + step) % TAU;
                }

                let frame = AudioFrame {
                    sample_rate,
                    channels: AUDIO_CHANNELS,
                    samples,
                    timestamp: timestamp_ms(),
                };
                if !arrived.sink(frame) {
                    break;
                }
                pace(started, AUDIO_BLOCK);
            }
        })?;

        Ok(Box::new(handle))
    }
}

/// A moving diagonal luma ramp over neutral chroma.
pub fn gradient(width: u32, height: u32, tick: u32) -> VideoFrame {
    let mut data = Vec::with_capacity(VideoFrame::nv12_len(width, height));
    for y in 0..height {
        for x in 0..width {
            data.push((x.wrapping_add(y).wrapping_add(tick) & 0xFF) as u8);
        }
    }
    data.resize(VideoFrame::nv12_len(width, height), 128);

    VideoFrame {
        width,
        height,
        data,
        timestamp: timestamp_ms(),
    }
}

fn pace(started: Instant, interval: Duration) {
    let elapsed = started.elapsed();
    if elapsed < interval {
        thread::sleep(interval - elapsed);
    }
}

// ── SyntheticHandle ──────────────────────────────────────────────

struct SyntheticHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticHandle {
    fn spawn<F>(name: String, body: F) -> Result<Self, MirrorError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new().name(name).spawn(move || body(flag))?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }
}

impl CaptureHandle for SyntheticHandle {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("synthetic capture thread panicked");
            }
        }
    }
}

impl Drop for SyntheticHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
