//! Loopback run: one receiving session, one sending session, and a
//! stats loop until the stop flag is raised or a stream closes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use mirror_core::{
    AudioFrame, AudioOptions, FrameSink, Mirror, MirrorError, SenderOptions, SourceKind,
    StreamState, StreamStats, VideoFrame, VideoOptions, default_source,
};

use crate::config::LoopbackConfig;

/// How often the run loop checks the stop flag.
const POLL: Duration = Duration::from_millis(100);

// ── CountingSink ─────────────────────────────────────────────────

/// Counts delivered frames. Never blocks.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub video: AtomicU64,
    pub audio: AtomicU64,
    pub closed: AtomicBool,
}

impl FrameSink for CountingSink {
    fn on_video(&self, _frame: &VideoFrame) -> bool {
        self.video.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn on_audio(&self, _frame: &AudioFrame) -> bool {
        self.audio.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn on_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Final counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub sent: StreamStats,
    pub received: StreamStats,
    pub video_frames: u64,
    pub audio_frames: u64,
}

// ── Loopback ─────────────────────────────────────────────────────

pub struct Loopback {
    config: LoopbackConfig,
    running: Arc<AtomicBool>,
}

impl Loopback {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clearing the flag ends [`run`](Self::run) at its next poll.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Start the runtime, mirror the synthetic sources through loopback,
    /// and shut everything down again. Blocks for the whole run.
    pub fn run(&self) -> Result<Summary, MirrorError> {
        mirror_core::startup()?;
        let result = self.mirror();
        mirror_core::shutdown();
        result
    }

    fn mirror(&self) -> Result<Summary, MirrorError> {
        let cfg = &self.config;
        let id = cfg.network.stream_id;

        let receiving = Mirror::new(cfg.receiver_options())?;
        let inbound = Arc::new(CountingSink::default());
        let receiver = receiving.create_receiver(id, receiving.video_decoder(), inbound.clone())?;
        let port = receiving
            .local_addr()
            .map(|addr| addr.port())
            .ok_or(MirrorError::Other("receive socket not bound".into()))?;
        info!("receiver {id} listening on port {port}");

        let sending = Mirror::new(cfg.sender_options(port))?;
        let options = self.sender_options(&sending)?;
        let sender = sending.create_sender(id, options, Arc::new(CountingSink::default()))?;
        info!("sender {id} → {}", sender.destination());

        let interval = Duration::from_secs(cfg.logging.stats_interval_secs.max(1));
        let deadline = match cfg.logging.duration_secs {
            0 => None,
            secs => Some(Instant::now() + Duration::from_secs(secs)),
        };
        let mut last_report = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
            if sender.state() == StreamState::Closed || receiver.state() == StreamState::Closed {
                warn!(
                    "stream closed: sender={} receiver={}",
                    sender.state(),
                    receiver.state()
                );
                break;
            }
            if last_report.elapsed() >= interval {
                report(&sender.stats(), &receiver.stats(), &inbound);
                last_report = Instant::now();
            }
            std::thread::sleep(POLL);
        }

        let summary = Summary {
            sent: sender.stats(),
            received: receiver.stats(),
            video_frames: inbound.video.load(Ordering::Relaxed),
            audio_frames: inbound.audio.load(Ordering::Relaxed),
        };
        sender.destroy();
        receiver.destroy();
        report(&summary.sent, &summary.received, &inbound);
        Ok(summary)
    }

    fn sender_options(&self, mirror: &Mirror) -> Result<SenderOptions, MirrorError> {
        let cfg = &self.config;

        let video = if cfg.video.enabled {
            let screens = mirror.sources(SourceKind::Screen);
            let source = default_source(&screens)
                .cloned()
                .ok_or(MirrorError::Unsupported("no screen source"))?;
            Some(VideoOptions {
                source,
                encoder: cfg.video_encoder(mirror.video_encoder()),
            })
        } else {
            None
        };

        let audio = if cfg.audio.enabled {
            let inputs = mirror.sources(SourceKind::Audio);
            let source = default_source(&inputs)
                .cloned()
                .ok_or(MirrorError::Unsupported("no audio source"))?;
            Some(AudioOptions {
                source,
                encoder: cfg.audio_encoder(),
            })
        } else {
            None
        };

        Ok(SenderOptions {
            video,
            audio,
            multicast: cfg.network.multicast,
        })
    }
}

fn report(sent: &StreamStats, received: &StreamStats, inbound: &CountingSink) {
    info!(
        "sent {} frames / {} fragments ({:.1} kbit/s) | received {} frames, {} dropped ({:.1} kbit/s) | video {} audio {}",
        sent.frames,
        sent.fragments,
        sent.bitrate as f64 / 1000.0,
        received.frames,
        received.dropped,
        received.bitrate as f64 / 1000.0,
        inbound.video.load(Ordering::Relaxed),
        inbound.audio.load(Ordering::Relaxed),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: each run starts and stops the process runtime.
    #[test]
    fn runs_until_deadline_or_stop_flag() {
        let mut config = LoopbackConfig::default();
        config.network.port = 0;
        config.video.width = 64;
        config.video.height = 36;
        config.logging.duration_secs = 1;

        let summary = Loopback::new(config.clone()).run().unwrap();
        assert!(summary.sent.frames > 0);
        assert!(summary.video_frames > 0);
        assert!(summary.audio_frames > 0);
        assert!(!mirror_core::is_started());

        config.logging.duration_secs = 0;
        config.audio.enabled = false;
        let loopback = Loopback::new(config);
        loopback.stop_handle().store(false, Ordering::SeqCst);
        let started = Instant::now();
        loopback.run().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
