//! Sender pipeline: capture → encode → packetize → send.
//!
//! One worker task per sender waits on the capture queues, hands every
//! raw frame to the sink as a local preview, encodes it, and sends the
//! fragments to the destination chosen by the multicast flag. The flag
//! is read before every datagram, so a toggle takes effect on the next
//! fragment without disturbing the encoder.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;

use bytes::BytesMut;
use tokio::sync::watch;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::{
    AudioCaptureDescription, CAPTURE_QUEUE_DEPTH, CaptureBackend, CaptureHandle, CaptureQueue,
    FrameArrived, VideoCaptureDescription,
};
use crate::error::MirrorError;
use crate::frame::{AudioFrame, VideoFrame};
use crate::header::MediaKind;
use crate::media::{AudioEncoder, CodecProvider, EncodedPacket, VideoEncoder};
use crate::options::{AudioOptions, SenderOptions, TransportOptions, VideoOptions};
use crate::session::StreamContext;
use crate::sink::{FrameSink, SinkGuard};
use crate::state::{StateCell, StreamState};
use crate::stats::{StatsRecorder, StreamStats};
use crate::transport::{DatagramSocket, FragmentCodec, Packetizer};

/// State shared between the handle and the worker.
struct Shared {
    multicast: AtomicBool,
    state: StateCell,
    sink: SinkGuard,
    transport: TransportOptions,
}

impl Shared {
    fn destination(&self) -> SocketAddr {
        if self.multicast.load(Ordering::SeqCst) {
            self.transport.multicast_target()
        } else {
            self.transport.server
        }
    }

    fn finish(&self) {
        self.state.close();
        self.sink.close();
    }
}

// ── Sender ───────────────────────────────────────────────────────

/// Handle to a running sender. Dropping it (or calling
/// [`destroy`](Self::destroy)) stops the pipeline and returns only after
/// the sink's `on_close` has run.
pub struct Sender {
    id: u32,
    shared: Arc<Shared>,
    stats: watch::Receiver<StreamStats>,
    cancel: CancellationToken,
    done: Option<std_mpsc::Receiver<()>>,
    captures: Vec<Box<dyn CaptureHandle>>,
}

impl Sender {
    pub(crate) fn start(
        id: u32,
        options: SenderOptions,
        sink: Arc<dyn FrameSink>,
        ctx: StreamContext,
    ) -> Result<Self, MirrorError> {
        options.validate()?;
        let backends = &ctx.backends;

        // Open every encoder before touching a device.
        let video_encoder = match &options.video {
            Some(video) => Some(open_video(video, &*backends.capture, &*backends.codecs)?),
            None => None,
        };
        let audio_encoder = match &options.audio {
            Some(audio) => Some(open_audio(audio, &*backends.capture, &*backends.codecs)?),
            None => None,
        };

        let socket = ctx.runtime.block_on(backends.network.bind_sender())?;

        let mut captures = Vec::new();
        let video_queue = match &options.video {
            Some(video) => {
                let (arrived, queue) = FrameArrived::channel(CAPTURE_QUEUE_DEPTH);
                let description = VideoCaptureDescription {
                    width: video.encoder.width,
                    height: video.encoder.height,
                    fps: video.encoder.frame_rate,
                };
                match backends.capture.start_video(&video.source, description, arrived) {
                    Ok(handle) => captures.push(handle),
                    Err(e) => return Err(stop_all(captures, e)),
                }
                Some(queue)
            }
            None => None,
        };
        let audio_queue = match &options.audio {
            Some(audio) => {
                let (arrived, queue) = FrameArrived::channel(CAPTURE_QUEUE_DEPTH);
                let description = AudioCaptureDescription {
                    sample_rate: audio.encoder.sample_rate as u32,
                };
                match backends.capture.start_audio(&audio.source, description, arrived) {
                    Ok(handle) => captures.push(handle),
                    Err(e) => return Err(stop_all(captures, e)),
                }
                Some(queue)
            }
            None => None,
        };

        let shared = Arc::new(Shared {
            multicast: AtomicBool::new(options.multicast),
            state: StateCell::default(),
            sink: SinkGuard::new(sink),
            transport: ctx.transport,
        });
        let (stats, stats_rx) = StatsRecorder::new();
        let (done_tx, done_rx) = std_mpsc::channel();

        let mtu = ctx.transport.mtu;
        let worker = Worker {
            id,
            video: video_encoder.map(|encoder| VideoLane {
                encoder,
                packetizer: Packetizer::new(id, MediaKind::Video, mtu),
            }),
            audio: audio_encoder.map(|encoder| AudioLane {
                encoder,
                packetizer: Packetizer::new(id, MediaKind::Audio, mtu),
            }),
            link: Link {
                id,
                shared: Arc::clone(&shared),
                socket,
                codec: FragmentCodec::new(mtu),
                stats,
                failures: 0,
                max_failures: ctx.transport.max_send_failures,
                capture_dropped: 0,
            },
        };
        ctx.runtime.spawn(worker.run(
            video_queue,
            audio_queue,
            ctx.cancel.clone(),
            done_tx,
        ));

        info!(
            "sender {id} active: video={} audio={} destination={}",
            options.video.is_some(),
            options.audio.is_some(),
            shared.destination()
        );

        Ok(Self {
            id,
            shared,
            stats: stats_rx,
            cancel: ctx.cancel,
            done: Some(done_rx),
            captures,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.get()
    }

    /// Route subsequent fragments to the multicast group (`true`) or the
    /// unicast server (`false`).
    pub fn set_multicast(&self, enabled: bool) -> Result<(), MirrorError> {
        self.state().ensure_active()?;
        let previous = self.shared.multicast.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("sender {} now sending to {}", self.id, self.shared.destination());
        }
        Ok(())
    }

    pub fn get_multicast(&self) -> Result<bool, MirrorError> {
        self.state().ensure_active()?;
        Ok(self.shared.multicast.load(Ordering::SeqCst))
    }

    /// Where the next datagram goes.
    pub fn destination(&self) -> SocketAddr {
        self.shared.destination()
    }

    pub fn stats(&self) -> StreamStats {
        *self.stats.borrow()
    }

    /// Stop the sender. Equivalent to dropping the handle.
    pub fn destroy(self) {}

    fn teardown(&mut self) {
        self.cancel.cancel();
        if let Some(done) = self.done.take() {
            // An error means the worker was dropped with the runtime.
            let _ = done.recv();
        }
        for capture in &mut self.captures {
            capture.stop();
        }
        self.shared.finish();
        debug!("sender {} destroyed", self.id);
    }
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("destination", &self.destination())
            .finish_non_exhaustive()
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn open_video(
    video: &VideoOptions,
    capture: &dyn CaptureBackend,
    codecs: &dyn CodecProvider,
) -> Result<Box<dyn VideoEncoder>, MirrorError> {
    if !capture.supports(video.source.kind) {
        return Err(MirrorError::Unsupported("video capture of this source kind"));
    }
    if !codecs.supports(&video.encoder.codec) {
        return Err(MirrorError::UnknownCodec(video.encoder.codec.clone()));
    }
    codecs.video_encoder(&video.encoder)
}

fn open_audio(
    audio: &AudioOptions,
    capture: &dyn CaptureBackend,
    codecs: &dyn CodecProvider,
) -> Result<Box<dyn AudioEncoder>, MirrorError> {
    if !capture.supports(audio.source.kind) {
        return Err(MirrorError::Unsupported("audio capture"));
    }
    codecs.audio_encoder(&audio.encoder)
}

fn stop_all(mut captures: Vec<Box<dyn CaptureHandle>>, cause: MirrorError) -> MirrorError {
    for capture in &mut captures {
        capture.stop();
    }
    cause
}

// ── Worker ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Destroyed,
    SinkStopped,
    CaptureEnded,
    TransportFailed,
}

struct VideoLane {
    encoder: Box<dyn VideoEncoder>,
    packetizer: Packetizer,
}

struct AudioLane {
    encoder: Box<dyn AudioEncoder>,
    packetizer: Packetizer,
}

struct Worker {
    id: u32,
    video: Option<VideoLane>,
    audio: Option<AudioLane>,
    link: Link,
}

impl Worker {
    async fn run(
        mut self,
        mut video_queue: Option<CaptureQueue<VideoFrame>>,
        mut audio_queue: Option<CaptureQueue<AudioFrame>>,
        cancel: CancellationToken,
        done: std_mpsc::Sender<()>,
    ) {
        let exit = loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Exit::Destroyed),
                Some(frame) = next(&mut video_queue) => self.on_video(frame).await,
                Some(frame) = next(&mut audio_queue) => self.on_audio(frame).await,
                else => Err(Exit::CaptureEnded),
            };
            if let Err(exit) = step {
                break exit;
            }

            let capture_dropped = queue_drops(&video_queue) + queue_drops(&audio_queue);
            self.link.publish(capture_dropped);
        };

        match exit {
            Exit::Destroyed => debug!("sender {} cancelled", self.id),
            Exit::TransportFailed => error!("sender {} closed after repeated send failures", self.id),
            other => info!("sender {} stopped: {other:?}", self.id),
        }

        self.link.shared.finish();
        let _ = done.send(());
    }

    async fn on_video(&mut self, frame: VideoFrame) -> Result<(), Exit> {
        if !self.link.shared.sink.video(&frame) {
            return Err(Exit::SinkStopped);
        }
        let Some(lane) = self.video.as_mut() else {
            return Ok(());
        };
        match lane.encoder.encode(&frame) {
            Ok(packets) => self.link.transmit(&mut lane.packetizer, packets).await,
            Err(e) => {
                warn!("sender {}: video frame dropped: {e}", self.id);
                self.link.stats.dropped(1);
                Ok(())
            }
        }
    }

    async fn on_audio(&mut self, frame: AudioFrame) -> Result<(), Exit> {
        if !self.link.shared.sink.audio(&frame) {
            return Err(Exit::SinkStopped);
        }
        let Some(lane) = self.audio.as_mut() else {
            return Ok(());
        };
        match lane.encoder.encode(&frame) {
            Ok(packets) => self.link.transmit(&mut lane.packetizer, packets).await,
            Err(e) => {
                warn!("sender {}: audio frame dropped: {e}", self.id);
                self.link.stats.dropped(1);
                Ok(())
            }
        }
    }
}

async fn next<T>(queue: &mut Option<CaptureQueue<T>>) -> Option<T> {
    match queue {
        Some(queue) => queue.recv().await,
        None => None,
    }
}

fn queue_drops<T>(queue: &Option<CaptureQueue<T>>) -> u64 {
    queue.as_ref().map_or(0, CaptureQueue::dropped)
}

// ── Link ─────────────────────────────────────────────────────────

/// The network half of the worker.
struct Link {
    id: u32,
    shared: Arc<Shared>,
    socket: Arc<dyn DatagramSocket>,
    codec: FragmentCodec,
    stats: StatsRecorder,
    /// Consecutive failed sends.
    failures: u32,
    max_failures: u32,
    /// Capture-queue drops already counted.
    capture_dropped: u64,
}

impl Link {
    async fn transmit(
        &mut self,
        packetizer: &mut Packetizer,
        packets: Vec<EncodedPacket>,
    ) -> Result<(), Exit> {
        for packet in packets {
            let fragments = match packetizer.packetize(&packet) {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!("sender {}: frame dropped: {e}", self.id);
                    self.stats.dropped(1);
                    continue;
                }
            };

            let mut sent = 0;
            let mut bytes = 0;
            let mut complete = true;
            for fragment in fragments {
                let mut buf = BytesMut::with_capacity(fragment.wire_len());
                if let Err(e) = self.codec.encode(fragment, &mut buf) {
                    warn!("sender {}: {e}", self.id);
                    complete = false;
                    break;
                }

                let target = self.shared.destination();
                match self.socket.send_to(&buf, target).await {
                    Ok(_) => {
                        self.failures = 0;
                        sent += 1;
                        bytes += buf.len() as u64;
                    }
                    Err(source) => {
                        self.failures += 1;
                        let e = MirrorError::Send { target, source };
                        warn!(
                            "sender {}: {e} ({}/{})",
                            self.id, self.failures, self.max_failures
                        );
                        if self.failures >= self.max_failures {
                            return Err(Exit::TransportFailed);
                        }
                        complete = false;
                        break;
                    }
                }
            }

            self.stats.wire(sent, bytes);
            if complete {
                self.stats.frame();
            } else {
                self.stats.dropped(1);
            }
        }
        Ok(())
    }

    fn publish(&mut self, capture_dropped: u64) {
        if capture_dropped > self.capture_dropped {
            self.stats.dropped(capture_dropped - self.capture_dropped);
            self.capture_dropped = capture_dropped;
        }
        self.stats.publish();
    }
}
