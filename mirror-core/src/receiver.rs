//! Receiver pipeline: fragments → reassembly → decode → sink.
//!
//! The session's demultiplexer feeds the worker with the fragments of
//! one stream id. Video and audio are reassembled independently. After
//! joining, and after any lost, corrupt, or undecodable video frame,
//! video delivery resumes only at the next keyframe.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::header::MediaKind;
use crate::media::{AudioDecoder, EncodedPacket, VideoDecoder};
use crate::session::{Routes, StreamContext, lock};
use crate::sink::{FrameSink, SinkGuard};
use crate::state::{StateCell, StreamState};
use crate::stats::{StatsRecorder, StreamStats};
use crate::transport::{AssembledFrame, Fragment, Outcome, Reassembler};

pub(crate) struct Decoders {
    pub video: Box<dyn VideoDecoder>,
    pub audio: Box<dyn AudioDecoder>,
}

/// A receiver's entry in the session routing table.
pub(crate) struct Route {
    pub routes: Routes,
    /// Identifies this receiver's entry without keeping it open.
    pub queue: mpsc::WeakSender<Fragment>,
    pub rx: mpsc::Receiver<Fragment>,
}

struct Shared {
    state: StateCell,
    sink: SinkGuard,
}

impl Shared {
    fn finish(&self) {
        self.state.close();
        self.sink.close();
    }
}

// ── Receiver ─────────────────────────────────────────────────────

/// Handle to a running receiver. Dropping it (or calling
/// [`destroy`](Self::destroy)) stops the pipeline and returns only after
/// the sink's `on_close` has run.
pub struct Receiver {
    id: u32,
    codec: String,
    shared: Arc<Shared>,
    stats: watch::Receiver<StreamStats>,
    cancel: CancellationToken,
    done: Option<std_mpsc::Receiver<()>>,
    routes: Routes,
    queue: mpsc::WeakSender<Fragment>,
}

impl Receiver {
    pub(crate) fn start(
        id: u32,
        codec: &str,
        decoders: Decoders,
        route: Route,
        sink: Arc<dyn FrameSink>,
        ctx: StreamContext,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: StateCell::default(),
            sink: SinkGuard::new(sink),
        });
        let (stats, stats_rx) = StatsRecorder::new();
        let (done_tx, done_rx) = std_mpsc::channel();

        let window = ctx.transport.reorder_window;
        let worker = Worker {
            id,
            shared: Arc::clone(&shared),
            decoders,
            video: Reassembler::new(window),
            audio: Reassembler::new(window),
            awaiting_keyframe: true,
            stats,
        };
        ctx.runtime
            .spawn(worker.run(route.rx, ctx.cancel.clone(), done_tx));

        info!("receiver {id} active: codec={codec}");

        Self {
            id,
            codec: codec.to_string(),
            shared,
            stats: stats_rx,
            cancel: ctx.cancel,
            done: Some(done_rx),
            routes: route.routes,
            queue: route.queue,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Video codec this receiver decodes.
    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn state(&self) -> StreamState {
        self.shared.state.get()
    }

    pub fn stats(&self) -> StreamStats {
        *self.stats.borrow()
    }

    /// Stop the receiver. Equivalent to dropping the handle.
    pub fn destroy(self) {}

    fn teardown(&mut self) {
        self.cancel.cancel();
        self.unregister();
        if let Some(done) = self.done.take() {
            let _ = done.recv();
        }
        self.shared.finish();
        debug!("receiver {} destroyed", self.id);
    }

    /// Remove this receiver's route, unless the id was already reused.
    fn unregister(&self) {
        let mut routes = lock(&self.routes);
        let ours = match (routes.get(&self.id), self.queue.upgrade()) {
            (Some(current), Some(mine)) => current.same_channel(&mine),
            _ => false,
        };
        if ours {
            routes.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("codec", &self.codec)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ── Worker ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Destroyed,
    SinkStopped,
    TransportClosed,
}

struct Worker {
    id: u32,
    shared: Arc<Shared>,
    decoders: Decoders,
    video: Reassembler,
    audio: Reassembler,
    awaiting_keyframe: bool,
    stats: StatsRecorder,
}

impl Worker {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Fragment>,
        cancel: CancellationToken,
        done: std_mpsc::Sender<()>,
    ) {
        let exit = loop {
            let fragment = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Exit::Destroyed,
                fragment = rx.recv() => fragment,
            };
            let Some(fragment) = fragment else {
                break Exit::TransportClosed;
            };
            if let Err(exit) = self.accept(fragment) {
                break exit;
            }
            self.stats.publish();
        };

        match exit {
            Exit::Destroyed => debug!("receiver {} cancelled", self.id),
            Exit::TransportClosed => error!("receiver {} lost its transport", self.id),
            Exit::SinkStopped => info!("receiver {} stopped by its sink", self.id),
        }

        drop(rx);
        self.stats.publish();
        self.shared.finish();
        let _ = done.send(());
    }

    fn accept(&mut self, fragment: Fragment) -> Result<(), Exit> {
        self.stats.wire(1, fragment.wire_len() as u64);

        let media = fragment.header.media;
        let outcome = match media {
            MediaKind::Video => self.video.push(fragment),
            MediaKind::Audio => self.audio.push(fragment),
        };

        match outcome {
            Outcome::Pending => Ok(()),
            Outcome::Complete(frame) => {
                if frame.restarted {
                    info!("receiver {}: {media} sequence restarted at {}", self.id, frame.frame_seq);
                    if media == MediaKind::Video {
                        self.awaiting_keyframe = true;
                    }
                }
                if frame.lost_before > 0 {
                    debug!(
                        "receiver {}: {} {media} frame(s) lost before {}",
                        self.id, frame.lost_before, frame.frame_seq
                    );
                    self.lost(media, frame.lost_before as u64);
                }
                self.deliver(frame)
            }
            Outcome::Corrupt {
                frame_seq,
                lost_before,
            } => {
                warn!("receiver {}: corrupt {media} frame {frame_seq} dropped", self.id);
                self.lost(media, 1 + lost_before as u64);
                Ok(())
            }
            Outcome::Stale | Outcome::Duplicate => Ok(()),
            Outcome::Inconsistent => {
                debug!("receiver {}: inconsistent {media} fragment ignored", self.id);
                Ok(())
            }
        }
    }

    fn lost(&mut self, media: MediaKind, frames: u64) {
        self.stats.dropped(frames);
        if media == MediaKind::Video {
            self.awaiting_keyframe = true;
        }
    }

    fn deliver(&mut self, frame: AssembledFrame) -> Result<(), Exit> {
        let packet = EncodedPacket {
            data: frame.data,
            keyframe: frame.keyframe,
            timestamp: frame.timestamp,
        };

        match frame.media {
            MediaKind::Video => {
                if self.awaiting_keyframe && !packet.keyframe {
                    self.stats.dropped(1);
                    return Ok(());
                }
                match self.decoders.video.decode(&packet) {
                    Ok(Some(decoded)) => {
                        self.awaiting_keyframe = false;
                        self.stats.frame();
                        if !self.shared.sink.video(&decoded) {
                            return Err(Exit::SinkStopped);
                        }
                    }
                    Ok(None) => self.awaiting_keyframe = false,
                    Err(e) => {
                        warn!("receiver {}: video frame {} dropped: {e}", self.id, frame.frame_seq);
                        self.lost(MediaKind::Video, 1);
                    }
                }
            }
            MediaKind::Audio => match self.decoders.audio.decode(&packet) {
                Ok(Some(decoded)) => {
                    self.stats.frame();
                    if !self.shared.sink.audio(&decoded) {
                        return Err(Exit::SinkStopped);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("receiver {}: audio frame {} dropped: {e}", self.id, frame.frame_seq);
                    self.stats.dropped(1);
                }
            },
        }
        Ok(())
    }
}
