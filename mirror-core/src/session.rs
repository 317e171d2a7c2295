//! Mirror sessions.
//!
//! A [`Mirror`] holds the network configuration shared by every stream
//! created from it and is the only way to create senders and receivers.
//! Receivers share one receive socket per session; a demultiplexer task
//! routes each datagram to the receiver registered for its stream id.
//!
//! The API is blocking. Call it from ordinary threads, never from
//! inside an async task or a sink callback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::BytesMut;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::capture::{CaptureBackend, SyntheticCapture};
use crate::error::MirrorError;
use crate::media::{BuiltinCodecs, CodecProvider, find_video_decoder, find_video_encoder};
use crate::options::{MAX_MTU, MirrorOptions, SenderOptions, TransportOptions};
use crate::receiver::{Decoders, Receiver, Route};
use crate::runtime;
use crate::sender::Sender;
use crate::sink::FrameSink;
use crate::source::{Source, SourceKind, enumerate_sources};
use crate::transport::{DatagramSocket, Fragment, FragmentCodec, Network, UdpNetwork};

/// Fragments buffered between the demultiplexer and one receiver.
const RECEIVE_QUEUE_DEPTH: usize = 1024;

/// Stream id → queue of the receiver registered for it.
pub(crate) type Routes = Arc<Mutex<HashMap<u32, mpsc::Sender<Fragment>>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Backends ─────────────────────────────────────────────────────

/// External collaborators a session drives.
#[derive(Clone)]
pub struct Backends {
    pub capture: Arc<dyn CaptureBackend>,
    pub codecs: Arc<dyn CodecProvider>,
    pub network: Arc<dyn Network>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            capture: Arc::new(SyntheticCapture::default()),
            codecs: Arc::new(BuiltinCodecs),
            network: Arc::new(UdpNetwork),
        }
    }
}

/// Everything a stream worker needs from its session.
pub(crate) struct StreamContext {
    pub runtime: Handle,
    pub transport: TransportOptions,
    pub cancel: CancellationToken,
    pub backends: Backends,
}

struct ReceiveSlot {
    generation: u64,
    local_addr: SocketAddr,
    routes: Routes,
}

// ── Mirror ───────────────────────────────────────────────────────

pub struct Mirror {
    options: MirrorOptions,
    transport: TransportOptions,
    backends: Backends,
    runtime: Handle,
    /// Parent of every stream and demultiplexer token.
    cancel: CancellationToken,
    receive: Arc<Mutex<Option<ReceiveSlot>>>,
    generation: AtomicU64,
}

impl Mirror {
    /// Create a session with the default backends.
    pub fn new(options: MirrorOptions) -> Result<Self, MirrorError> {
        Self::with_backends(options, Backends::default())
    }

    pub fn with_backends(options: MirrorOptions, backends: Backends) -> Result<Self, MirrorError> {
        let transport = options.resolve()?;
        let runtime = runtime::handle()?;

        info!(
            "mirror session created: server={} multicast={} mtu={}",
            transport.server,
            transport.multicast_target(),
            transport.mtu
        );

        Ok(Self {
            options,
            transport,
            backends,
            runtime,
            cancel: CancellationToken::new(),
            receive: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn transport(&self) -> TransportOptions {
        self.transport
    }

    /// Address of the shared receive socket, once a receiver bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.receive).as_ref().map(|slot| slot.local_addr)
    }

    /// Sources of `kind` offered by this session's capture backend.
    pub fn sources(&self, kind: SourceKind) -> Vec<Source> {
        enumerate_sources(self.backends.capture.as_ref(), kind)
    }

    /// Best video encoder id the codec backend offers.
    pub fn video_encoder(&self) -> &'static str {
        find_video_encoder(self.backends.codecs.as_ref())
    }

    /// Best video decoder id the codec backend offers.
    pub fn video_decoder(&self) -> &'static str {
        find_video_decoder(self.backends.codecs.as_ref())
    }

    /// Start capturing, encoding, and sending as stream `id`. The
    /// pipeline is running when this returns.
    pub fn create_sender(
        &self,
        id: u32,
        options: SenderOptions,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Sender, MirrorError> {
        Sender::start(id, options, sink, self.context())
    }

    /// Start receiving stream `id`, decoding video with `codec`.
    pub fn create_receiver(
        &self,
        id: u32,
        codec: &str,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Receiver, MirrorError> {
        let codecs = &self.backends.codecs;
        if !codecs.supports(codec) {
            return Err(MirrorError::UnknownCodec(codec.to_string()));
        }
        let video = codecs.video_decoder(codec)?;
        let audio = codecs.audio_decoder()?;

        let routes = self.receive_routes()?;
        let (tx, rx) = mpsc::channel(RECEIVE_QUEUE_DEPTH);
        let queue = tx.downgrade();
        {
            let mut map = lock(&routes);
            if map.contains_key(&id) {
                return Err(MirrorError::DuplicateStream(id));
            }
            map.insert(id, tx);
        }

        let route = Route { routes, queue, rx };
        Ok(Receiver::start(
            id,
            codec,
            Decoders { video, audio },
            route,
            sink,
            self.context(),
        ))
    }

    fn context(&self) -> StreamContext {
        StreamContext {
            runtime: self.runtime.clone(),
            transport: self.transport,
            cancel: self.cancel.child_token(),
            backends: self.backends.clone(),
        }
    }

    /// Routing table of the shared receive socket, binding it first if
    /// no receiver has done so yet.
    fn receive_routes(&self) -> Result<Routes, MirrorError> {
        let mut slot = lock(&self.receive);
        if let Some(active) = slot.as_ref() {
            return Ok(Arc::clone(&active.routes));
        }

        let socket = self.runtime.block_on(
            self.backends
                .network
                .bind_receiver(self.transport.bind, self.transport.multicast),
        )?;
        let local_addr = socket.local_addr()?;
        let routes = Routes::default();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        let demux = Demultiplexer {
            socket,
            routes: Arc::clone(&routes),
            codec: FragmentCodec::new(MAX_MTU),
            slot: Arc::downgrade(&self.receive),
            generation,
        };
        self.runtime.spawn(demux.run(self.cancel.child_token()));

        info!("receive socket bound on {local_addr}");
        *slot = Some(ReceiveSlot {
            generation,
            local_addr,
            routes: Arc::clone(&routes),
        });
        Ok(routes)
    }
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("transport", &self.transport)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        self.cancel.cancel();
        debug!("mirror session dropped");
    }
}

// ── Demultiplexer ────────────────────────────────────────────────

struct Demultiplexer {
    socket: Arc<dyn DatagramSocket>,
    routes: Routes,
    codec: FragmentCodec,
    slot: Weak<Mutex<Option<ReceiveSlot>>>,
    generation: u64,
}

impl Demultiplexer {
    async fn run(mut self, cancel: CancellationToken) {
        let mut buf = vec![0u8; MAX_MTU];
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => self.route(&buf[..len], peer),
                Err(e) => {
                    error!("receive socket failed: {e}");
                    self.release_slot();
                    break;
                }
            }
        }

        // Dropping the queues closes every receiver bound to this socket.
        lock(&self.routes).clear();
        debug!("demultiplexer stopped");
    }

    fn route(&mut self, datagram: &[u8], peer: SocketAddr) {
        let mut src = BytesMut::from(datagram);
        let fragment = match self.codec.decode(&mut src) {
            Ok(Some(fragment)) => fragment,
            Ok(None) => return,
            Err(e) => {
                debug!("discarding datagram from {peer}: {e}");
                return;
            }
        };

        let id = fragment.header.stream_id;
        let Some(tx) = lock(&self.routes).get(&id).cloned() else {
            debug!("no receiver for stream {id}, datagram from {peer} dropped");
            return;
        };

        match tx.try_send(fragment) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("receiver {id} is behind, fragment dropped"),
            Err(TrySendError::Closed(_)) => {
                let mut routes = lock(&self.routes);
                if routes.get(&id).is_some_and(|current| current.same_channel(&tx)) {
                    routes.remove(&id);
                }
            }
        }
    }

    /// Forget this socket so the next receiver binds a fresh one.
    fn release_slot(&self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let mut slot = lock(&slot);
        if slot.as_ref().is_some_and(|s| s.generation == self.generation) {
            *slot = None;
        }
    }
}
