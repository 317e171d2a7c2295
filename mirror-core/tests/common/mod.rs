//! Shared fixtures for the pipeline tests: an in-memory network, a
//! recording sink, and a codec provider with fixed-size output.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use mirror_core::media::{
    AudioDecoder, AudioEncoder, PcmDecoder, PcmEncoder, VideoDecoder, VideoEncoder,
};
use mirror_core::{
    AudioFrame, CodecProvider, DatagramSocket, EncodedPacket, FrameSink, MirrorError, Network,
    VideoFrame,
};
use mirror_core::{AudioEncoderOptions, VideoEncoderOptions};

// ── Helpers ──────────────────────────────────────────────────────

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

/// Run `f` and fail the test if it takes longer than `limit`.
pub fn within<T>(limit: Duration, what: &str, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let out = f();
    let took = started.elapsed();
    assert!(took <= limit, "{what} took {took:?}, limit {limit:?}");
    out
}

/// Deterministic payload of `len` bytes.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

// ── RecordingSink ────────────────────────────────────────────────

pub struct RecordingSink {
    pub video: Mutex<Vec<VideoFrame>>,
    pub audio: AtomicUsize,
    pub closes: AtomicUsize,
    /// A frame callback arrived after `on_close`.
    pub late: AtomicBool,
    /// Value returned from the frame callbacks.
    pub keep_going: AtomicBool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            video: Mutex::new(Vec::new()),
            audio: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            late: AtomicBool::new(false),
            keep_going: AtomicBool::new(true),
        }
    }
}

impl RecordingSink {
    pub fn stopping() -> Self {
        let sink = Self::default();
        sink.keep_going.store(false, Ordering::SeqCst);
        sink
    }

    pub fn video_count(&self) -> usize {
        self.video.lock().unwrap().len()
    }

    pub fn audio_count(&self) -> usize {
        self.audio.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_open(&self) {
        if self.closes() > 0 {
            self.late.store(true, Ordering::SeqCst);
        }
    }
}

impl FrameSink for RecordingSink {
    fn on_video(&self, frame: &VideoFrame) -> bool {
        self.check_open();
        self.video.lock().unwrap().push(frame.clone());
        self.keep_going.load(Ordering::SeqCst)
    }

    fn on_audio(&self, _frame: &AudioFrame) -> bool {
        self.check_open();
        self.audio.fetch_add(1, Ordering::SeqCst);
        self.keep_going.load(Ordering::SeqCst)
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ── TimedSink ────────────────────────────────────────────────────

/// Spends `work` inside every video callback and records how long each
/// call took from entry to return.
pub struct TimedSink {
    pub work: Duration,
    pub calls: Mutex<Vec<Duration>>,
    pub inner: RecordingSink,
}

impl TimedSink {
    pub fn new(work: Duration) -> Self {
        Self {
            work,
            calls: Mutex::new(Vec::new()),
            inner: RecordingSink::default(),
        }
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

impl FrameSink for TimedSink {
    fn on_video(&self, frame: &VideoFrame) -> bool {
        let entered = Instant::now();
        std::thread::sleep(self.work);
        let keep_going = self.inner.on_video(frame);
        self.calls.lock().unwrap().push(entered.elapsed());
        keep_going
    }

    fn on_audio(&self, frame: &AudioFrame) -> bool {
        self.inner.on_audio(frame)
    }

    fn on_close(&self) {
        self.inner.on_close();
    }
}

// ── FixedCodecs ──────────────────────────────────────────────────

/// Codec id understood by [`FixedCodecs`].
pub const RAW_CODEC: &str = "raw";

/// Encodes every video frame as a fixed-size keyframe and decodes any
/// payload into a 0x0 frame carrying the payload bytes.
pub struct FixedCodecs {
    pub payload: usize,
}

struct FixedEncoder {
    payload: usize,
}

impl VideoEncoder for FixedEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedPacket>, MirrorError> {
        Ok(vec![EncodedPacket {
            data: Bytes::from(pattern(self.payload, 0)),
            keyframe: true,
            timestamp: frame.timestamp,
        }])
    }
}

struct PassthroughDecoder;

impl VideoDecoder for PassthroughDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Option<VideoFrame>, MirrorError> {
        Ok(Some(VideoFrame {
            width: 0,
            height: 0,
            data: packet.data.to_vec(),
            timestamp: packet.timestamp,
        }))
    }
}

impl CodecProvider for FixedCodecs {
    fn supports(&self, codec: &str) -> bool {
        codec == RAW_CODEC
    }

    fn video_encoder(
        &self,
        _options: &VideoEncoderOptions,
    ) -> Result<Box<dyn VideoEncoder>, MirrorError> {
        Ok(Box::new(FixedEncoder {
            payload: self.payload,
        }))
    }

    fn video_decoder(&self, _codec: &str) -> Result<Box<dyn VideoDecoder>, MirrorError> {
        Ok(Box::new(PassthroughDecoder))
    }

    fn audio_encoder(
        &self,
        options: &AudioEncoderOptions,
    ) -> Result<Box<dyn AudioEncoder>, MirrorError> {
        Ok(Box::new(PcmEncoder::new(options.bit_rate)))
    }

    fn audio_decoder(&self) -> Result<Box<dyn AudioDecoder>, MirrorError> {
        Ok(Box::new(PcmDecoder::new()))
    }
}

// ── MemoryNetwork ────────────────────────────────────────────────

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Default)]
struct Hub {
    next_port: u16,
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    /// (group, port, member)
    groups: Vec<(Ipv4Addr, u16, SocketAddr)>,
    sent: Vec<(SocketAddr, usize)>,
    fail_sends: bool,
}

impl Hub {
    fn allocate(&mut self) -> SocketAddr {
        self.next_port += 1;
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 40_000 + self.next_port)
    }

    fn deliver(&self, data: &[u8], from: SocketAddr, target: SocketAddr) {
        let members: Vec<SocketAddr> = match target.ip() {
            IpAddr::V4(ip) if ip.is_multicast() => self
                .groups
                .iter()
                .filter(|(group, port, _)| *group == ip && *port == target.port())
                .map(|(_, _, member)| *member)
                .collect(),
            _ => self
                .endpoints
                .keys()
                .filter(|addr| {
                    addr.port() == target.port()
                        && (addr.ip() == target.ip() || addr.ip().is_unspecified())
                })
                .copied()
                .collect(),
        };

        for member in members {
            if let Some(tx) = self.endpoints.get(&member) {
                let _ = tx.send((data.to_vec(), from));
            }
        }
    }
}

/// Lossless in-process datagram network that records every send.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    /// `(target, size)` of every datagram sent so far.
    pub fn sent(&self) -> Vec<(SocketAddr, usize)> {
        self.hub.lock().unwrap().sent.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.hub.lock().unwrap().fail_sends = fail;
    }

    /// Tear down every receive endpoint, as if the sockets faulted.
    pub fn kill_receivers(&self) {
        let mut hub = self.hub.lock().unwrap();
        hub.endpoints.clear();
        hub.groups.clear();
    }

    fn socket(&self, addr: SocketAddr) -> Arc<dyn DatagramSocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.lock().unwrap().endpoints.insert(addr, tx);
        Arc::new(MemorySocket {
            addr,
            hub: Arc::clone(&self.hub),
            rx: tokio::sync::Mutex::new(rx),
        })
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn bind_sender(&self) -> io::Result<Arc<dyn DatagramSocket>> {
        let addr = self.hub.lock().unwrap().allocate();
        Ok(self.socket(addr))
    }

    async fn bind_receiver(
        &self,
        bind: SocketAddr,
        group: Ipv4Addr,
    ) -> io::Result<Arc<dyn DatagramSocket>> {
        let addr = if bind.port() == 0 {
            self.hub.lock().unwrap().allocate()
        } else {
            bind
        };
        let socket = self.socket(addr);
        if group.is_multicast() {
            self.hub
                .lock()
                .unwrap()
                .groups
                .push((group, addr.port(), addr));
        }
        Ok(socket)
    }
}

struct MemorySocket {
    addr: SocketAddr,
    hub: Arc<Mutex<Hub>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let mut hub = self.hub.lock().unwrap();
        if hub.fail_sends {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "destination unreachable",
            ));
        }
        hub.sent.push((target, buf.len()));
        hub.deliver(buf, self.addr, target);
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some((data, from)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket closed")),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}
