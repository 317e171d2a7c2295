//! # mirror-core
//!
//! Real-time screen, camera, and audio mirroring over UDP.
//!
//! A capture source is encoded, split into MTU-bounded fragments, sent
//! to a unicast server or a multicast group, reassembled on the far
//! side, decoded, and handed to the application's [`FrameSink`].
//!
//! This crate contains:
//! - **Runtime**: [`startup`] / [`shutdown`] of the process-wide worker pool
//! - **Session**: [`Mirror`], the factory for senders and receivers
//! - **Streams**: [`Sender`] and [`Receiver`] pipelines with their stats
//! - **Discovery**: [`enumerate_sources`] and the codec capability probe
//! - **Transport**: fragment header, packetizer, reassembler, datagram codec
//! - **Seams**: capture, codec, and network backends behind traits
//! - **Error**: [`MirrorError`], a `thiserror`-based error hierarchy
//!
//! ```no_run
//! use std::sync::Arc;
//! use mirror_core::{Mirror, MirrorOptions, NullSink, SourceKind, VideoOptions, SenderOptions};
//!
//! # fn main() -> Result<(), mirror_core::MirrorError> {
//! mirror_core::startup()?;
//! let mirror = Mirror::new(MirrorOptions::default())?;
//! let screen = mirror.sources(SourceKind::Screen).remove(0);
//! let sender = mirror.create_sender(
//!     1,
//!     SenderOptions {
//!         video: Some(VideoOptions { source: screen, encoder: Default::default() }),
//!         ..Default::default()
//!     },
//!     Arc::new(NullSink),
//! )?;
//! sender.set_multicast(true)?;
//! drop(sender);
//! drop(mirror);
//! mirror_core::shutdown();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod error;
pub mod flags;
pub mod frame;
pub mod header;
pub mod media;
pub mod options;
pub mod receiver;
pub mod runtime;
pub mod sender;
pub mod session;
pub mod sink;
pub mod source;
pub mod state;
pub mod stats;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{CaptureBackend, CaptureHandle, FrameArrived, SyntheticCapture};
pub use error::MirrorError;
pub use flags::FragmentFlags;
pub use frame::{AudioFrame, VideoFrame};
pub use header::{FragmentHeader, HEADER_SIZE, MediaKind};
pub use media::{
    BuiltinCodecs, CodecProvider, EncodedPacket, SOFTWARE_VIDEO_CODEC, find_video_decoder,
    find_video_encoder,
};
pub use options::{
    AudioEncoderOptions, AudioOptions, DEFAULT_MTU, MirrorOptions, SenderOptions,
    TransportOptions, VideoEncoderOptions, VideoOptions,
};
pub use receiver::Receiver;
pub use runtime::{RuntimeOptions, is_started, shutdown, startup, startup_with};
pub use sender::Sender;
pub use session::{Backends, Mirror};
pub use sink::{FrameSink, NullSink};
pub use source::{Source, SourceKind, default_source, enumerate_sources};
pub use state::StreamState;
pub use stats::StreamStats;
pub use transport::{DatagramSocket, Fragment, FragmentCodec, Network, Packetizer, UdpNetwork};
