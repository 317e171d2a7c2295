//! Domain-specific error types for mirroring sessions.
//!
//! Configuration problems are reported synchronously at creation time.
//! Transport faults inside a running stream never surface here; they
//! close the stream and fire the sink's `on_close` instead.

use std::net::SocketAddr;
use thiserror::Error;

/// The canonical error type for the mirror library.
#[derive(Debug, Error)]
pub enum MirrorError {
    // ── Configuration Errors ─────────────────────────────────────
    /// An address in the options could not be parsed.
    #[error("invalid address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },

    /// The MTU cannot hold a fragment header plus at least one byte.
    #[error("invalid mtu {mtu}: must be in {min}..={max}")]
    InvalidMtu { mtu: usize, min: usize, max: usize },

    /// Video encoder settings violate their invariants.
    #[error("invalid video options: {0}")]
    InvalidVideoOptions(&'static str),

    /// Audio encoder settings violate their invariants.
    #[error("invalid audio options: {0}")]
    InvalidAudioOptions(&'static str),

    /// A sender was requested without any video or audio options.
    #[error("sender options carry neither video nor audio")]
    EmptySenderOptions,

    /// A source of the wrong kind was bound to a media pipeline.
    #[error("source {id:?} is a {actual}, expected {expected}")]
    SourceKindMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A stream id is already in use on this session.
    #[error("stream id {0} already registered on this session")]
    DuplicateStream(u32),

    // ── Capability Errors ────────────────────────────────────────
    /// The platform backend cannot perform the requested operation.
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),

    /// The codec provider does not know the requested codec id.
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// The process-wide runtime was not started (or already shut down).
    #[error("mirror runtime is not started")]
    NotStarted,

    /// The sender or receiver has already transitioned to `Closed`.
    #[error("stream is closed")]
    Closed,

    // ── Wire Errors ──────────────────────────────────────────────
    /// A datagram did not carry a valid fragment header.
    #[error("invalid fragment header: {0}")]
    InvalidHeader(&'static str),

    /// A datagram exceeds the configured MTU.
    #[error("fragment too large: {size} bytes (mtu {mtu})")]
    FragmentTooLarge { size: usize, mtu: usize },

    /// An encoded frame needs more fragments than the header can count.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Codec Errors ─────────────────────────────────────────────
    /// The codec backend failed to encode a frame.
    #[error("encode error: {0}")]
    Encode(String),

    /// A reassembled unit could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    // ── I/O Errors ───────────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Sending to a specific destination failed.
    #[error("send to {target} failed: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Whether this error belongs to the configuration class, i.e. it
    /// was caused by the caller's options rather than the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. }
                | Self::InvalidMtu { .. }
                | Self::InvalidVideoOptions(_)
                | Self::InvalidAudioOptions(_)
                | Self::EmptySenderOptions
                | Self::SourceKindMismatch { .. }
                | Self::DuplicateStream(_)
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MirrorError {
    fn from(s: String) -> Self {
        MirrorError::Other(s)
    }
}

impl From<&str> for MirrorError {
    fn from(s: &str) -> Self {
        MirrorError::Other(s.to_string())
    }
}
