//! Session, sender, and encoder configuration.
//!
//! All option structs are plain serde-friendly values. They are
//! validated when a session or stream is created; a failed validation
//! produces a configuration-class [`MirrorError`] and no object.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::header::HEADER_SIZE;
use crate::media::SOFTWARE_VIDEO_CODEC;
use crate::source::Source;

/// Recommended MTU for typical Ethernet/Wi-Fi paths.
pub const DEFAULT_MTU: usize = 1400;

/// Largest UDP payload that fits an IPv4 datagram.
pub const MAX_MTU: usize = 65_507;

// ── Encoder options ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoEncoderOptions {
    /// Codec id, e.g. `h264_qsv`, `h264_nvenc`, `libx264`.
    pub codec: String,
    /// Frames per second.
    pub frame_rate: u8,
    pub width: u32,
    pub height: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u64,
    /// Emit a keyframe every `key_frame_interval` frames.
    pub key_frame_interval: u32,
}

impl Default for VideoEncoderOptions {
    fn default() -> Self {
        Self {
            codec: SOFTWARE_VIDEO_CODEC.to_string(),
            frame_rate: 30,
            width: 1280,
            height: 720,
            bit_rate: 500 * 1024 * 8,
            key_frame_interval: 15,
        }
    }
}

impl VideoEncoderOptions {
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.codec.is_empty() {
            return Err(MirrorError::InvalidVideoOptions("codec must not be empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(MirrorError::InvalidVideoOptions("width and height must be > 0"));
        }
        if self.frame_rate == 0 {
            return Err(MirrorError::InvalidVideoOptions("frame_rate must be > 0"));
        }
        if self.key_frame_interval == 0 {
            return Err(MirrorError::InvalidVideoOptions("key_frame_interval must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEncoderOptions {
    /// Samples per second.
    pub sample_rate: u64,
    /// Target bit rate in bits per second.
    pub bit_rate: u64,
}

impl Default for AudioEncoderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bit_rate: 64_000,
        }
    }
}

impl AudioEncoderOptions {
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.sample_rate == 0 || self.sample_rate > u32::MAX as u64 {
            return Err(MirrorError::InvalidAudioOptions("sample_rate out of range"));
        }
        if self.bit_rate == 0 {
            return Err(MirrorError::InvalidAudioOptions("bit_rate must be > 0"));
        }
        Ok(())
    }
}

// ── Sender options ───────────────────────────────────────────────

/// A capture source bound to video encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOptions {
    pub source: Source,
    pub encoder: VideoEncoderOptions,
}

/// A capture source bound to audio encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOptions {
    pub source: Source,
    pub encoder: AudioEncoderOptions,
}

/// What a sender captures and how it starts out routing.
///
/// Either media kind may be absent, but not both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderOptions {
    pub video: Option<VideoOptions>,
    pub audio: Option<AudioOptions>,
    /// Start in multicast mode instead of unicast.
    pub multicast: bool,
}

impl SenderOptions {
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.video.is_none() && self.audio.is_none() {
            return Err(MirrorError::EmptySenderOptions);
        }

        if let Some(video) = &self.video {
            video.encoder.validate()?;
            if !video.source.kind.is_video() {
                return Err(MirrorError::SourceKindMismatch {
                    id: video.source.id.clone(),
                    expected: "camera or screen",
                    actual: video.source.kind.name(),
                });
            }
        }

        if let Some(audio) = &self.audio {
            audio.encoder.validate()?;
            if audio.source.kind.is_video() {
                return Err(MirrorError::SourceKindMismatch {
                    id: audio.source.id.clone(),
                    expected: "audio",
                    actual: audio.source.kind.name(),
                });
            }
        }

        Ok(())
    }
}

// ── Session options ──────────────────────────────────────────────

/// Shared network configuration of a [`Mirror`](crate::Mirror) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorOptions {
    /// Unicast destination, `host:port`.
    pub server: String,
    /// Multicast group, e.g. `239.0.0.1`. Shares the server port.
    pub multicast: String,
    /// Maximum transmission unit, header included.
    pub mtu: usize,
    /// Local address receivers listen on. Defaults to `0.0.0.0:<server port>`.
    pub bind: Option<String>,
    /// Consecutive send failures tolerated before a sender closes.
    pub max_send_failures: u32,
    /// Partial frames buffered per stream while waiting for fragments.
    pub reorder_window: usize,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8088".into(),
            multicast: "239.0.0.1".into(),
            mtu: DEFAULT_MTU,
            bind: None,
            max_send_failures: 3,
            reorder_window: 16,
        }
    }
}

impl MirrorOptions {
    /// Validate and resolve into typed transport settings.
    pub fn resolve(&self) -> Result<TransportOptions, MirrorError> {
        let min = HEADER_SIZE + 1;
        if self.mtu < min || self.mtu > MAX_MTU {
            return Err(MirrorError::InvalidMtu {
                mtu: self.mtu,
                min,
                max: MAX_MTU,
            });
        }

        let server: SocketAddr = parse_addr(&self.server)?;
        let multicast: Ipv4Addr =
            self.multicast
                .parse()
                .map_err(|e: std::net::AddrParseError| MirrorError::InvalidAddress {
                    value: self.multicast.clone(),
                    reason: e.to_string(),
                })?;

        let bind = match &self.bind {
            Some(bind) => parse_addr(bind)?,
            None => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), server.port()),
        };

        Ok(TransportOptions {
            server,
            multicast,
            bind,
            mtu: self.mtu,
            max_send_failures: self.max_send_failures.max(1),
            reorder_window: self.reorder_window.max(1),
        })
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, MirrorError> {
    value
        .parse()
        .map_err(|e: std::net::AddrParseError| MirrorError::InvalidAddress {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Validated, typed form of [`MirrorOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub server: SocketAddr,
    pub multicast: Ipv4Addr,
    pub bind: SocketAddr,
    pub mtu: usize,
    pub max_send_failures: u32,
    pub reorder_window: usize,
}

impl TransportOptions {
    /// Where multicast traffic for this session is addressed.
    pub fn multicast_target(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.multicast), self.server.port())
    }

    /// Payload bytes available per fragment.
    pub fn effective_mtu(&self) -> usize {
        self.mtu - HEADER_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    fn source(kind: SourceKind) -> Source {
        Source {
            index: 0,
            kind,
            id: "dev0".into(),
            name: "Device".into(),
            is_default: true,
        }
    }

    #[test]
    fn default_options_resolve() {
        let opts = MirrorOptions::default().resolve().unwrap();
        assert_eq!(opts.mtu, DEFAULT_MTU);
        assert_eq!(opts.bind.port(), opts.server.port());
        assert!(opts.bind.ip().is_unspecified());
        assert_eq!(opts.effective_mtu(), DEFAULT_MTU - HEADER_SIZE);
    }

    #[test]
    fn multicast_target_shares_server_port() {
        let opts = MirrorOptions {
            server: "10.0.0.2:9000".into(),
            multicast: "239.1.2.3".into(),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(opts.multicast_target(), "239.1.2.3:9000".parse().unwrap());
    }

    #[test]
    fn mtu_bounds() {
        for mtu in [0, HEADER_SIZE, MAX_MTU + 1] {
            let err = MirrorOptions {
                mtu,
                ..Default::default()
            }
            .resolve()
            .unwrap_err();
            assert!(matches!(err, MirrorError::InvalidMtu { .. }));
        }
        assert!(
            MirrorOptions {
                mtu: HEADER_SIZE + 1,
                ..Default::default()
            }
            .resolve()
            .is_ok()
        );
    }

    #[test]
    fn bad_addresses_rejected() {
        let err = MirrorOptions {
            server: "not an address".into(),
            ..Default::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidAddress { .. }));

        let err = MirrorOptions {
            multicast: "239.0.0".into(),
            ..Default::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidAddress { .. }));
    }

    #[test]
    fn video_invariants() {
        let mut opts = VideoEncoderOptions::default();
        assert!(opts.validate().is_ok());
        opts.width = 0;
        assert!(opts.validate().is_err());

        let mut opts = VideoEncoderOptions::default();
        opts.key_frame_interval = 0;
        assert!(opts.validate().is_err());

        let mut opts = VideoEncoderOptions::default();
        opts.frame_rate = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn sender_needs_some_media() {
        assert!(matches!(
            SenderOptions::default().validate(),
            Err(MirrorError::EmptySenderOptions)
        ));
    }

    #[test]
    fn sender_rejects_mismatched_sources() {
        let opts = SenderOptions {
            video: Some(VideoOptions {
                source: source(SourceKind::Audio),
                encoder: VideoEncoderOptions::default(),
            }),
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(MirrorError::SourceKindMismatch { .. })
        ));

        let opts = SenderOptions {
            audio: Some(AudioOptions {
                source: source(SourceKind::Screen),
                encoder: AudioEncoderOptions::default(),
            }),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }
}
