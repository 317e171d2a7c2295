//! Codec seam and capability probe.
//!
//! Bitstream encoding and decoding are black boxes behind
//! [`CodecProvider`]. The crate compiles in one software implementation,
//! [`BuiltinCodecs`], so the probe always has a usable fallback.
//!
//! | Module   | Purpose                                             |
//! |--------- |-----------------------------------------------------|
//! | `probe`  | hardware-first encoder/decoder selection            |
//! | `video`  | built-in zstd intra/delta NV12 codec                |
//! | `audio`  | built-in zstd PCM codec                             |

pub mod audio;
pub mod probe;
pub mod video;

use bytes::Bytes;

use crate::error::MirrorError;
use crate::frame::{AudioFrame, VideoFrame};
use crate::options::{AudioEncoderOptions, VideoEncoderOptions};

pub use audio::{PcmDecoder, PcmEncoder};
pub use probe::{find_video_decoder, find_video_encoder};
pub use video::{DeltaDecoder, DeltaEncoder};

/// Codec id of the built-in software video codec.
pub const SOFTWARE_VIDEO_CODEC: &str = "zstd";

// ── EncodedPacket ────────────────────────────────────────────────

/// One encoded access unit, the payload of a transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Bytes,
    /// Decodable without any earlier packet.
    pub keyframe: bool,
    /// Capture timestamp in milliseconds.
    pub timestamp: u64,
}

// ── Codec traits ─────────────────────────────────────────────────

pub trait VideoEncoder: Send {
    /// Encode one raw frame. May return zero packets while buffering.
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedPacket>, MirrorError>;
}

pub trait VideoDecoder: Send {
    /// Decode one reassembled packet. `Ok(None)` means the decoder
    /// needs more input before it can emit a frame.
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Option<VideoFrame>, MirrorError>;
}

pub trait AudioEncoder: Send {
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<EncodedPacket>, MirrorError>;
}

pub trait AudioDecoder: Send {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Option<AudioFrame>, MirrorError>;
}

/// Factory for encoders and decoders, plus the capability query the
/// probe relies on.
pub trait CodecProvider: Send + Sync {
    /// Whether `codec` can be instantiated on this machine.
    fn supports(&self, codec: &str) -> bool;

    fn video_encoder(
        &self,
        options: &VideoEncoderOptions,
    ) -> Result<Box<dyn VideoEncoder>, MirrorError>;

    fn video_decoder(&self, codec: &str) -> Result<Box<dyn VideoDecoder>, MirrorError>;

    fn audio_encoder(
        &self,
        options: &AudioEncoderOptions,
    ) -> Result<Box<dyn AudioEncoder>, MirrorError>;

    fn audio_decoder(&self) -> Result<Box<dyn AudioDecoder>, MirrorError>;
}

// ── BuiltinCodecs ────────────────────────────────────────────────

/// Software codecs that are always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCodecs;

impl CodecProvider for BuiltinCodecs {
    fn supports(&self, codec: &str) -> bool {
        codec == SOFTWARE_VIDEO_CODEC
    }

    fn video_encoder(
        &self,
        options: &VideoEncoderOptions,
    ) -> Result<Box<dyn VideoEncoder>, MirrorError> {
        if !self.supports(&options.codec) {
            return Err(MirrorError::UnknownCodec(options.codec.clone()));
        }
        Ok(Box::new(DeltaEncoder::new(options.key_frame_interval)))
    }

    fn video_decoder(&self, codec: &str) -> Result<Box<dyn VideoDecoder>, MirrorError> {
        if !self.supports(codec) {
            return Err(MirrorError::UnknownCodec(codec.to_string()));
        }
        Ok(Box::new(DeltaDecoder::new()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rejects_foreign_codecs() {
        let codecs = BuiltinCodecs;
        assert!(codecs.supports(SOFTWARE_VIDEO_CODEC));
        assert!(matches!(
            codecs.video_decoder("h264_qsv"),
            Err(MirrorError::UnknownCodec(_))
        ));

        let opts = VideoEncoderOptions {
            codec: "libx264".into(),
            ..Default::default()
        };
        assert!(codecs.video_encoder(&opts).is_err());
    }
}
