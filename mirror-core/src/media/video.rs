//! Built-in software video codec (`"zstd"`).
//!
//! Lossless NV12 coding in two frame kinds:
//!
//! - **Keyframe**: the full image → zstd compress.
//! - **Delta frame**: XOR against the previous image → zstd compress.
//!   Static regions become runs of zeros and compress to almost nothing.
//!
//! ## Payload layout
//!
//! ```text
//! width:   u32  (4)
//! height:  u32  (4)
//! kind:    u8   (1)   0 = keyframe, 1 = delta
//! data:    [u8]       zstd stream
//! ```

use std::io::Read;

use bytes::{BufMut, BytesMut};

use crate::error::MirrorError;
use crate::frame::VideoFrame;
use crate::media::{EncodedPacket, VideoDecoder, VideoEncoder};

const CODEC_HEADER_SIZE: usize = 9;
const KIND_KEY: u8 = 0;
const KIND_DELTA: u8 = 1;

/// Reject dimensions no capture device produces.
const MAX_DIMENSION: u32 = 8_192;

/// zstd level 1 favours speed; the stream is latency-bound.
const COMPRESSION_LEVEL: i32 = 1;

// ── DeltaEncoder ─────────────────────────────────────────────────

pub struct DeltaEncoder {
    key_frame_interval: u32,
    /// Last encoded image, the reference for the next delta.
    previous: Option<VideoFrame>,
    /// Frames since the last keyframe.
    since_key: u32,
    frame_count: u64,
}

impl DeltaEncoder {
    pub fn new(key_frame_interval: u32) -> Self {
        Self {
            key_frame_interval: key_frame_interval.max(1),
            previous: None,
            since_key: 0,
            frame_count: 0,
        }
    }

    /// Number of frames encoded so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn needs_keyframe(&self, frame: &VideoFrame) -> bool {
        match &self.previous {
            None => true,
            Some(prev) => {
                prev.width != frame.width
                    || prev.height != frame.height
                    || self.since_key >= self.key_frame_interval
            }
        }
    }
}

impl VideoEncoder for DeltaEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> Result<Vec<EncodedPacket>, MirrorError> {
        if frame.data.len() != VideoFrame::nv12_len(frame.width, frame.height) {
            return Err(MirrorError::Encode(format!(
                "frame {}x{} carries {} bytes, not NV12",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }

        let keyframe = self.needs_keyframe(frame);
        let raw = match (&self.previous, keyframe) {
            (Some(prev), false) => xor(&frame.data, &prev.data),
            _ => frame.data.clone(),
        };

        let compressed = zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| MirrorError::Encode(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(CODEC_HEADER_SIZE + compressed.len());
        out.put_u32_le(frame.width);
        out.put_u32_le(frame.height);
        out.put_u8(if keyframe { KIND_KEY } else { KIND_DELTA });
        out.extend_from_slice(&compressed);

        self.since_key = if keyframe { 1 } else { self.since_key + 1 };
        self.previous = Some(frame.clone());
        self.frame_count += 1;

        Ok(vec![EncodedPacket {
            data: out.freeze(),
            keyframe,
            timestamp: frame.timestamp,
        }])
    }
}

// ── DeltaDecoder ─────────────────────────────────────────────────

/// Decoder holding the reconstructed reference image.
pub struct DeltaDecoder {
    reference: Option<VideoFrame>,
}

impl Default for DeltaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self { reference: None }
    }
}

impl VideoDecoder for DeltaDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Option<VideoFrame>, MirrorError> {
        let data = &packet.data;
        if data.len() < CODEC_HEADER_SIZE {
            return Err(MirrorError::Decode("packet shorter than codec header".into()));
        }

        let width = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let kind = data[8];

        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(MirrorError::Decode(format!("implausible size {width}x{height}")));
        }

        let expected = VideoFrame::nv12_len(width, height);
        let raw = inflate(&data[CODEC_HEADER_SIZE..], expected)?;

        let image = match kind {
            KIND_KEY => raw,
            KIND_DELTA => match &self.reference {
                Some(reference) if reference.width == width && reference.height == height => {
                    xor(&raw, &reference.data)
                }
                Some(_) => return Err(MirrorError::Decode("delta size differs from reference".into())),
                None => return Err(MirrorError::Decode("delta frame without reference".into())),
            },
            other => return Err(MirrorError::Decode(format!("unknown frame kind {other}"))),
        };

        let frame = VideoFrame {
            width,
            height,
            data: image,
            timestamp: packet.timestamp,
        };
        self.reference = Some(frame.clone());
        Ok(Some(frame))
    }
}

/// Decompress exactly `expected` bytes. The output buffer grows with
/// the bytes actually produced; the header's size is only an upper bound.
fn inflate(compressed: &[u8], expected: usize) -> Result<Vec<u8>, MirrorError> {
    let decode_err = |e: std::io::Error| MirrorError::Decode(format!("zstd decode failed: {e}"));
    let decoder = zstd::stream::read::Decoder::with_buffer(compressed).map_err(decode_err)?;
    let mut raw = Vec::new();
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut raw)
        .map_err(decode_err)?;
    if raw.len() != expected {
        return Err(MirrorError::Decode(format!(
            "image is {} bytes, header says {expected}",
            raw.len()
        )));
    }
    Ok(raw)
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

// ── Tests ────────────────────────────────────────────────────────
