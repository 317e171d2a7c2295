//! Built-in PCM audio codec.
//!
//! Every packet is independently decodable:
//!
//! ```text
//! sample_rate: u32  (4)
//! channels:    u8   (1)
//! data:        [u8]       zstd stream of little-endian i16 samples
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::MirrorError;
use crate::frame::AudioFrame;
use crate::media::{AudioDecoder, AudioEncoder, EncodedPacket};

const CODEC_HEADER_SIZE: usize = 5;

/// One second of 8-channel 192 kHz audio; anything larger is corrupt.
const MAX_DECODED_BYTES: usize = 192_000 * 8 * 2;

pub struct PcmEncoder {
    level: i32,
}

impl PcmEncoder {
    /// Low bit rates trade CPU for a smaller stream.
    pub fn new(bit_rate: u64) -> Self {
        let level = if bit_rate < 128_000 { 3 } else { 1 };
        Self { level }
    }
}

impl AudioEncoder for PcmEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<EncodedPacket>, MirrorError> {
        if frame.channels == 0 {
            return Err(MirrorError::Encode("audio frame has no channels".into()));
        }

        let mut raw = Vec::with_capacity(frame.samples.len() * 2);
        for sample in &frame.samples {
            raw.extend_from_slice(&sample.to_le_bytes());
        }

        let compressed = zstd::encode_all(raw.as_slice(), self.level)
            .map_err(|e| MirrorError::Encode(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(CODEC_HEADER_SIZE + compressed.len());
        out.put_u32_le(frame.sample_rate);
        out.put_u8(frame.channels);
        out.extend_from_slice(&compressed);

        Ok(vec![EncodedPacket {
            data: out.freeze(),
            keyframe: true,
            timestamp: frame.timestamp,
        }])
    }
}

#[derive(Default)]
pub struct PcmDecoder;

impl PcmDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&mut self, packet: &EncodedPacket) -> Result<Option<AudioFrame>, MirrorError> {
        let data = &packet.data;
        if data.len() < CODEC_HEADER_SIZE {
            return Err(MirrorError::Decode("packet shorter than codec header".into()));
        }

        let sample_rate = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let channels = data[4];
        if sample_rate == 0 || channels == 0 {
            return Err(MirrorError::Decode("zero sample rate or channels".into()));
        }

        let raw = zstd::bulk::decompress(&data[CODEC_HEADER_SIZE..], MAX_DECODED_BYTES)
            .map_err(|e| MirrorError::Decode(format!("zstd decode failed: {e}")))?;
        if raw.len() % (2 * channels as usize) != 0 {
            return Err(MirrorError::Decode("partial sample frame".into()));
        }

        let samples = raw
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Some(AudioFrame {
            sample_rate,
            channels,
            samples,
            timestamp: packet.timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_survives_coding() {
        let frame = AudioFrame {
            sample_rate: 44_100,
            channels: 2,
            samples: (0..882).map(|i| (i * 37 % 2000 - 1000) as i16).collect(),
            timestamp: 77,
        };

        let packet = PcmEncoder::new(64_000).encode(&frame).unwrap().remove(0);
        assert!(packet.keyframe);

        let decoded = PcmDecoder::new().decode(&packet).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn odd_sample_count_for_channels_rejected() {
        let frame = AudioFrame {
            sample_rate: 8_000,
            channels: 1,
            samples: vec![1, 2, 3],
            timestamp: 0,
        };
        let mut packet = PcmEncoder::new(64_000).encode(&frame).unwrap().remove(0);
        // Re-label as stereo: three samples cannot form whole stereo frames.
        let mut bytes = packet.data.to_vec();
        bytes[4] = 2;
        packet.data = bytes.into();
        assert!(PcmDecoder::new().decode(&packet).is_err());
    }
}
