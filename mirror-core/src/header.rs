//! Fixed-size fragment header carried at the front of every datagram.
//!
//! ## Wire format (little-endian, 28 bytes)
//!
//! ```text
//! magic:          u16  (2)   0x4D52 ("MR")
//! stream_id:      u32  (4)
//! frame_seq:      u32  (4)
//! fragment_index: u16  (2)
//! fragment_count: u16  (2)
//! media:          u8   (1)   0 = video, 1 = audio
//! flags:          u8   (1)   see FragmentFlags
//! timestamp:      u64  (8)   capture timestamp in milliseconds
//! checksum:       u32  (4)   BLAKE3 prefix of the whole encoded frame
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::flags::FragmentFlags;

pub const MAGIC: u16 = 0x4D52;
pub const HEADER_SIZE: usize = 28;

// ── MediaKind ────────────────────────────────────────────────────

/// Media type tag of a transport unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video = 0,
    Audio = 1,
}

impl TryFrom<u8> for MediaKind {
    type Error = MirrorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Video),
            1 => Ok(Self::Audio),
            _ => Err(MirrorError::InvalidHeader("unknown media kind")),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// ── FragmentHeader ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub stream_id: u32,
    pub frame_seq: u32,
    pub fragment_index: u16,
    pub fragment_count: u16,
    pub media: MediaKind,
    pub flags: FragmentFlags,
    pub timestamp: u64,
    pub checksum: u32,
}

impl FragmentHeader {
    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&MAGIC.to_le_bytes());
        buf[2..6].copy_from_slice(&self.stream_id.to_le_bytes());
        buf[6..10].copy_from_slice(&self.frame_seq.to_le_bytes());
        buf[10..12].copy_from_slice(&self.fragment_index.to_le_bytes());
        buf[12..14].copy_from_slice(&self.fragment_count.to_le_bytes());
        buf[14] = self.media as u8;
        buf[15] = self.flags.bits();
        buf[16..24].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[24..28].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize and validate a header from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, MirrorError> {
        if data.len() < HEADER_SIZE {
            return Err(MirrorError::InvalidHeader("datagram shorter than header"));
        }

        if u16::from_le_bytes([data[0], data[1]]) != MAGIC {
            return Err(MirrorError::InvalidHeader("bad magic"));
        }

        let fragment_index = u16::from_le_bytes([data[10], data[11]]);
        let fragment_count = u16::from_le_bytes([data[12], data[13]]);
        if fragment_count == 0 {
            return Err(MirrorError::InvalidHeader("zero fragment count"));
        }
        if fragment_index >= fragment_count {
            return Err(MirrorError::InvalidHeader("fragment index out of range"));
        }

        Ok(Self {
            stream_id: read_u32(&data[2..6]),
            frame_seq: read_u32(&data[6..10]),
            fragment_index,
            fragment_count,
            media: MediaKind::try_from(data[14])?,
            flags: FragmentFlags::from_bits_truncate(data[15]),
            timestamp: u64::from_le_bytes([
                data[16], data[17], data[18], data[19], data[20], data[21], data[22], data[23],
            ]),
            checksum: read_u32(&data[24..28]),
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Truncated BLAKE3 digest used to detect corrupt reassembled frames.
pub fn checksum(payload: &[u8]) -> u32 {
    let hash = blake3::hash(payload);
    let bytes = hash.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FragmentHeader {
        FragmentHeader {
            stream_id: 3,
            frame_seq: 42,
            fragment_index: 1,
            fragment_count: 4,
            media: MediaKind::Audio,
            flags: FragmentFlags::KEYFRAME,
            timestamp: 123_456,
            checksum: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn header_roundtrip() {
        let decoded = FragmentHeader::decode(&sample().encode()).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn header_too_short() {
        assert!(FragmentHeader::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = sample().encode();
        bytes[0] = 0;
        assert!(matches!(
            FragmentHeader::decode(&bytes),
            Err(MirrorError::InvalidHeader("bad magic"))
        ));
    }

    #[test]
    fn index_outside_count_rejected() {
        let mut hdr = sample();
        hdr.fragment_index = 4;
        assert!(FragmentHeader::decode(&hdr.encode()).is_err());
    }

    #[test]
    fn unknown_media_rejected() {
        let mut bytes = sample().encode();
        bytes[14] = 9;
        assert!(FragmentHeader::decode(&bytes).is_err());
    }

    #[test]
    fn checksum_differs_on_corruption() {
        let a = checksum(b"hello world");
        let b = checksum(b"hello worle");
        assert_ne!(a, b);
        assert_eq!(a, checksum(b"hello world"));
    }
}
