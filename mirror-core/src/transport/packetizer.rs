//! Splits encoded frames into MTU-sized fragments.

use crate::error::MirrorError;
use crate::flags::FragmentFlags;
use crate::header::{FragmentHeader, HEADER_SIZE, MediaKind, checksum};
use crate::media::EncodedPacket;
use crate::transport::Fragment;

/// Per-stream, per-media fragmenter.
///
/// Owns the frame sequence counter of its media kind. A frame that is
/// rejected does not consume a sequence number.
#[derive(Debug)]
pub struct Packetizer {
    stream_id: u32,
    media: MediaKind,
    mtu: usize,
    next_seq: u32,
}

impl Packetizer {
    /// `mtu` is the full datagram budget, header included. Must be
    /// greater than [`HEADER_SIZE`].
    pub fn new(stream_id: u32, media: MediaKind, mtu: usize) -> Self {
        Self {
            stream_id,
            media,
            mtu: mtu.max(HEADER_SIZE + 1),
            next_seq: 0,
        }
    }

    /// Payload bytes per fragment.
    pub fn effective_mtu(&self) -> usize {
        self.mtu - HEADER_SIZE
    }

    /// Sequence number the next frame will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Number of fragments a payload of `len` bytes needs. An empty
    /// payload still travels as one fragment so the frame is seen.
    pub fn fragment_count(len: usize, effective_mtu: usize) -> usize {
        len.div_ceil(effective_mtu).max(1)
    }

    /// Split `packet` into fragments ready for the wire.
    pub fn packetize(&mut self, packet: &EncodedPacket) -> Result<Vec<Fragment>, MirrorError> {
        let chunk = self.effective_mtu();
        let len = packet.data.len();
        let count = Self::fragment_count(len, chunk);
        if count > u16::MAX as usize {
            return Err(MirrorError::PayloadTooLarge {
                size: len,
                max: u16::MAX as usize * chunk,
            });
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let mut header = FragmentHeader {
            stream_id: self.stream_id,
            frame_seq: seq,
            fragment_index: 0,
            fragment_count: count as u16,
            media: self.media,
            flags: FragmentFlags::keyframe(packet.keyframe),
            timestamp: packet.timestamp,
            checksum: checksum(&packet.data),
        };

        let fragments = (0..count)
            .map(|index| {
                let start = index * chunk;
                let end = (start + chunk).min(len);
                header.fragment_index = index as u16;
                Fragment {
                    header,
                    payload: packet.data.slice(start..end),
                }
            })
            .collect();

        Ok(fragments)
    }
}
