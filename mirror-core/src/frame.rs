//! Raw media frames exchanged with capture backends and frame sinks.
//!
//! Video is always NV12; audio is always interleaved signed 16-bit PCM.
//! These are the decoded-domain types; encoded bitstreams travel as
//! [`EncodedPacket`](crate::media::EncodedPacket).

use crate::error::MirrorError;

// ── VideoFrame ───────────────────────────────────────────────────

/// A raw NV12 image.
///
/// `data` holds the full-resolution Y plane (`width * height` bytes)
/// followed by the interleaved half-resolution CbCr plane. Odd
/// dimensions are rounded up for the chroma plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Capture timestamp in milliseconds.
    pub timestamp: u64,
}

impl VideoFrame {
    /// Build a frame, checking that `data` has the exact NV12 size.
    pub fn new(width: u32, height: u32, data: Vec<u8>, timestamp: u64) -> Result<Self, MirrorError> {
        let expected = Self::nv12_len(width, height);
        if data.len() != expected {
            return Err(MirrorError::Other(format!(
                "nv12 frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            timestamp,
        })
    }

    /// Byte size of an NV12 image with the given dimensions.
    pub fn nv12_len(width: u32, height: u32) -> usize {
        let w = width as usize;
        let h = height as usize;
        w * h + w.div_ceil(2) * 2 * h.div_ceil(2)
    }

    /// Row pitch of the Y plane in bytes.
    pub fn y_stride(&self) -> usize {
        self.width as usize
    }

    /// Row pitch of the CbCr plane in bytes.
    pub fn uv_stride(&self) -> usize {
        (self.width as usize).div_ceil(2) * 2
    }

    fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// `None` if `data` is shorter than the Y plane.
    pub fn y_plane(&self) -> Option<&[u8]> {
        self.data.get(..self.luma_len())
    }

    /// `None` if `data` does not hold a whole NV12 image.
    pub fn uv_plane(&self) -> Option<&[u8]> {
        if self.data.len() != Self::nv12_len(self.width, self.height) {
            return None;
        }
        self.data.get(self.luma_len()..)
    }
}

// ── AudioFrame ───────────────────────────────────────────────────

/// A block of interleaved PCM samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u8,
    pub samples: Vec<i16>,
    /// Capture timestamp in milliseconds.
    pub timestamp: u64,
}

impl AudioFrame {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}
