//! Datagram codec for fragments.
//!
//! Each UDP datagram carries exactly one fragment, so the decoder
//! consumes the whole buffer it is given: it never waits for more
//! bytes the way a stream codec would.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MirrorError;
use crate::header::{FragmentHeader, HEADER_SIZE};
use crate::transport::Fragment;

pub struct FragmentCodec {
    mtu: usize,
}

impl FragmentCodec {
    /// `mtu` bounds the size of every encoded or accepted datagram.
    pub fn new(mtu: usize) -> Self {
        Self { mtu }
    }
}

impl Decoder for FragmentCodec {
    type Item = Fragment;
    type Error = MirrorError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let len = src.len();
        if len > self.mtu {
            src.clear();
            return Err(MirrorError::FragmentTooLarge {
                size: len,
                mtu: self.mtu,
            });
        }

        let header = match FragmentHeader::decode(&src[..]) {
            Ok(header) => header,
            Err(e) => {
                src.clear();
                return Err(e);
            }
        };

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len - HEADER_SIZE).freeze();
        Ok(Some(Fragment { header, payload }))
    }
}

impl Encoder<Fragment> for FragmentCodec {
    type Error = MirrorError;

    fn encode(&mut self, item: Fragment, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.wire_len();
        if size > self.mtu {
            return Err(MirrorError::FragmentTooLarge {
                size,
                mtu: self.mtu,
            });
        }

        dst.reserve(size);
        dst.extend_from_slice(&item.header.encode());
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FragmentFlags;
    use crate::header::MediaKind;
    use bytes::Bytes;

    fn fragment(len: usize) -> Fragment {
        Fragment {
            header: FragmentHeader {
                stream_id: 2,
                frame_seq: 5,
                fragment_index: 0,
                fragment_count: 1,
                media: MediaKind::Video,
                flags: FragmentFlags::KEYFRAME,
                timestamp: 1,
                checksum: 3,
            },
            payload: Bytes::from(vec![0x5A; len]),
        }
    }

    #[test]
    fn datagram_carries_one_fragment() {
        let mut codec = FragmentCodec::new(1400);
        let mut buf = BytesMut::new();
        codec.encode(fragment(100), &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 100);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, fragment(100));
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversized_fragment_refused() {
        let mut codec = FragmentCodec::new(HEADER_SIZE + 10);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(fragment(11), &mut buf),
            Err(MirrorError::FragmentTooLarge { .. })
        ));

        let mut big = BytesMut::from(&vec![0u8; HEADER_SIZE + 11][..]);
        assert!(codec.decode(&mut big).is_err());
        assert!(big.is_empty());
    }

    #[test]
    fn garbage_datagram_is_error() {
        let mut codec = FragmentCodec::new(1400);
        let mut buf = BytesMut::from(&b"not a fragment header at all, definitely"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(MirrorError::InvalidHeader(_))
        ));
    }
}
