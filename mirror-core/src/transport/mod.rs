//! MTU-bounded frame transport.
//!
//! Encoded frames are split into datagrams that each carry a
//! [`FragmentHeader`] so the far end can reassemble them without any
//! ordering or delivery guarantee from the network. Delivery is
//! best-effort: there is no acknowledgement and no retransmission.
//!
//! | Module       | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `packetizer` | frame → fragments, per-stream sequence numbers   |
//! | `reassembly` | fragments → frames, freshness-first reordering   |
//! | `codec`      | datagram ↔ [`Fragment`] (`tokio_util` codec)     |
//! | `socket`     | datagram socket seam and the real UDP network    |

pub mod codec;
pub mod packetizer;
pub mod reassembly;
pub mod socket;

use bytes::Bytes;

use crate::header::{FragmentHeader, HEADER_SIZE};

pub use codec::FragmentCodec;
pub use packetizer::Packetizer;
pub use reassembly::{AssembledFrame, Outcome, Reassembler};
pub use socket::{DatagramSocket, Network, UdpNetwork};

/// One transport unit: a header plus a slice of an encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub header: FragmentHeader,
    pub payload: Bytes,
}

impl Fragment {
    /// Size of this fragment on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}
