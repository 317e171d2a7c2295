//! Per-stream frame reassembly.
//!
//! Fragments are buffered by `frame_seq` until every piece of a frame
//! has arrived. Freshness wins over completeness: once a frame
//! completes, every older partial is abandoned and later fragments for
//! frames that are not newer are discarded.
//!
//! Sequence numbers compare with serial-number arithmetic, so the
//! counter may wrap around `u32::MAX`. A jump backwards by more than
//! the reorder window means the sender restarted its sequence; the
//! reassembler forgets its history and flags the next completed frame
//! as [`restarted`](AssembledFrame::restarted).

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use crate::flags::FragmentFlags;
use crate::header::{MediaKind, checksum};
use crate::transport::Fragment;

/// Partial frames held per stream unless configured otherwise.
pub const DEFAULT_REORDER_WINDOW: usize = 16;

/// `a` is strictly newer than `b`.
pub fn seq_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// A complete, checksum-verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFrame {
    pub frame_seq: u32,
    pub media: MediaKind,
    pub keyframe: bool,
    pub timestamp: u64,
    pub data: Bytes,
    /// Frames skipped between the previous completed frame and this one.
    pub lost_before: u32,
    /// First frame after the sender restarted its sequence.
    pub restarted: bool,
}

/// What happened to a fragment fed into the [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Buffered; the frame is still incomplete.
    Pending,
    /// The fragment completed a frame.
    Complete(AssembledFrame),
    /// All fragments arrived but the checksum did not match.
    Corrupt { frame_seq: u32, lost_before: u32 },
    /// The frame is not newer than the last completed one.
    Stale,
    /// The fragment was already buffered.
    Duplicate,
    /// The fragment disagrees with earlier fragments of its frame.
    Inconsistent,
}

struct Partial {
    count: u16,
    received: u16,
    slots: Vec<Option<Bytes>>,
    media: MediaKind,
    flags: FragmentFlags,
    timestamp: u64,
    checksum: u32,
}

impl Partial {
    fn new(fragment: &Fragment) -> Self {
        let header = &fragment.header;
        Self {
            count: header.fragment_count,
            received: 0,
            slots: vec![None; header.fragment_count as usize],
            media: header.media,
            flags: header.flags,
            timestamp: header.timestamp,
            checksum: header.checksum,
        }
    }

    fn matches(&self, fragment: &Fragment) -> bool {
        let header = &fragment.header;
        header.fragment_count == self.count
            && header.media == self.media
            && header.checksum == self.checksum
    }

    fn join(self) -> Bytes {
        let len = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(len);
        for slot in self.slots.into_iter().flatten() {
            data.extend_from_slice(&slot);
        }
        data.freeze()
    }
}

// ── Reassembler ──────────────────────────────────────────────────

pub struct Reassembler {
    window: usize,
    partials: HashMap<u32, Partial>,
    /// Newest completed (or corrupt) sequence number.
    newest: Option<u32>,
    /// A sequence restart has not been reported yet.
    restarted: bool,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REORDER_WINDOW)
    }
}

impl Reassembler {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            partials: HashMap::new(),
            newest: None,
            restarted: false,
        }
    }

    /// Partial frames currently buffered.
    pub fn pending(&self) -> usize {
        self.partials.len()
    }

    /// Feed one fragment.
    pub fn push(&mut self, fragment: Fragment) -> Outcome {
        let seq = fragment.header.frame_seq;
        if let Some(newest) = self.newest {
            if newest.wrapping_sub(seq) as usize > self.window && !seq_newer(seq, newest) {
                self.restart();
            } else if !seq_newer(seq, newest) {
                return Outcome::Stale;
            }
        }

        if !self.partials.contains_key(&seq) {
            self.make_room();
        }
        let partial = self
            .partials
            .entry(seq)
            .or_insert_with(|| Partial::new(&fragment));

        if !partial.matches(&fragment) {
            return Outcome::Inconsistent;
        }

        let index = fragment.header.fragment_index as usize;
        let Some(slot) = partial.slots.get_mut(index) else {
            return Outcome::Inconsistent;
        };
        if slot.is_some() {
            return Outcome::Duplicate;
        }
        *slot = Some(fragment.payload);
        partial.received += 1;

        if partial.received < partial.count {
            return Outcome::Pending;
        }

        match self.partials.remove(&seq) {
            Some(partial) => self.complete(seq, partial),
            None => Outcome::Pending,
        }
    }

    fn restart(&mut self) {
        self.partials.clear();
        self.newest = None;
        self.restarted = true;
    }

    fn complete(&mut self, seq: u32, partial: Partial) -> Outcome {
        let lost_before = match self.newest {
            Some(newest) => seq.wrapping_sub(newest).wrapping_sub(1),
            None => 0,
        };
        self.newest = Some(seq);
        self.partials.retain(|&pending, _| seq_newer(pending, seq));

        let expected = partial.checksum;
        let media = partial.media;
        let keyframe = partial.flags.is_keyframe();
        let timestamp = partial.timestamp;
        let data = partial.join();

        if checksum(&data) != expected {
            return Outcome::Corrupt {
                frame_seq: seq,
                lost_before,
            };
        }

        Outcome::Complete(AssembledFrame {
            frame_seq: seq,
            media,
            keyframe,
            timestamp,
            data,
            lost_before,
            restarted: std::mem::take(&mut self.restarted),
        })
    }

    /// Evict the oldest partial if the window is full.
    fn make_room(&mut self) {
        if self.partials.len() < self.window {
            return;
        }
        let oldest = self
            .partials
            .keys()
            .copied()
            .reduce(|a, b| if seq_newer(a, b) { b } else { a });
        if let Some(oldest) = oldest {
            self.partials.remove(&oldest);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::EncodedPacket;
    use crate::transport::Packetizer;

    fn frames(p: &mut Packetizer, len: usize, fill: u8) -> (Vec<Fragment>, Bytes) {
        let data = Bytes::from(vec![fill; len]);
        let packet = EncodedPacket {
            data: data.clone(),
            keyframe: fill % 2 == 0,
            timestamp: fill as u64,
        };
        (p.packetize(&packet).unwrap(), data)
    }

    fn expect_complete(outcome: Outcome) -> AssembledFrame {
        match outcome {
            Outcome::Complete(frame) => frame,
            other => panic!("expected complete frame, got {other:?}"),
        }
    }

    #[test]
    fn out_of_order_fragments_reassemble() {
        let mut p = Packetizer::new(1, MediaKind::Video, 1400);
        let (mut frags, data) = frames(&mut p, 5000, 4);
        frags.reverse();
        frags.swap(0, 2);

        let mut r = Reassembler::default();
        let last = frags.pop().unwrap();
        for f in frags {
            assert_eq!(r.push(f), Outcome::Pending);
        }
        let frame = expect_complete(r.push(last));
        assert_eq!(frame.data, data);
        assert!(frame.keyframe);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn newer_complete_frame_supersedes_partial() {
        let mut p = Packetizer::new(1, MediaKind::Video, 128);
        for _ in 0..10 {
            frames(&mut p, 1, 0);
        }
        // frame_seq 10 and 11, four fragments each.
        let (ten, _) = frames(&mut p, 400, 1);
        let (eleven, data) = frames(&mut p, 400, 2);
        assert_eq!(ten[0].header.frame_seq, 10);
        assert_eq!(ten.len(), 4);

        let mut r = Reassembler::default();
        for (i, f) in ten.iter().enumerate() {
            if i != 2 {
                assert_eq!(r.push(f.clone()), Outcome::Pending);
            }
        }
        let mut delivered = None;
        for f in eleven {
            if let Outcome::Complete(frame) = r.push(f) {
                delivered = Some(frame);
            }
        }
        let frame = delivered.unwrap();
        assert_eq!(frame.frame_seq, 11);
        assert_eq!(frame.data, data);
        assert_eq!(r.pending(), 0);

        // The missing piece of frame 10 turns up late.
        assert_eq!(r.push(ten[2].clone()), Outcome::Stale);
    }

    #[test]
    fn gap_reports_lost_frames() {
        let mut p = Packetizer::new(1, MediaKind::Audio, 100);
        let mut r = Reassembler::default();
        let (a, _) = frames(&mut p, 10, 0);
        frames(&mut p, 10, 0);
        frames(&mut p, 10, 0);
        let (d, _) = frames(&mut p, 10, 0);

        assert_eq!(expect_complete(r.push(a[0].clone())).lost_before, 0);
        assert_eq!(expect_complete(r.push(d[0].clone())).lost_before, 2);
    }

    #[test]
    fn duplicates_ignored() {
        let mut p = Packetizer::new(1, MediaKind::Video, 100);
        let (frags, _) = frames(&mut p, 140, 0);
        let mut r = Reassembler::default();
        assert_eq!(r.push(frags[0].clone()), Outcome::Pending);
        assert_eq!(r.push(frags[0].clone()), Outcome::Duplicate);
        assert!(matches!(r.push(frags[1].clone()), Outcome::Complete(_)));
        assert_eq!(r.push(frags[1].clone()), Outcome::Stale);
    }

    #[test]
    fn corrupt_payload_detected() {
        let mut p = Packetizer::new(1, MediaKind::Video, 100);
        let (mut frags, _) = frames(&mut p, 140, 0);
        let mut bad = frags[1].payload.to_vec();
        bad[0] ^= 0xFF;
        frags[1].payload = Bytes::from(bad);

        let mut r = Reassembler::default();
        r.push(frags[0].clone());
        assert_eq!(
            r.push(frags[1].clone()),
            Outcome::Corrupt {
                frame_seq: 0,
                lost_before: 0
            }
        );
    }

    #[test]
    fn inconsistent_count_rejected() {
        let mut p = Packetizer::new(1, MediaKind::Video, 100);
        let (frags, _) = frames(&mut p, 140, 0);
        let mut r = Reassembler::default();
        r.push(frags[0].clone());

        let mut odd = frags[1].clone();
        odd.header.fragment_count = 3;
        assert_eq!(r.push(odd), Outcome::Inconsistent);
    }

    #[test]
    fn window_evicts_oldest_partial() {
        let mut p = Packetizer::new(1, MediaKind::Video, 100);
        let mut r = Reassembler::new(2);
        let (a, _) = frames(&mut p, 140, 0);
        let (b, _) = frames(&mut p, 140, 0);
        let (c, _) = frames(&mut p, 140, 0);

        r.push(a[0].clone());
        r.push(b[0].clone());
        r.push(c[0].clone());
        assert_eq!(r.pending(), 2);

        // Frame 0 was evicted and starts over; frame 1 still completes.
        assert!(matches!(r.push(b[1].clone()), Outcome::Complete(_)));
        assert_eq!(r.push(a[1].clone()), Outcome::Stale);
    }

    #[test]
    fn recreated_sender_restarts_the_sequence() {
        let mut r = Reassembler::default();
        let mut old = Packetizer::new(1, MediaKind::Video, 1400);
        let mut completed = 0;
        for _ in 0..1000 {
            let (frags, _) = frames(&mut old, 10, 1);
            if matches!(r.push(frags[0].clone()), Outcome::Complete(_)) {
                completed += 1;
            }
        }
        assert_eq!(completed, 1000);

        let mut fresh = Packetizer::new(1, MediaKind::Video, 1400);
        let (first, data) = frames(&mut fresh, 10, 2);
        let frame = expect_complete(r.push(first[0].clone()));
        assert_eq!(frame.frame_seq, 0);
        assert_eq!(frame.data, data);
        assert!(frame.restarted);
        assert_eq!(frame.lost_before, 0);

        let mut delivered = 0;
        for _ in 1..999 {
            let (frags, _) = frames(&mut fresh, 10, 1);
            match r.push(frags[0].clone()) {
                Outcome::Complete(frame) => {
                    assert!(!frame.restarted);
                    delivered += 1;
                }
                other => panic!("frame of restarted stream not delivered: {other:?}"),
            }
        }
        assert_eq!(delivered, 998);
    }

    #[test]
    fn late_fragment_within_window_stays_stale() {
        let mut p = Packetizer::new(1, MediaKind::Video, 100);
        let mut r = Reassembler::new(4);
        let (early, _) = frames(&mut p, 10, 0);
        for _ in 0..4 {
            let (frags, _) = frames(&mut p, 10, 0);
            assert!(matches!(r.push(frags[0].clone()), Outcome::Complete(_)));
        }
        // Four frames behind the newest: reordering, not a restart.
        assert_eq!(r.push(early[0].clone()), Outcome::Stale);
    }

    #[test]
    fn serial_arithmetic_wraps() {
        assert!(seq_newer(0, u32::MAX));
        assert!(seq_newer(5, 2));
        assert!(!seq_newer(2, 5));
        assert!(!seq_newer(7, 7));
    }
}
