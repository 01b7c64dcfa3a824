//! Reassembly buffer for received data.

use super::TcpSegment;
use super::seq::{seq_le, seq_lt};

/// Contiguous run of received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Region {
    begin: u32,
    data: Vec<u8>,
}

impl Region {
    fn end(&self) -> u32 {
        self.begin.wrapping_add(self.data.len() as u32)
    }
}

/// Receive queue that absorbs segments in any order and hands in-order data
/// to the application.
///
/// Regions are kept sorted, non-overlapping and non-adjacent (touching
/// regions are merged). Every region lies at or after the first sequence
/// number not yet extracted by the application.
#[derive(Debug, Default)]
pub struct ReceiveQueue {
    /// Sequence number of the next byte to hand to the application.
    start: u32,
    regions: Vec<Region>,
}

impl ReceiveQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the queue; `start_seq` is the first sequence number expected
    /// from the peer (IRS + 1).
    pub fn init(&mut self, start_seq: u32) {
        self.start = start_seq;
        self.regions.clear();
    }

    /// Sequence number of the next byte to hand to the application.
    pub fn first_seq(&self) -> u32 {
        self.start
    }

    /// Stores the payload of `segment` and returns the end of the contiguous
    /// prefix starting at the expected sequence number, which is the new
    /// `RCV.NXT` candidate.
    ///
    /// Bytes that were already extracted are dropped; duplicates and overlaps
    /// with buffered data are merged without altering bytes already stored.
    pub fn insert_bytes_from_segment(&mut self, segment: &TcpSegment) -> u32 {
        let mut seq = segment.seq().wrapping_add(segment.header.syn() as u32);
        let mut payload = &segment.payload[..];

        if seq_lt(seq, self.start) {
            let stale = self.start.wrapping_sub(seq) as usize;
            if stale >= payload.len() {
                return self.rcv_nxt();
            }
            payload = &payload[stale..];
            seq = self.start;
        }

        if !payload.is_empty() {
            self.merge(seq, payload);
        }

        self.rcv_nxt()
    }

    /// End of the in-order prefix: the next sequence number expected.
    pub fn rcv_nxt(&self) -> u32 {
        match self.regions.first() {
            Some(first) if first.begin == self.start => first.end(),
            _ => self.start,
        }
    }

    fn offset(&self, seq: u32) -> u64 {
        seq.wrapping_sub(self.start) as u64
    }

    fn merge(&mut self, seq: u32, payload: &[u8]) {
        let new_begin = self.offset(seq);
        let new_end = new_begin + payload.len() as u64;

        // Regions overlapping or touching the new bytes.
        let first = self
            .regions
            .iter()
            .position(|r| self.offset(r.end()) >= new_begin)
            .unwrap_or(self.regions.len());
        let last = self.regions[first..]
            .iter()
            .position(|r| self.offset(r.begin) > new_end)
            .map_or(self.regions.len(), |i| first + i);

        if first == last {
            self.regions.insert(
                first,
                Region {
                    begin: seq,
                    data: payload.to_vec(),
                },
            );
            return;
        }

        let merged_begin = u64::min(new_begin, self.offset(self.regions[first].begin));
        let merged_end = u64::max(new_end, self.offset(self.regions[last - 1].end()));

        let mut data = vec![0u8; (merged_end - merged_begin) as usize];
        let at = (new_begin - merged_begin) as usize;
        data[at..at + payload.len()].copy_from_slice(payload);

        for region in &self.regions[first..last] {
            let at = (self.offset(region.begin) - merged_begin) as usize;
            data[at..at + region.data.len()].copy_from_slice(&region.data);
        }

        let merged = Region {
            begin: self.start.wrapping_add(merged_begin as u32),
            data,
        };

        self.regions.splice(first..last, [merged]);
    }

    /// Number of in-order bytes ready for the application.
    pub fn bytes_available(&self) -> u32 {
        self.rcv_nxt().wrapping_sub(self.start)
    }

    /// Removes and returns in-order bytes up to (not including) `seq`.
    pub fn extract_bytes_up_to(&mut self, seq: u32) -> Vec<u8> {
        let limit = if seq_le(seq, self.rcv_nxt()) {
            seq
        } else {
            self.rcv_nxt()
        };

        let nbytes = limit.wrapping_sub(self.start) as usize;
        if nbytes == 0 || seq_lt(limit, self.start) {
            return Vec::new();
        }

        let first = &mut self.regions[0];
        let out: Vec<u8> = first.data.drain(..nbytes).collect();
        first.begin = first.begin.wrapping_add(nbytes as u32);

        if first.data.is_empty() {
            self.regions.remove(0);
        }

        self.start = limit;
        out
    }

    /// Total number of buffered bytes, in order or not.
    pub fn buffered_bytes(&self) -> u32 {
        self.regions.iter().map(|r| r.data.len() as u32).sum()
    }

    /// Free space left in a buffer of `max` bytes.
    pub fn free_bytes(&self, max: u32) -> u32 {
        max.saturating_sub(self.buffered_bytes())
    }

    /// Number of separate buffered regions.
    pub fn queue_length(&self) -> usize {
        self.regions.len()
    }

    /// Left edge of the buffered region containing `seq`, or `seq` itself.
    pub fn left_edge(&self, seq: u32) -> u32 {
        self.region_containing(seq).map_or(seq, |(begin, _)| begin)
    }

    /// Right edge of the buffered region containing `seq`, or `seq` itself.
    pub fn right_edge(&self, seq: u32) -> u32 {
        self.region_containing(seq).map_or(seq, |(_, end)| end)
    }

    fn region_containing(&self, seq: u32) -> Option<(u32, u32)> {
        self.regions
            .iter()
            .find(|r| seq_le(r.begin, seq) && seq_le(seq, r.end()))
            .map(|r| (r.begin, r.end()))
    }

    /// Buffered regions as `[begin, end)` pairs, in sequence order.
    pub fn regions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.regions.iter().map(|r| (r.begin, r.end()))
    }
}
