//! Scoreboard of in-flight data for SACK-enabled connections (RFC 2018,
//! RFC 3517).
//!
//! The queue mirrors the sequence range `[begin, end)` of data that has been
//! sent but not yet cumulatively acknowledged, partitioned into regions that
//! each carry a `sacked` and a `rexmitted` bit.

use super::seq::{seq_ge, seq_gt, seq_le, seq_lt, seq_max, seq_min};

/// A byte range of the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SackRegion {
    /// First sequence number of the region.
    pub begin: u32,
    /// Sequence number following the region.
    pub end: u32,
    /// Peer reported the range in a SACK block.
    pub sacked: bool,
    /// Range was retransmitted since it was last reset.
    pub rexmitted: bool,
}

impl SackRegion {
    fn len(&self) -> u32 {
        self.end.wrapping_sub(self.begin)
    }
}

/// Per-byte-range sacked/retransmitted bookkeeping.
///
/// Regions are sorted, contiguous, non-overlapping and together span exactly
/// `[begin, end)`; every mutating operation re-establishes this before
/// returning.
#[derive(Debug, Default)]
pub struct SackRetransmitQueue {
    begin: u32,
    end: u32,
    regions: Vec<SackRegion>,
}

impl SackRetransmitQueue {
    /// Creates an empty scoreboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the scoreboard to the empty range starting at `seq`.
    pub fn init(&mut self, seq: u32) {
        self.begin = seq;
        self.end = seq;
        self.regions.clear();
    }

    /// First sequence number tracked.
    pub fn begin(&self) -> u32 {
        self.begin
    }

    /// Sequence number following the last tracked byte.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Tracked regions in sequence order.
    pub fn regions(&self) -> &[SackRegion] {
        &self.regions
    }

    /// Returns `true` if no data is tracked.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Drops every region fully below `seq`, trimming a region that
    /// straddles it.
    pub fn discard_up_to(&mut self, seq: u32) {
        if self.regions.is_empty() {
            self.begin = seq;
            self.end = seq;
            return;
        }

        debug_assert!(
            seq_le(self.begin, seq) && seq_le(seq, self.end),
            "discard point {seq} outside scoreboard [{}, {}]",
            self.begin,
            self.end
        );

        let seq = seq_min(seq_max(seq, self.begin), self.end);

        self.regions.retain(|r| seq_gt(r.end, seq));
        if let Some(first) = self.regions.first_mut() {
            if seq_lt(first.begin, seq) {
                first.begin = seq;
            }
        }

        self.begin = seq;
        self.check_invariants();
    }

    /// Records that `[from, to)` was transmitted.
    ///
    /// A range starting at the current end extends the scoreboard. A range
    /// that overlaps tracked data is a retransmission and marks the covered
    /// regions `rexmitted`; any part past the current end is appended as new,
    /// also marked `rexmitted`.
    pub fn enqueue_sent_data(&mut self, from: u32, to: u32) {
        if !seq_lt(from, to) {
            return;
        }

        if self.regions.is_empty() && from != self.end {
            // Data was acknowledged (or the queue was reinitialized) past the
            // previous end; restart tracking at `from`.
            self.begin = from;
            self.end = from;
        }

        if from == self.end {
            self.regions.push(SackRegion {
                begin: from,
                end: to,
                sacked: false,
                rexmitted: false,
            });
            self.end = to;
            self.check_invariants();
            return;
        }

        let from = seq_max(from, self.begin);
        let covered_end = seq_min(to, self.end);

        if seq_lt(from, covered_end) {
            self.split_at(from);
            self.split_at(covered_end);

            for r in self
                .regions
                .iter_mut()
                .filter(|r| seq_ge(r.begin, from) && seq_le(r.end, covered_end))
            {
                r.rexmitted = true;
            }
        }

        if seq_gt(to, self.end) {
            self.regions.push(SackRegion {
                begin: self.end,
                end: to,
                sacked: false,
                rexmitted: true,
            });
            self.end = to;
        }

        self.check_invariants();
    }

    /// Marks `[from, to)` as sacked, clipped to the tracked range.
    pub fn set_sacked_bit(&mut self, from: u32, to: u32) {
        let from = seq_max(from, self.begin);
        let to = seq_min(to, self.end);

        if !seq_lt(from, to) {
            return;
        }

        self.split_at(from);
        self.split_at(to);

        for r in self
            .regions
            .iter_mut()
            .filter(|r| seq_ge(r.begin, from) && seq_le(r.end, to))
        {
            r.sacked = true;
        }

        self.merge_neighbours();
        self.check_invariants();
    }

    /// Clears every `sacked` bit (after a retransmission timeout the peer's
    /// reports may be reneged).
    pub fn reset_sacked_bits(&mut self) {
        for r in &mut self.regions {
            r.sacked = false;
        }
        self.merge_neighbours();
    }

    /// Clears every `rexmitted` bit.
    pub fn reset_rexmitted_bits(&mut self) {
        for r in &mut self.regions {
            r.rexmitted = false;
        }
        self.merge_neighbours();
    }

    /// Returns `true` if the byte at `seq` is sacked.
    pub fn is_sacked(&self, seq: u32) -> bool {
        self.region_at(seq).is_some_and(|r| r.sacked)
    }

    /// Returns `true` if the byte at `seq` was retransmitted.
    pub fn is_rexmitted(&self, seq: u32) -> bool {
        self.region_at(seq).is_some_and(|r| r.rexmitted)
    }

    /// End of the highest sacked region, if any.
    pub fn highest_sacked_seq(&self) -> Option<u32> {
        self.regions.iter().rev().find(|r| r.sacked).map(|r| r.end)
    }

    /// End of the highest retransmitted region, if any.
    pub fn highest_rexmitted_seq(&self) -> Option<u32> {
        self.regions.iter().rev().find(|r| r.rexmitted).map(|r| r.end)
    }

    /// Total number of sacked bytes.
    pub fn total_sacked_bytes(&self) -> u32 {
        self.regions
            .iter()
            .filter(|r| r.sacked)
            .map(SackRegion::len)
            .sum()
    }

    /// Number of sacked bytes at or after `from_seq`.
    pub fn sacked_bytes_from(&self, from_seq: u32) -> u32 {
        self.regions
            .iter()
            .filter(|r| r.sacked && seq_gt(r.end, from_seq))
            .map(|r| r.end.wrapping_sub(seq_max(r.begin, from_seq)))
            .sum()
    }

    /// Number of separate sacked runs at or after `from_seq`.
    pub fn num_discontiguous_sacks(&self, from_seq: u32) -> u32 {
        let mut count = 0;
        let mut in_run = false;

        for r in self.regions.iter().filter(|r| seq_gt(r.end, from_seq)) {
            if r.sacked && !in_run {
                count += 1;
            }
            in_run = r.sacked;
        }

        count
    }

    /// Number of contiguous bytes starting at `from_seq` that are already
    /// sacked or retransmitted, which a sender may skip.
    pub fn check_for_sacked_or_rexmitted(&self, from_seq: u32) -> u32 {
        let Some(start) = self
            .regions
            .iter()
            .position(|r| seq_le(r.begin, from_seq) && seq_lt(from_seq, r.end))
        else {
            return 0;
        };

        self.regions[start..]
            .iter()
            .take_while(|r| r.sacked || r.rexmitted)
            .map(|r| r.end.wrapping_sub(seq_max(r.begin, from_seq)))
            .sum()
    }

    fn region_at(&self, seq: u32) -> Option<&SackRegion> {
        self.regions
            .iter()
            .find(|r| seq_le(r.begin, seq) && seq_lt(seq, r.end))
    }

    /// Splits the region containing `seq` so a boundary falls at `seq`.
    fn split_at(&mut self, seq: u32) {
        let Some(i) = self
            .regions
            .iter()
            .position(|r| seq_lt(r.begin, seq) && seq_lt(seq, r.end))
        else {
            return;
        };

        let mut tail = self.regions[i];
        tail.begin = seq;
        self.regions[i].end = seq;
        self.regions.insert(i + 1, tail);
    }

    /// Merges adjacent regions carrying identical bits.
    fn merge_neighbours(&mut self) {
        let mut merged: Vec<SackRegion> = Vec::with_capacity(self.regions.len());

        for r in self.regions.drain(..) {
            match merged.last_mut() {
                Some(last)
                    if last.end == r.begin
                        && last.sacked == r.sacked
                        && last.rexmitted == r.rexmitted =>
                {
                    last.end = r.end;
                }
                _ => merged.push(r),
            }
        }

        self.regions = merged;
    }

    /// Panics (in debug builds) if the regions do not partition
    /// `[begin, end)`.
    pub fn check_invariants(&self) {
        if cfg!(debug_assertions) {
            assert!(self.regions_are_contiguous(), "SACK scoreboard corrupted: {self:?}");
        }
    }

    /// Returns `true` if the regions are sorted, contiguous, non-empty and span
    /// exactly `[begin, end)`.
    pub fn regions_are_contiguous(&self) -> bool {
        let mut expected = self.begin;

        for r in &self.regions {
            if r.begin != expected || !seq_lt(r.begin, r.end) {
                return false;
            }
            expected = r.end;
        }

        expected == self.end
    }
}
