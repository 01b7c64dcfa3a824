//! Send buffer holding unacknowledged and not-yet-sent application data.

use std::collections::VecDeque;

use super::TcpSegment;
use super::headers::TcpHeader;
use super::seq::{seq_ge, seq_le, seq_lt, seq_max};
use crate::CommandError;

/// Largest amount of data that may be buffered at once. Keeping the buffered
/// range below half the sequence space keeps every buffered sequence number
/// comparable with every other.
pub const MAX_BUFFERED: u64 = (1 << 31) - 1;

/// Byte-stream send queue addressed by sequence number.
///
/// ```text
///      buffer_start_seq                         buffer_end_seq
///            |<------------- buffered ------------->|
///            |  sent, unacknowledged  |   unsent    |
/// ```
#[derive(Debug, Default)]
pub struct SendQueue {
    /// Sequence number of the first buffered byte.
    begin: u32,
    data: VecDeque<u8>,
}

impl SendQueue {
    /// Creates an empty queue whose first byte will receive sequence number 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the queue so the first enqueued byte receives `start_seq`.
    pub fn init(&mut self, start_seq: u32) {
        self.begin = start_seq;
        self.data.clear();
    }

    /// Appends application data to the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::SendQueueOverflow`] if the buffered range would
    /// grow beyond [`MAX_BUFFERED`] bytes.
    pub fn enqueue_app_data(&mut self, bytes: &[u8]) -> Result<(), CommandError> {
        let buffered = self.data.len() as u64;

        if buffered + bytes.len() as u64 > MAX_BUFFERED {
            return Err(CommandError::SendQueueOverflow {
                buffered,
                attempted: bytes.len(),
            });
        }

        self.data.extend(bytes);
        Ok(())
    }

    /// Sequence number of the first buffered byte.
    pub fn buffer_start_seq(&self) -> u32 {
        self.begin
    }

    /// Sequence number following the last buffered byte.
    pub fn buffer_end_seq(&self) -> u32 {
        self.begin.wrapping_add(self.data.len() as u32)
    }

    /// Total number of buffered bytes.
    pub fn buffered_bytes(&self) -> u32 {
        self.data.len() as u32
    }

    /// Number of buffered bytes at or after `from_seq`; zero once `from_seq`
    /// reaches the end of the buffer (a sent FIN occupies the sequence number
    /// just past it).
    pub fn bytes_available(&self, from_seq: u32) -> u32 {
        let end = self.buffer_end_seq();

        if seq_lt(from_seq, end) {
            end.wrapping_sub(seq_max(from_seq, self.begin))
        } else {
            0
        }
    }

    /// Creates a segment carrying up to `max_bytes` bytes starting at
    /// `from_seq`. Only the sequence number and payload are filled in.
    ///
    /// `from_seq` must lie within `[buffer_start_seq, buffer_end_seq]`.
    pub fn create_segment_with_bytes(&self, from_seq: u32, max_bytes: u32) -> TcpSegment {
        debug_assert!(
            seq_le(self.begin, from_seq) && seq_le(from_seq, self.buffer_end_seq()),
            "segment start {from_seq} outside send buffer [{}, {}]",
            self.begin,
            self.buffer_end_seq()
        );

        let offset = from_seq.wrapping_sub(self.begin) as usize;
        let nbytes = usize::min(max_bytes as usize, self.data.len().saturating_sub(offset));

        let payload: Vec<u8> = self.data.range(offset..offset + nbytes).copied().collect();

        TcpSegment {
            header: TcpHeader::new(0, 0, from_seq, 0),
            payload,
        }
    }

    /// Releases every byte before `seq`.
    ///
    /// `seq` must lie within `[buffer_start_seq, buffer_end_seq]`.
    pub fn discard_up_to(&mut self, seq: u32) {
        debug_assert!(
            seq_ge(seq, self.begin) && seq_le(seq, self.buffer_end_seq()),
            "discard point {seq} outside send buffer [{}, {}]",
            self.begin,
            self.buffer_end_seq()
        );

        let nbytes = usize::min(seq.wrapping_sub(self.begin) as usize, self.data.len());
        self.data.drain(..nbytes);
        self.begin = self.begin.wrapping_add(nbytes as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_queue_segments_and_discards() {
        let mut q = SendQueue::new();
        q.init(1001);
        q.enqueue_app_data(&[7u8; 1000]).unwrap();

        assert_eq!(q.buffer_start_seq(), 1001);
        assert_eq!(q.buffer_end_seq(), 2001);

        let first = q.create_segment_with_bytes(1001, 500);
        let second = q.create_segment_with_bytes(1501, 800);

        assert_eq!(first.seq(), 1001);
        assert_eq!(first.payload_len(), 500);
        assert_eq!(second.seq(), 1501);
        assert_eq!(second.payload_len(), 500);

        q.discard_up_to(2001);
        assert_eq!(q.buffered_bytes(), 0);
        assert_eq!(q.buffer_start_seq(), 2001);
    }

    #[test]
    fn send_queue_preserves_byte_order_across_wrap() {
        let mut q = SendQueue::new();
        q.init(u32::MAX - 2);
        q.enqueue_app_data(b"abcdef").unwrap();

        assert_eq!(q.buffer_end_seq(), 3);

        let seg = q.create_segment_with_bytes(u32::MAX, 10);
        assert_eq!(seg.payload, b"cdef");

        q.discard_up_to(1);
        assert_eq!(q.buffer_start_seq(), 1);
        assert_eq!(q.create_segment_with_bytes(1, 10).payload, b"ef");
    }

    #[test]
    fn send_queue_full_range_reconstructs_data() {
        let data: Vec<u8> = (0..=255u8).cycle().take(3000).collect();

        let mut q = SendQueue::new();
        q.init(42);
        q.enqueue_app_data(&data[..1200]).unwrap();
        q.enqueue_app_data(&data[1200..]).unwrap();

        let mut rebuilt = Vec::new();
        let mut seq = q.buffer_start_seq();
        while seq != q.buffer_end_seq() {
            let seg = q.create_segment_with_bytes(seq, 536);
            seq = seq.wrapping_add(seg.payload_len());
            rebuilt.extend(seg.payload);
        }

        assert_eq!(rebuilt, data);

        q.discard_up_to(q.buffer_end_seq());
        assert_eq!(q.buffered_bytes(), 0);
    }

    #[test]
    fn send_queue_segment_at_end_is_empty() {
        let mut q = SendQueue::new();
        q.init(10);
        q.enqueue_app_data(b"xy").unwrap();

        assert_eq!(q.create_segment_with_bytes(12, 100).payload_len(), 0);
        assert_eq!(q.bytes_available(11), 1);
        assert_eq!(q.bytes_available(12), 0);
        assert_eq!(q.bytes_available(13), 0);
    }
}
