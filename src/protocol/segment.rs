//! Construction and serialization of TCP segments.

use std::fmt;
use std::io::Write;

use crate::Result;
use crate::protocol::headers::TcpHeader;

/// TCP segment: header plus payload.
///
/// Addressing is carried outside the segment (see [`crate::Host::send_segment`]
/// and [`crate::ConnectionManager::process_segment`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpSegment {
    /// TCP header of the segment.
    pub header: TcpHeader,
    /// Payload of the segment.
    pub payload: Vec<u8>,
}

impl TcpSegment {
    /// Create a new TCP segment given the TCP header and payload.
    pub fn new(header: TcpHeader, payload: &[u8]) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Sequence number of the segment.
    pub fn seq(&self) -> u32 {
        self.header.seq_number()
    }

    /// Acknowledgment number of the segment.
    pub fn ack(&self) -> u32 {
        self.header.ack_number()
    }

    /// Number of payload bytes.
    pub fn payload_len(&self) -> u32 {
        self.payload.len() as u32
    }

    /// Sequence space occupied by the segment: payload plus one for each of
    /// SYN and FIN.
    pub fn seg_len(&self) -> u32 {
        self.payload_len() + self.header.syn() as u32 + self.header.fin() as u32
    }

    /// Returns the memory representation of the TCP segment as a vector of
    /// bytes in big-endian (network) byte order, with the checksum computed
    /// for the given addresses.
    pub fn to_be_bytes(mut self, src: [u8; 4], dst: [u8; 4]) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.header.header_len() + self.payload.len());

        self.header.set_checksum(src, dst, &self.payload);
        self.header.write(&mut buf)?;
        buf.write_all(&self.payload)?;

        Ok(buf)
    }

    /// Parses a segment from raw bytes (TCP header followed by payload).
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let header = TcpHeader::try_from(raw)?;
        let payload = raw[header.header_len()..].to_vec();

        Ok(Self { header, payload })
    }
}

impl fmt::Display for TcpSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        let flags = [
            (h.syn(), "SYN"),
            (h.fin(), "FIN"),
            (h.rst(), "RST"),
            (h.psh(), "PSH"),
            (h.ack(), "ACK"),
        ];

        write!(f, "[")?;
        let mut first = true;
        for (_, name) in flags.iter().filter(|(set, _)| *set) {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        write!(f, "] seq={}", h.seq_number())?;

        if h.ack() {
            write!(f, " ack={}", h.ack_number())?;
        }

        write!(f, " win={} len={}", h.window(), self.payload_len())?;

        let blocks = h.sack_blocks();
        if !blocks.is_empty() {
            write!(f, " sack=")?;
            for b in blocks {
                write!(f, "[{},{})", b.start, b.end)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headers::TcpOption;

    #[test]
    fn segment_len_counts_syn_and_fin() {
        let mut header = TcpHeader::new(1, 2, 100, 1000);
        header.set_syn();
        header.set_fin();

        let seg = TcpSegment::new(header, b"abc");
        assert_eq!(seg.payload_len(), 3);
        assert_eq!(seg.seg_len(), 5);
    }

    #[test]
    fn segment_wire_round_trip() {
        let mut header = TcpHeader::new(4000, 80, 7, 1024);
        header.set_ack();
        header.set_ack_number(99);
        header
            .push_option(TcpOption::Timestamp {
                value: 5,
                echo_reply: 6,
            })
            .unwrap();

        let seg = TcpSegment::new(header, b"payload");
        let bytes = seg.clone().to_be_bytes([1, 2, 3, 4], [5, 6, 7, 8]).unwrap();

        let parsed = TcpSegment::parse(&bytes).unwrap();
        assert_eq!(parsed.payload, b"payload");
        assert_eq!(parsed.seq(), 7);
        assert_eq!(parsed.ack(), 99);
        assert_eq!(parsed.header.timestamp(), Some((5, 6)));
        assert!(
            parsed
                .header
                .is_valid_checksum([1, 2, 3, 4], [5, 6, 7, 8], &parsed.payload)
        );
    }
}
