use std::io;

use bitflags::bitflags;

use crate::{Error, HeaderError, ParseError};

/// IANA protocol number for TCP, used in the checksum pseudo header.
const PROTOCOL_TCP: u8 = 6;

bitflags! {
    /// Control bits of a TCP header (RFC 793 3.1).
    ///
    /// ```text
    ///    URG:  Urgent Pointer field significant
    ///    ACK:  Acknowledgment field significant
    ///    PSH:  Push Function
    ///    RST:  Reset the connection
    ///    SYN:  Synchronize sequence numbers
    ///    FIN:  No more data from sender
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Control: u8 {
        /// No more data from sender.
        const FIN = 0b0000_0001;
        /// Synchronize sequence numbers.
        const SYN = 0b0000_0010;
        /// Reset the connection.
        const RST = 0b0000_0100;
        /// Push function.
        const PSH = 0b0000_1000;
        /// Acknowledgment field significant.
        const ACK = 0b0001_0000;
        /// Urgent pointer field significant.
        const URG = 0b0010_0000;
    }
}

/// TCP Segment Header.
///
/// RFC 793 (3.1)
///
/// ```text
///   0                   1                   2                   3
///     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |          Source Port          |       Destination Port        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                        Sequence Number                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                    Acknowledgment Number                      |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |  Data |           |U|A|P|R|S|F|                               |
///    | Offset| Reserved  |R|C|S|S|Y|I|            Window             |
///    |       |           |G|K|H|T|N|N|                               |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |           Checksum            |         Urgent Pointer        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                    Options                    |    Padding    |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Options are held as an ordered list and encoded back in the same order,
/// padded with End-of-Option-List bytes to a 32-bit boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpHeader {
    /// The source port number.
    src_port: u16,
    /// The destination port number.
    dst_port: u16,
    /// The sequence number of the first data octet in this segment
    /// (except when SYN is present). If SYN is present the sequence number is
    /// the initial sequence number (ISN) and the first data octet is ISN+1.
    seq_number: u32,
    /// If the ACK control bit is set this field contains the value of the next
    /// sequence number the sender of the segment is expecting to receive.
    ack_number: u32,
    /// URG, ACK, PSH, RST, SYN and FIN.
    control: Control,
    /// The number of data octets beginning with the one indicated in the
    /// acknowledgment field which the sender of this segment is willing to
    /// accept (before window scaling is applied).
    window: u16,
    /// One's complement checksum over the pseudo header, header and payload.
    checksum: u16,
    /// Positive offset from the sequence number of the urgent data.
    urgent_pointer: u16,
    /// Options in wire order.
    options: Vec<TcpOption>,
}

impl TcpHeader {
    /// Minimum length of a TCP header in bytes.
    pub const MIN_HEADER_LEN: u16 = 20;

    /// Maximum length of a TCP header in bytes (data offset of 15).
    pub const MAX_HEADER_LEN: u16 = 60;

    /// Minimum data offset of a TCP header.
    pub const MIN_DATA_OFFSET: u16 = 5;

    /// Maximum data offset of a TCP header.
    pub const MAX_DATA_OFFSET: u16 = 15;

    /// Maximum length of TCP options in bytes.
    pub const MAX_OPTIONS_LEN: usize = 40;

    /// Creates a new TCP header with the specified source and destination
    /// ports, sequence number, and window size, while setting default values
    /// for other fields.
    pub fn new(src_port: u16, dst_port: u16, seq_number: u32, window: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq_number,
            window,
            ..Default::default()
        }
    }

    /// Returns the `source port` field of the TCP header.
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    /// Returns the `destination port` field of the TCP header.
    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    /// Returns the `sequence number` field of the TCP header.
    pub fn seq_number(&self) -> u32 {
        self.seq_number
    }

    /// Sets the `sequence number` field of the TCP header.
    pub fn set_seq_number(&mut self, seq: u32) {
        self.seq_number = seq;
    }

    /// Returns the `acknowledgment number` field of the TCP header.
    pub fn ack_number(&self) -> u32 {
        self.ack_number
    }

    /// Sets the `acknowledgment number` field of the TCP header with the
    /// provided value.
    pub fn set_ack_number(&mut self, ack: u32) {
        self.ack_number = ack;
    }

    /// Returns the `data offset` field of the TCP header.
    pub fn data_offset(&self) -> u8 {
        (self.header_len() >> 2) as u8
    }

    /// Returns all control bits.
    pub fn control(&self) -> Control {
        self.control
    }

    /// Sets the given control bits, keeping those already set.
    pub fn set_control(&mut self, bits: Control) {
        self.control |= bits;
    }

    /// Returns `true` if the URG (Urgent) control bit is set.
    pub fn urg(&self) -> bool {
        self.control.contains(Control::URG)
    }

    /// Returns `true` if the ACK (Acknowledgment) control bit is set.
    pub fn ack(&self) -> bool {
        self.control.contains(Control::ACK)
    }

    /// Sets the ACK (Acknowledgment) control bit.
    pub fn set_ack(&mut self) {
        self.control |= Control::ACK;
    }

    /// Returns `true` if the PSH (Push) control bit is set.
    pub fn psh(&self) -> bool {
        self.control.contains(Control::PSH)
    }

    /// Returns `true` if the RST (Reset) control bit is set.
    pub fn rst(&self) -> bool {
        self.control.contains(Control::RST)
    }

    /// Sets the RST (Reset) control bit.
    pub fn set_rst(&mut self) {
        self.control |= Control::RST;
    }

    /// Returns `true` if the SYN (Synchronize) control bit is set.
    pub fn syn(&self) -> bool {
        self.control.contains(Control::SYN)
    }

    /// Sets the SYN (Synchronize) control bit.
    pub fn set_syn(&mut self) {
        self.control |= Control::SYN;
    }

    /// Returns `true` if the FIN (Finish) control bit is set.
    pub fn fin(&self) -> bool {
        self.control.contains(Control::FIN)
    }

    /// Sets the FIN (Finish) control bit.
    pub fn set_fin(&mut self) {
        self.control |= Control::FIN;
    }

    /// Returns the `window` field of the TCP header.
    pub fn window(&self) -> u16 {
        self.window
    }

    /// Sets the `window` field of the TCP header.
    pub fn set_window(&mut self, window: u16) {
        self.window = window;
    }

    /// Returns the `checksum` field of the TCP header.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Computes and updates the `checksum` field for the TCP header.
    pub fn set_checksum(&mut self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) {
        self.checksum = self.compute_checksum(src, dst, payload);
    }

    /// Returns `true` if the TCP header checksum is valid.
    pub fn is_valid_checksum(&self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> bool {
        self.checksum == self.compute_checksum(src, dst, payload)
    }

    /// Returns the `urgent pointer` field of the TCP header.
    pub fn urgent_pointer(&self) -> u16 {
        self.urgent_pointer
    }

    /// Returns the options of the TCP header, in wire order.
    pub fn options(&self) -> &[TcpOption] {
        &self.options
    }

    /// Appends an option to the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the option would not fit in the 40 bytes of option
    /// space, or if an MSS of 0 is given.
    pub fn push_option(&mut self, option: TcpOption) -> crate::Result<()> {
        if let TcpOption::Mss(0) = option {
            return Err(Error::Header(HeaderError::InvalidMssOption));
        }

        let current_len = self.raw_options_len();
        let attempted_len = current_len + option.len();

        if attempted_len > Self::MAX_OPTIONS_LEN {
            return Err(Error::Header(HeaderError::InsufficientOptionSpace {
                attempted_len,
                current_len,
                max_len: Self::MAX_OPTIONS_LEN,
            }));
        }

        self.options.push(option);

        Ok(())
    }

    /// Removes every option from the header.
    pub fn clear_options(&mut self) {
        self.options.clear();
    }

    /// Returns the `Maximum Segment Size` option value, if present.
    pub fn mss(&self) -> Option<u16> {
        self.options.iter().find_map(|opt| match *opt {
            TcpOption::Mss(mss) => Some(mss),
            _ => None,
        })
    }

    /// Returns the `Window Scale` shift count, if present.
    pub fn window_scale(&self) -> Option<u8> {
        self.options.iter().find_map(|opt| match *opt {
            TcpOption::WindowScale(shift) => Some(shift),
            _ => None,
        })
    }

    /// Returns `true` if the `SACK-Permitted` option is present.
    pub fn sack_permitted(&self) -> bool {
        self.options
            .iter()
            .any(|opt| matches!(opt, TcpOption::SackPermitted))
    }

    /// Returns the SACK blocks carried by the header (empty if none).
    pub fn sack_blocks(&self) -> &[SackBlock] {
        self.options
            .iter()
            .find_map(|opt| match opt {
                TcpOption::Sack(blocks) => Some(blocks.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Returns the `(TSval, TSecr)` pair of the `Timestamps` option, if
    /// present.
    pub fn timestamp(&self) -> Option<(u32, u32)> {
        self.options.iter().find_map(|opt| match *opt {
            TcpOption::Timestamp { value, echo_reply } => Some((value, echo_reply)),
            _ => None,
        })
    }

    /// Sum of option lengths, before padding.
    fn raw_options_len(&self) -> usize {
        self.options.iter().map(TcpOption::len).sum()
    }

    /// Length of the options area in bytes, padded to a 32-bit boundary.
    pub fn options_len(&self) -> usize {
        (self.raw_options_len() + 3) & !3
    }

    /// Returns the length of the TCP header in bytes, including options.
    pub fn header_len(&self) -> usize {
        Self::MIN_HEADER_LEN as usize + self.options_len()
    }

    /// Returns the computed checksum of the TCP header.
    ///
    /// The checksum field is the 16 bit one's complement of the one's
    /// complement sum of all 16 bit words in the pseudo header, TCP header,
    /// and payload. For purposes of computing the checksum, the value of the
    /// checksum field is zero.
    pub fn compute_checksum(&self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> u16 {
        // ```text
        //        +--------+--------+--------+--------+
        //        |           Source Address          |
        //        +--------+--------+--------+--------+
        //        |         Destination Address       |
        //        +--------+--------+--------+--------+
        //        |  zero  |  PTCL  |    TCP Length   |
        //        +--------+--------+--------+--------+
        // ```
        let mut pseudo_header = [0u8; 12];

        pseudo_header[0..4].copy_from_slice(&src);
        pseudo_header[4..8].copy_from_slice(&dst);
        pseudo_header[9] = PROTOCOL_TCP;

        let tcp_len = (self.header_len() + payload.len()) as u16;
        pseudo_header[10..12].copy_from_slice(&tcp_len.to_be_bytes());

        let (mut raw_header, nbytes) = self.to_be_bytes();

        raw_header[16] = 0x00;
        raw_header[17] = 0x00;

        let mut bytes = pseudo_header
            .iter()
            .chain(raw_header[..nbytes].iter())
            .chain(payload.iter());

        let mut sum = 0u32;

        loop {
            let word = match (bytes.next(), bytes.next()) {
                (Some(h), Some(l)) => u16::from_be_bytes([*h, *l]),
                // An odd trailing octet is padded on the right with zeros.
                (Some(h), None) => u16::from_be_bytes([*h, 0x00]),
                _ => break,
            };

            sum += word as u32;

            if sum > 0xFFFF {
                sum = (sum & 0xFFFF) + (sum >> 16);
            }
        }

        while sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }

        !(sum as u16)
    }

    /// Returns the memory representation of the TCP header as a byte array in
    /// big-endian (network) byte order.
    ///
    /// A buffer of size `TcpHeader::MAX_HEADER_LEN` is used as the byte array,
    /// so the number of bytes written is also returned.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_be_bytes(&self) -> ([u8; Self::MAX_HEADER_LEN as usize], usize) {
        let mut raw_header = [0u8; Self::MAX_HEADER_LEN as usize];
        let size = self.header_len();

        let offset_and_control_bits = ((size as u16 >> 2) << 12) | self.control.bits() as u16;

        raw_header[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        raw_header[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        raw_header[4..8].copy_from_slice(&self.seq_number.to_be_bytes());
        raw_header[8..12].copy_from_slice(&self.ack_number.to_be_bytes());
        raw_header[12..14].copy_from_slice(&offset_and_control_bits.to_be_bytes());
        raw_header[14..16].copy_from_slice(&self.window.to_be_bytes());
        raw_header[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        raw_header[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        let mut pos = Self::MIN_HEADER_LEN as usize;
        for opt in &self.options {
            pos += opt.encode(&mut raw_header[pos..]);
        }

        // Remaining bytes up to `size` stay zero (End of Option List).
        (raw_header, size)
    }

    /// Reads a TCP header from the given input stream.
    pub fn read<T: io::Read>(input: &mut T) -> crate::Result<Self> {
        let mut raw_header = [0u8; Self::MAX_HEADER_LEN as usize];

        let nbytes = input.read(&mut raw_header[..])?;
        TcpHeader::try_from(&raw_header[..nbytes])
    }

    /// Writes the TCP header to the given output stream.
    ///
    /// # Note
    ///
    /// The caller must ensure the checksum is computed and updated before
    /// writing the header.
    pub fn write<T: io::Write>(&self, output: &mut T) -> crate::Result<()> {
        let (raw_header, nbytes) = self.to_be_bytes();
        output.write_all(&raw_header[..nbytes])?;

        Ok(())
    }
}

impl TryFrom<&[u8]> for TcpHeader {
    type Error = Error;

    /// Parses a header from the front of `header_raw`. Bytes past the data
    /// offset are ignored (they belong to the payload).
    fn try_from(header_raw: &[u8]) -> Result<Self, Self::Error> {
        if header_raw.len() < Self::MIN_HEADER_LEN as usize {
            return Err(Error::Parse(ParseError::InvalidBufferLength {
                provided: header_raw.len(),
                min: Self::MIN_HEADER_LEN,
                max: Self::MAX_HEADER_LEN,
            }));
        }

        let offset_and_control_bits = u16::from_be_bytes([header_raw[12], header_raw[13]]);
        let data_offset = offset_and_control_bits >> 12;

        if data_offset < Self::MIN_DATA_OFFSET {
            return Err(Error::Parse(ParseError::InvalidDataOffset {
                provided: data_offset,
                min: Self::MIN_DATA_OFFSET,
                max: Self::MAX_DATA_OFFSET,
            }));
        }

        // There are less bytes in the buffer than advertised by data offset.
        if (data_offset << 2) as usize > header_raw.len() {
            return Err(Error::Parse(ParseError::HeaderLengthMismatch {
                provided: header_raw.len(),
                expected: data_offset << 2,
            }));
        }

        let options = parse_options(&header_raw[20..(data_offset << 2) as usize])?;

        Ok(Self {
            src_port: u16::from_be_bytes([header_raw[0], header_raw[1]]),
            dst_port: u16::from_be_bytes([header_raw[2], header_raw[3]]),
            seq_number: u32::from_be_bytes([
                header_raw[4],
                header_raw[5],
                header_raw[6],
                header_raw[7],
            ]),
            ack_number: u32::from_be_bytes([
                header_raw[8],
                header_raw[9],
                header_raw[10],
                header_raw[11],
            ]),
            control: Control::from_bits_truncate(offset_and_control_bits as u8),
            window: u16::from_be_bytes([header_raw[14], header_raw[15]]),
            checksum: u16::from_be_bytes([header_raw[16], header_raw[17]]),
            urgent_pointer: u16::from_be_bytes([header_raw[18], header_raw[19]]),
            options,
        })
    }
}

/// Decodes the options area of a header.
///
/// Known option kinds whose length byte does not match the kind are kept as
/// [`TcpOption::Unknown`] so the receiver can ignore them; a length that
/// overruns the options area is a parse error.
fn parse_options(opts: &[u8]) -> crate::Result<Vec<TcpOption>> {
    if opts.len() > TcpHeader::MAX_OPTIONS_LEN {
        return Err(Error::Parse(ParseError::InvalidOptionsLength {
            provided: opts.len(),
            max: TcpHeader::MAX_OPTIONS_LEN,
        }));
    }

    let mut options = Vec::new();
    let mut i = 0;

    while i < opts.len() {
        let kind = opts[i];

        match OptionKind::from_u8(kind) {
            Some(OptionKind::EOL) => break,
            Some(OptionKind::NOP) => {
                options.push(TcpOption::Nop);
                i += 1;
                continue;
            }
            _ => {}
        }

        if i + 1 >= opts.len() {
            return Err(Error::Parse(ParseError::MalformedOption { kind, len: 0 }));
        }

        let len = opts[i + 1];

        if len < 2 || i + len as usize > opts.len() {
            return Err(Error::Parse(ParseError::MalformedOption { kind, len }));
        }

        let data = &opts[i + 2..i + len as usize];

        let option = match (OptionKind::from_u8(kind), len) {
            (Some(OptionKind::MSS), 4) => TcpOption::Mss(u16::from_be_bytes([data[0], data[1]])),
            (Some(OptionKind::WS), 3) => TcpOption::WindowScale(data[0]),
            (Some(OptionKind::SACK_PERMITTED), 2) => TcpOption::SackPermitted,
            (Some(OptionKind::SACK), len) if len % 8 == 2 => TcpOption::Sack(
                data.chunks_exact(8)
                    .map(|chunk| SackBlock {
                        start: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                        end: u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                    })
                    .collect(),
            ),
            (Some(OptionKind::TIMESTAMP), 10) => TcpOption::Timestamp {
                value: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
                echo_reply: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            },
            _ => TcpOption::Unknown {
                kind,
                data: data.to_vec(),
            },
        };

        options.push(option);
        i += len as usize;
    }

    Ok(options)
}

/// A block of the SACK option: the left edge and right edge (exclusive) of a
/// block of data received by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SackBlock {
    /// First sequence number of the block.
    pub start: u32,
    /// Sequence number immediately following the last sequence number of the
    /// block.
    pub end: u32,
}

impl SackBlock {
    /// Encoded length of a single block.
    pub const LEN: usize = 8;

    /// Creates a new SACK block.
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// Decoded TCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpOption {
    /// No-Operation, used for alignment.
    Nop,
    /// Maximum Segment Size (RFC 793).
    Mss(u16),
    /// Window scale shift count (RFC 1323).
    WindowScale(u8),
    /// SACK may be used on this connection (RFC 2018).
    SackPermitted,
    /// Selective acknowledgment blocks (RFC 2018).
    Sack(Vec<SackBlock>),
    /// Timestamps (RFC 1323).
    Timestamp {
        /// TSval.
        value: u32,
        /// TSecr.
        echo_reply: u32,
    },
    /// Any option this engine does not interpret.
    Unknown {
        /// Option kind.
        kind: u8,
        /// Option data, excluding kind and length bytes.
        data: Vec<u8>,
    },
}

impl TcpOption {
    /// Encoded length of the option in bytes.
    pub fn len(&self) -> usize {
        match self {
            TcpOption::Nop => 1,
            TcpOption::Mss(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::Sack(blocks) => 2 + blocks.len() * SackBlock::LEN,
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    /// Always `false`; every option occupies at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Option kind byte.
    pub fn kind(&self) -> u8 {
        match self {
            TcpOption::Nop => OptionKind::NOP as u8,
            TcpOption::Mss(_) => OptionKind::MSS as u8,
            TcpOption::WindowScale(_) => OptionKind::WS as u8,
            TcpOption::SackPermitted => OptionKind::SACK_PERMITTED as u8,
            TcpOption::Sack(_) => OptionKind::SACK as u8,
            TcpOption::Timestamp { .. } => OptionKind::TIMESTAMP as u8,
            TcpOption::Unknown { kind, .. } => *kind,
        }
    }

    /// Writes the option into `buf`, returning the number of bytes written.
    ///
    /// `buf` must hold at least [`TcpOption::len`] bytes.
    fn encode(&self, buf: &mut [u8]) -> usize {
        let len = self.len();

        buf[0] = self.kind();
        if len == 1 {
            return 1;
        }
        buf[1] = len as u8;

        match self {
            TcpOption::Mss(mss) => buf[2..4].copy_from_slice(&mss.to_be_bytes()),
            TcpOption::WindowScale(shift) => buf[2] = *shift,
            TcpOption::Sack(blocks) => {
                for (i, block) in blocks.iter().enumerate() {
                    let at = 2 + i * SackBlock::LEN;
                    buf[at..at + 4].copy_from_slice(&block.start.to_be_bytes());
                    buf[at + 4..at + 8].copy_from_slice(&block.end.to_be_bytes());
                }
            }
            TcpOption::Timestamp { value, echo_reply } => {
                buf[2..6].copy_from_slice(&value.to_be_bytes());
                buf[6..10].copy_from_slice(&echo_reply.to_be_bytes());
            }
            TcpOption::Unknown { data, .. } => buf[2..len].copy_from_slice(data),
            TcpOption::Nop | TcpOption::SackPermitted => {}
        }

        len
    }
}

/// Kinds of TCP options (RFC 793 3.1, RFC 1323, RFC 2018).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum OptionKind {
    /// End of Option List
    ///
    /// ```text
    ///        +--------+
    ///        |00000000|
    ///        +--------+
    ///         Kind=0
    /// ```
    EOL = 0,
    /// No-Operation
    ///
    /// ```text
    ///        +--------+
    ///        |00000001|
    ///        +--------+
    ///         Kind=1
    /// ```
    NOP = 1,
    /// Maximum Segment Size
    ///
    /// ```text
    ///        +--------+--------+---------+--------+
    ///        |00000010|00000100|   max seg size   |
    ///        +--------+--------+---------+--------+
    ///         Kind=2   Length=4
    /// ```
    ///
    /// Only sent in segments with the SYN control bit set.
    MSS = 2,
    /// Window Scale
    ///
    /// ```text
    ///        +---------+---------+---------+
    ///        | Kind=3  |Length=3 |shift.cnt|
    ///        +---------+---------+---------+
    /// ```
    WS = 3,
    /// SACK-Permitted
    ///
    /// ```text
    ///        +---------+---------+
    ///        | Kind=4  | Length=2|
    ///        +---------+---------+
    /// ```
    SACK_PERMITTED = 4,
    /// SACK
    ///
    /// ```text
    ///                          +--------+--------+
    ///                          | Kind=5 | Length |
    ///        +--------+--------+--------+--------+
    ///        |      Left Edge of 1st Block       |
    ///        +--------+--------+--------+--------+
    ///        |      Right Edge of 1st Block      |
    ///        +--------+--------+--------+--------+
    ///        /            . . .                  /
    ///        +--------+--------+--------+--------+
    /// ```
    SACK = 5,
    /// Timestamps
    ///
    /// ```text
    ///        +-------+-------+---------------------+---------------------+
    ///        |Kind=8 |  10   |   TS Value (TSval)  |TS Echo Reply (TSecr)|
    ///        +-------+-------+---------------------+---------------------+
    ///            1       1              4                     4
    /// ```
    TIMESTAMP = 8,
}

impl OptionKind {
    /// Maps a kind byte to a known option kind.
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Self::EOL),
            1 => Some(Self::NOP),
            2 => Some(Self::MSS),
            3 => Some(Self::WS),
            4 => Some(Self::SACK_PERMITTED),
            5 => Some(Self::SACK),
            8 => Some(Self::TIMESTAMP),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SYN captured from a Linux host: MSS 1460, SACK-Permitted, Timestamps,
    // NOP, Window Scale 7.
    const SYN_BYTES: [u8; 40] = [
        0xa0, 0x16, 0x01, 0xbb, 0xbc, 0xbb, 0x54, 0xa8, 0x00, 0x00, 0x00, 0x00, 0xa0, 0x02, 0xfa,
        0xf0, 0xbb, 0x4c, 0x00, 0x00, 0x02, 0x04, 0x05, 0xb4, 0x04, 0x02, 0x08, 0x0a, 0x78, 0x27,
        0xe4, 0xe7, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x03, 0x07,
    ];

    #[test]
    fn tcp_header_basic_valid() {
        let mut header_bytes = &SYN_BYTES[..];

        let header = TcpHeader::read(&mut header_bytes);
        assert!(header.is_ok());
        let header = header.unwrap();

        assert_eq!(header.src_port(), 40982);
        assert_eq!(header.dst_port(), 443);
        assert_eq!(header.seq_number(), 3166393512);
        assert_eq!(header.ack_number(), 0);
        assert_eq!(header.data_offset(), 10);
        assert_eq!(header.control(), Control::SYN);
        assert_eq!(header.window(), 64240);
        assert_eq!(header.checksum(), 0xBB4C);
        assert_eq!(header.urgent_pointer(), 0);
        assert_eq!(header.options_len(), 20);
        assert_eq!(header.mss(), Some(1460));
        assert!(header.sack_permitted());
        assert_eq!(header.timestamp(), Some((0x7827e4e7, 0)));
        assert_eq!(header.window_scale(), Some(7));
    }

    #[test]
    fn tcp_header_reencodes_identically() {
        let header = TcpHeader::try_from(&SYN_BYTES[..]).unwrap();
        let (buf, nbytes) = header.to_be_bytes();

        assert_eq!(&buf[..nbytes], &SYN_BYTES[..]);
    }

    #[test]
    fn tcp_header_checksum_validation_valid() {
        let mut header = TcpHeader::try_from(&SYN_BYTES[..]).unwrap();

        let src = [192, 168, 0, 1];
        let dst = [192, 168, 0, 44];

        assert!(header.is_valid_checksum(src, dst, &[]));

        // Invalidate checksum.
        header.set_ack_number(22);

        assert!(!header.is_valid_checksum(src, dst, &[]));

        header.set_checksum(src, dst, &[]);
        assert!(header.is_valid_checksum(src, dst, &[]));
    }

    #[test]
    fn tcp_header_checksum_odd_payload() {
        let mut header = TcpHeader::new(1000, 80, 1, 512);
        header.set_ack();

        let src = [10, 0, 0, 1];
        let dst = [10, 0, 0, 2];
        let payload = b"hello";

        header.set_checksum(src, dst, payload);
        assert!(header.is_valid_checksum(src, dst, payload));
        assert!(!header.is_valid_checksum(src, dst, b"hellp"));
    }

    #[test]
    fn tcp_header_flags_bit_isolation_valid() {
        for flags in 0u8..=0b0011_1111 {
            let mut header_bytes = SYN_BYTES;
            header_bytes[13] = flags;

            let header = TcpHeader::try_from(&header_bytes[..]).unwrap();

            assert_eq!(header.urg(), flags & 0b10_0000 != 0);
            assert_eq!(header.ack(), flags & 0b01_0000 != 0);
            assert_eq!(header.psh(), flags & 0b00_1000 != 0);
            assert_eq!(header.rst(), flags & 0b00_0100 != 0);
            assert_eq!(header.syn(), flags & 0b00_0010 != 0);
            assert_eq!(header.fin(), flags & 0b00_0001 != 0);
        }
    }

    #[test]
    fn tcp_header_invalid_buffer_length() {
        let header = TcpHeader::try_from(&SYN_BYTES[..19]);
        assert!(matches!(
            header,
            Err(Error::Parse(ParseError::InvalidBufferLength { .. }))
        ));
    }

    #[test]
    fn tcp_header_invalid_data_offset() {
        let mut header_bytes = SYN_BYTES;
        header_bytes[12] = 0x40;

        assert!(matches!(
            TcpHeader::try_from(&header_bytes[..]),
            Err(Error::Parse(ParseError::InvalidDataOffset { .. }))
        ));
    }

    #[test]
    fn tcp_header_truncated_options() {
        assert!(matches!(
            TcpHeader::try_from(&SYN_BYTES[..30]),
            Err(Error::Parse(ParseError::HeaderLengthMismatch { .. }))
        ));
    }

    #[test]
    fn tcp_options_overrun_is_malformed() {
        let mut header_bytes = SYN_BYTES;
        // Timestamps claims 30 bytes.
        header_bytes[27] = 30;

        assert!(matches!(
            TcpHeader::try_from(&header_bytes[..]),
            Err(Error::Parse(ParseError::MalformedOption { kind: 8, len: 30 }))
        ));
    }

    #[test]
    fn tcp_options_wrong_length_kept_as_unknown() {
        let mut header = TcpHeader::new(1, 2, 3, 4);
        header
            .push_option(TcpOption::Unknown {
                kind: 2,
                data: vec![0x05],
            })
            .unwrap();

        let (buf, nbytes) = header.to_be_bytes();
        let parsed = TcpHeader::try_from(&buf[..nbytes]).unwrap();

        assert_eq!(parsed.mss(), None);
        assert!(matches!(
            parsed.options()[0],
            TcpOption::Unknown { kind: 2, .. }
        ));
    }

    #[test]
    fn tcp_options_sack_blocks() {
        let mut header = TcpHeader::new(1, 2, 3, 4);
        header.set_ack();
        header.push_option(TcpOption::Nop).unwrap();
        header.push_option(TcpOption::Nop).unwrap();
        header
            .push_option(TcpOption::Sack(vec![
                SackBlock::new(1000, 2000),
                SackBlock::new(u32::MAX - 10, 20),
            ]))
            .unwrap();

        assert_eq!(header.options_len(), 20);

        let (buf, nbytes) = header.to_be_bytes();
        let parsed = TcpHeader::try_from(&buf[..nbytes]).unwrap();

        assert_eq!(
            parsed.sack_blocks(),
            &[SackBlock::new(1000, 2000), SackBlock::new(u32::MAX - 10, 20)]
        );
    }

    #[test]
    fn tcp_options_space_exhausted() {
        let mut header = TcpHeader::new(1, 2, 3, 4);
        header
            .push_option(TcpOption::Sack(vec![SackBlock::new(0, 1); 4]))
            .unwrap();
        assert_eq!(header.options_len(), 36);

        let res = header.push_option(TcpOption::Timestamp {
            value: 1,
            echo_reply: 2,
        });

        assert!(matches!(
            res,
            Err(Error::Header(HeaderError::InsufficientOptionSpace {
                attempted_len: 44,
                current_len: 34,
                max_len: 40,
            }))
        ));
    }

    #[test]
    fn tcp_options_zero_mss_rejected() {
        let mut header = TcpHeader::new(1, 2, 3, 4);
        assert!(matches!(
            header.push_option(TcpOption::Mss(0)),
            Err(Error::Header(HeaderError::InvalidMssOption))
        ));
    }

    #[test]
    fn tcp_options_padding_to_word_boundary() {
        let mut header = TcpHeader::new(1, 2, 3, 4);
        header.push_option(TcpOption::WindowScale(3)).unwrap();

        assert_eq!(header.options_len(), 4);
        assert_eq!(header.header_len(), 24);

        let (buf, nbytes) = header.to_be_bytes();
        assert_eq!(&buf[20..nbytes], &[3, 3, 3, 0]);
    }
}
