//! Error types for the TCP engine, covering segment encoding/decoding,
//! application commands, and configuration.

use std::{error, fmt, io, result};

use crate::protocol::Socket;

/// A convenience wrapper around `Result` for [crate::Error].
pub type Result<T> = result::Result<T, Error>;

/// Set of errors that can surface from the TCP engine.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error while reading or writing a TCP segment.
    Io(io::Error),
    /// Error parsing a TCP segment.
    Parse(ParseError),
    /// Error creating or manipulating a TCP header.
    Header(HeaderError),
    /// Application command rejected by a connection or the connection manager.
    Command(CommandError),
    /// Invalid engine configuration.
    Config(ConfigError),
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<HeaderError> for Error {
    fn from(err: HeaderError) -> Error {
        Error::Header(err)
    }
}

impl From<CommandError> for Error {
    fn from(err: CommandError) -> Error {
        Error::Command(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => fmt::Display::fmt(err, f),
            Error::Parse(ref err) => fmt::Display::fmt(err, f),
            Error::Header(ref err) => fmt::Display::fmt(err, f),
            Error::Command(ref err) => fmt::Display::fmt(err, f),
            Error::Config(ref err) => fmt::Display::fmt(err, f),
        }
    }
}

/// Error occurred while trying to parse a TCP segment.
#[derive(Debug)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ParseError {
    /// Input buffer not within the valid range for a TCP header.
    InvalidBufferLength { provided: usize, min: u16, max: u16 },
    /// Invalid TCP data offset.
    InvalidDataOffset { provided: u16, min: u16, max: u16 },
    /// Mismatch between the provided and expected TCP header length.
    ///
    /// Value provided is less than `data_offset << 2`.
    HeaderLengthMismatch { provided: usize, expected: u16 },
    /// Invalid TCP options length.
    InvalidOptionsLength { provided: usize, max: usize },
    /// An option's length byte is inconsistent with its kind or overruns the
    /// options area.
    MalformedOption { kind: u8, len: u8 },
}

impl error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseError::InvalidBufferLength { provided, min, max } => {
                write!(
                    f,
                    "invalid header length: {provided} bytes (not within the valid range: {min}..={max} bytes)"
                )
            }
            ParseError::InvalidDataOffset { provided, min, max } => {
                write!(
                    f,
                    "invalid TCP data offset: {provided} (not within the valid range: {min}..={max})"
                )
            }
            ParseError::HeaderLengthMismatch { provided, expected } => {
                write!(
                    f,
                    "invalid TCP header length: {provided} bytes (less than indicated by data offset: {expected} bytes)"
                )
            }
            ParseError::InvalidOptionsLength { provided, max } => {
                write!(
                    f,
                    "invalid TCP options length: {provided} bytes (exceeds maximum allowed {max} bytes)"
                )
            }
            ParseError::MalformedOption { kind, len } => {
                write!(
                    f,
                    "malformed TCP option: kind {kind} with length {len} (inconsistent with kind or overruns options)"
                )
            }
        }
    }
}

/// Error occurred while trying to create or manipulate a TCP header.
#[derive(Debug)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum HeaderError {
    /// Insufficient space to append TCP option.
    InsufficientOptionSpace {
        attempted_len: usize,
        current_len: usize,
        max_len: usize,
    },
    /// Invalid TCP `MSS` option value.
    InvalidMssOption,
}

impl error::Error for HeaderError {}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HeaderError::InsufficientOptionSpace {
                attempted_len,
                current_len,
                max_len,
            } => {
                write!(
                    f,
                    "failed to append TCP option to header: appending would result in {attempted_len} bytes, but current length is {current_len} (exceeds maximum allowed {max_len} bytes)"
                )
            }
            HeaderError::InvalidMssOption => {
                write!(f, "invalid TCP MSS option: value must be greater than 0")
            }
        }
    }
}

/// Application command that could not be carried out.
#[derive(Debug)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum CommandError {
    /// Command issued on a connection that was never opened.
    NotOpen,
    /// `OPEN` issued on a connection that is already open.
    AlreadyOpen,
    /// `SEND` issued after the local side has closed.
    ConnectionClosing,
    /// `CLOSE` issued twice.
    DuplicateClose,
    /// `SEND` issued on a listening connection, which has no remote peer.
    SendOnListen,
    /// No connection is registered under the given identifiers.
    UnknownConnection { app: u32, conn: u32 },
    /// Another connection already owns the socket pair.
    SocketInUse(Socket),
    /// Every port of the ephemeral range is in use.
    EphemeralPortsExhausted { low: u16, high: u16 },
    /// Enqueuing would leave more than the sequence space can address
    /// outstanding.
    SendQueueOverflow { buffered: u64, attempted: usize },
    /// Active open without a remote address or port.
    MissingRemote,
    /// Passive open without a local port.
    MissingLocalPort,
}

impl error::Error for CommandError {}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CommandError::NotOpen => write!(f, "connection not open"),
            CommandError::AlreadyOpen => write!(f, "connection already open"),
            CommandError::ConnectionClosing => {
                write!(f, "connection closing: no further data may be sent")
            }
            CommandError::DuplicateClose => write!(f, "duplicate CLOSE on connection"),
            CommandError::SendOnListen => {
                write!(f, "unable to send on a listening connection: no remote peer")
            }
            CommandError::UnknownConnection { app, conn } => {
                write!(f, "unknown connection: app {app}, connection {conn}")
            }
            CommandError::SocketInUse(sock) => {
                write!(f, "socket pair already in use: {sock}")
            }
            CommandError::EphemeralPortsExhausted { low, high } => {
                write!(
                    f,
                    "ephemeral ports exhausted (every port within {low}..{high} is in use)"
                )
            }
            CommandError::SendQueueOverflow {
                buffered,
                attempted,
            } => {
                write!(
                    f,
                    "send queue overflow: {buffered} bytes buffered, enqueuing {attempted} more would exceed the sequence space"
                )
            }
            CommandError::MissingRemote => {
                write!(f, "active open requires a remote address and port")
            }
            CommandError::MissingLocalPort => {
                write!(f, "passive open requires a local port")
            }
        }
    }
}

/// Invalid configuration value.
#[derive(Debug)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ConfigError {
    /// MSS must be non-zero.
    InvalidMss,
    /// The advertised window cannot be represented without window scaling.
    WindowTooLarge { provided: u32, max: u32 },
    /// MSL must be non-zero.
    InvalidMsl,
    /// No congestion control algorithm has this name.
    UnknownAlgorithm(String),
}

impl error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConfigError::InvalidMss => write!(f, "invalid MSS: value must be greater than 0"),
            ConfigError::WindowTooLarge { provided, max } => {
                write!(
                    f,
                    "invalid advertised window: {provided} bytes (exceeds maximum allowed {max} bytes)"
                )
            }
            ConfigError::InvalidMsl => write!(f, "invalid MSL: value must be greater than 0"),
            ConfigError::UnknownAlgorithm(ref name) => {
                write!(f, "unknown congestion control algorithm: {name}")
            }
        }
    }
}
