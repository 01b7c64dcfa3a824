//! Event-driven implementation of the Transmission Control Protocol (TCP),
//! based on [RFC 793], with SACK and pluggable congestion control.
//!
//! The engine is independent of any network stack or runtime: a [`Host`]
//! supplies the clock, the timer scheduler, the network layer and the
//! application, and a [`ConnectionManager`] routes segments, commands and
//! timer expiries to the owning connection.
//!
//! This project is experimental and not intended for production use.
//!
//! [RFC 793]: https://www.rfc-editor.org/rfc/rfc793

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod log;

pub mod config;
pub use config::TcpConfig;

pub mod error;
pub use error::{CommandError, ConfigError, Error, HeaderError, ParseError, Result};

pub mod manager;
pub use manager::ConnectionManager;

pub mod protocol;
pub use protocol::{
    AppId, Command, CongestionAlgorithmKind, ConnId, ConnectionState, Host, Indication, Socket,
    SocketAddr, StatusInfo, TcpSegment, Timer, TimerHandle, TimerKind,
};
