//! The protocol engine for [TCP], with the extensions of [RFC 1323] (window
//! scaling, timestamps), [RFC 2018] and [RFC 2883] (SACK, D-SACK), and
//! [RFC 3517] (SACK-based loss recovery).
//!
//! The engine is event-driven and performs no I/O. Segments, application
//! commands and timer expiries are fed in through the
//! [`ConnectionManager`](crate::ConnectionManager); everything the engine
//! produces leaves through a [`Host`].
//!
//! [TCP]:      https://www.rfc-editor.org/rfc/rfc793
//! [RFC 1323]: https://www.rfc-editor.org/rfc/rfc1323
//! [RFC 2018]: https://www.rfc-editor.org/rfc/rfc2018
//! [RFC 2883]: https://www.rfc-editor.org/rfc/rfc2883
//! [RFC 3517]: https://www.rfc-editor.org/rfc/rfc3517

pub mod congestion;
pub mod connection;
pub mod fsm;
pub mod headers;
pub mod rcv_queue;
pub mod sack_queue;
pub mod send_queue;
pub mod seq;
pub mod tcb;

pub mod host;
pub use host::{AppId, ConnId, Host, Indication, StatusInfo};

pub mod timer;
pub use timer::{Timer, TimerHandle, TimerKind};

pub mod socket;
pub use socket::{Socket, SocketAddr};

pub mod segment;
pub use segment::TcpSegment;

pub use congestion::{CongestionAlgorithmKind, CongestionControl};
pub use connection::{Command, Connection};
pub use fsm::{ConnectionState, Event};
pub use headers::{SackBlock, TcpHeader, TcpOption};
pub use tcb::Tcb;

#[cfg(test)]
pub(crate) mod testing;
