//! Boundary between the engine and its environment.
//!
//! The engine never performs I/O, reads a clock, or owns a scheduler. All of
//! that is provided by a [`Host`]: the network layer that carries segments,
//! the event scheduler that runs timers, and the application that receives
//! indications.

use std::fmt;
use std::time::Duration;

use super::fsm::ConnectionState;
use super::segment::TcpSegment;
use super::socket::Socket;
use super::timer::{Timer, TimerHandle};

/// Identifier of an application channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AppId(pub u32);

/// Identifier of a connection, unique within a [`ConnectionManager`].
///
/// [`ConnectionManager`]: crate::ConnectionManager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnId(pub u32);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app {}", self.0)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn {}", self.0)
    }
}

/// Capabilities the engine consumes from its environment.
pub trait Host {
    /// Current simulation or wall-clock time. Only differences between two
    /// readings are meaningful.
    fn now(&self) -> Duration;

    /// Registers a single-shot timer firing at `deadline`.
    fn schedule_at(&mut self, deadline: Duration, timer: Timer) -> TimerHandle;

    /// Cancels a pending timer. Cancelling a handle that already fired or was
    /// already cancelled must be a no-op.
    fn cancel(&mut self, handle: TimerHandle);

    /// Hands an outbound segment to the network layer.
    fn send_segment(&mut self, segment: TcpSegment, src: [u8; 4], dst: [u8; 4]);

    /// Delivers an indication to the application owning `conn`.
    fn indicate(&mut self, app: AppId, conn: ConnId, indication: Indication);
}

/// Notification sent to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum Indication {
    /// The connection reached ESTABLISHED.
    Established {
        /// Local end of the connection.
        local: super::SocketAddr,
        /// Remote end of the connection.
        remote: super::SocketAddr,
    },
    /// In-order data received from the peer.
    Data(Vec<u8>),
    /// The peer closed its sending direction.
    PeerClosed,
    /// The connection closed.
    Closed,
    /// The peer refused the connection.
    ConnectionRefused,
    /// The peer reset the connection.
    ConnectionReset,
    /// The connection was aborted after repeated retransmission timeouts.
    TimedOut,
    /// Reply to a STATUS command.
    StatusReply(Box<StatusInfo>),
}

/// Snapshot of a connection's state variables. Field names follow RFC 793.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub state: ConnectionState,
    pub socket: Socket,
    pub active: bool,

    pub snd_mss: u32,
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_max: u32,
    pub snd_wnd: u32,
    pub snd_up: u32,
    pub snd_wl1: u32,
    pub snd_wl2: u32,
    pub iss: u32,

    pub rcv_nxt: u32,
    pub rcv_wnd: u32,
    pub rcv_up: u32,
    pub irs: u32,
    pub rcv_adv: u32,

    pub fin_ack_rcvd: bool,
    pub ws_enabled: bool,
    pub snd_wnd_scale: u8,
    pub rcv_wnd_scale: u8,
    pub ts_enabled: bool,
    pub sack_enabled: bool,

    pub cwnd: u32,
    pub ssthresh: u32,
    pub srtt: Duration,
    pub rto: Duration,

    pub rcv_out_of_order_segments: u64,
    pub rcv_queue_drops: u64,
    pub sack_blocks_sent: u64,
    pub sack_blocks_received: u64,
    pub rto_count: u64,
}
