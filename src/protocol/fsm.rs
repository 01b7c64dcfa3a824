//! TCP finite state machine (FSM), as described in [RFC 793].
//!
//! The table here is pure: it maps a state and an event to the next state.
//! Side effects (segment output, queue updates, timers) are carried out by the
//! connection before it consults the table; the effects of *entering* a state
//! are applied afterwards.
//!
//! [RFC 793]: https://www.rfc-editor.org/rfc/rfc793

use std::fmt;

/// Different TCP connection states.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum ConnectionState {
    /// Connection object exists but no OPEN has been issued yet.
    INIT,
    /// Represents waiting for a connection request from any remote TCP and
    /// port.
    LISTEN,
    /// Represents waiting for a matching connection request after having sent a
    /// connection request.
    SYN_SENT,
    /// Represents waiting for a confirming connection request acknowledgment
    /// after having both received and sent a connection request.
    SYN_RCVD,
    /// Represents an open connection, data received can be delivered to the
    /// user. The normal state for the data transfer phase of the connection.
    ESTABLISHED,
    /// Represents waiting for a connection termination request from the local
    /// user.
    CLOSE_WAIT,
    /// Represents waiting for an acknowledgment of the connection termination
    /// request previously sent to the remote TCP (which includes an
    /// acknowledgment of its connection termination request).
    LAST_ACK,
    /// Represents waiting for a connection termination request from the remote
    /// TCP, or an acknowledgment of the connection termination request
    /// previously sent.
    FIN_WAIT_1,
    /// Represents waiting for a connection termination request from the remote
    /// TCP.
    FIN_WAIT_2,
    /// Represents waiting for a connection termination request acknowledgment
    /// from the remote TCP.
    CLOSING,
    /// Represents waiting for enough time to pass to be sure the remote TCP
    /// received the acknowledgment of its connection termination request.
    TIME_WAIT,
    /// Represents no connection state at all.
    CLOSED,
}

impl ConnectionState {
    /// Every state, in declaration order.
    pub const ALL: [ConnectionState; 12] = [
        ConnectionState::INIT,
        ConnectionState::LISTEN,
        ConnectionState::SYN_SENT,
        ConnectionState::SYN_RCVD,
        ConnectionState::ESTABLISHED,
        ConnectionState::CLOSE_WAIT,
        ConnectionState::LAST_ACK,
        ConnectionState::FIN_WAIT_1,
        ConnectionState::FIN_WAIT_2,
        ConnectionState::CLOSING,
        ConnectionState::TIME_WAIT,
        ConnectionState::CLOSED,
    ];

    /// Returns `true` for the states in which both sequence spaces are
    /// synchronized (ESTABLISHED and everything after it, except CLOSED).
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            ConnectionState::ESTABLISHED
                | ConnectionState::CLOSE_WAIT
                | ConnectionState::LAST_ACK
                | ConnectionState::FIN_WAIT_1
                | ConnectionState::FIN_WAIT_2
                | ConnectionState::CLOSING
                | ConnectionState::TIME_WAIT
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Events driving the FSM: application commands, classified segment
/// arrivals, and connection-level timeouts.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum Event {
    OPEN_ACTIVE,
    OPEN_PASSIVE,
    SEND,
    CLOSE,
    ABORT,
    STATUS,

    RCV_SYN,
    RCV_SYN_ACK,
    RCV_ACK,
    RCV_DATA,
    RCV_FIN,
    RCV_FIN_ACK,
    RCV_RST,
    /// SYN received in a synchronized state (or a SYN_RCVD that did not
    /// expect it).
    RCV_UNEXP_SYN,

    TIMEOUT_CONN_ESTAB,
    TIMEOUT_FIN_WAIT_2,
    TIMEOUT_2MSL,
}

impl Event {
    /// Every event, in declaration order.
    pub const ALL: [Event; 17] = [
        Event::OPEN_ACTIVE,
        Event::OPEN_PASSIVE,
        Event::SEND,
        Event::CLOSE,
        Event::ABORT,
        Event::STATUS,
        Event::RCV_SYN,
        Event::RCV_SYN_ACK,
        Event::RCV_ACK,
        Event::RCV_DATA,
        Event::RCV_FIN,
        Event::RCV_FIN_ACK,
        Event::RCV_RST,
        Event::RCV_UNEXP_SYN,
        Event::TIMEOUT_CONN_ESTAB,
        Event::TIMEOUT_FIN_WAIT_2,
        Event::TIMEOUT_2MSL,
    ];
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Next state for `event` in `state`, or `None` if the pair leaves the state
/// unchanged.
///
/// `active` tells whether the connection was opened actively; a passively
/// opened connection falls back to LISTEN when its handshake fails.
pub fn transition(state: ConnectionState, event: Event, active: bool) -> Option<ConnectionState> {
    use ConnectionState::*;
    use Event::*;

    let next = match (state, event) {
        (INIT, OPEN_PASSIVE) => LISTEN,
        (INIT, OPEN_ACTIVE) => SYN_SENT,

        (LISTEN, OPEN_ACTIVE) => SYN_SENT,
        (LISTEN, CLOSE | ABORT) => CLOSED,
        (LISTEN, RCV_SYN) => SYN_RCVD,

        (SYN_RCVD, CLOSE) => FIN_WAIT_1,
        (SYN_RCVD, ABORT | RCV_UNEXP_SYN) => CLOSED,
        (SYN_RCVD, TIMEOUT_CONN_ESTAB | RCV_RST) => {
            if active {
                CLOSED
            } else {
                LISTEN
            }
        }
        (SYN_RCVD, RCV_ACK) => ESTABLISHED,
        (SYN_RCVD, RCV_FIN) => CLOSE_WAIT,

        (SYN_SENT, CLOSE | ABORT | TIMEOUT_CONN_ESTAB | RCV_RST) => CLOSED,
        (SYN_SENT, RCV_SYN_ACK) => ESTABLISHED,
        (SYN_SENT, RCV_SYN) => SYN_RCVD,

        (ESTABLISHED, CLOSE) => FIN_WAIT_1,
        (ESTABLISHED, ABORT | RCV_RST | RCV_UNEXP_SYN) => CLOSED,
        (ESTABLISHED, RCV_FIN) => CLOSE_WAIT,

        (CLOSE_WAIT, CLOSE) => LAST_ACK,
        (CLOSE_WAIT, ABORT | RCV_RST | RCV_UNEXP_SYN) => CLOSED,

        (LAST_ACK, ABORT | RCV_ACK | RCV_RST | RCV_UNEXP_SYN) => CLOSED,

        (FIN_WAIT_1, ABORT | RCV_RST | RCV_UNEXP_SYN) => CLOSED,
        (FIN_WAIT_1, RCV_FIN) => CLOSING,
        (FIN_WAIT_1, RCV_ACK) => FIN_WAIT_2,
        (FIN_WAIT_1, RCV_FIN_ACK) => TIME_WAIT,

        (FIN_WAIT_2, ABORT | TIMEOUT_FIN_WAIT_2 | RCV_RST | RCV_UNEXP_SYN) => CLOSED,
        (FIN_WAIT_2, RCV_FIN) => TIME_WAIT,

        (CLOSING, ABORT | RCV_RST | RCV_UNEXP_SYN) => CLOSED,
        (CLOSING, RCV_ACK) => TIME_WAIT,

        (TIME_WAIT, ABORT | TIMEOUT_2MSL | RCV_RST | RCV_UNEXP_SYN) => CLOSED,

        _ => return None,
    };

    Some(next)
}
