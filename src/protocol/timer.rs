//! Logical timers owned by a connection.
//!
//! Timers are single-shot deadlines registered with the host scheduler. The
//! engine only ever holds the [`TimerHandle`] returned by
//! [`Host::schedule_at`](crate::Host::schedule_at); when the deadline passes
//! the host hands the handle and its [`Timer`] back to
//! [`ConnectionManager::process_timer`](crate::ConnectionManager::process_timer).

use std::fmt;
use std::time::Duration;

use super::host::{AppId, ConnId, Host};

/// Opaque identifier for a scheduled timer, issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// The logical timers a connection may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Connection establishment must complete before it fires.
    ConnEstab,
    /// Bounds the time spent in FIN-WAIT-2.
    FinWait2,
    /// TIME-WAIT quiet period (2 * MSL).
    TwoMsl,
    /// SYN / SYN+ACK retransmission.
    SynRexmit,
    /// Data retransmission.
    Rexmit,
    /// Zero-window probing.
    Persist,
    /// Delayed acknowledgment.
    DelayedAck,
    /// Keep-alive.
    KeepAlive,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::ConnEstab => "CONN-ESTAB",
            TimerKind::FinWait2 => "FIN-WAIT-2",
            TimerKind::TwoMsl => "2MSL",
            TimerKind::SynRexmit => "SYN-REXMIT",
            TimerKind::Rexmit => "REXMIT",
            TimerKind::Persist => "PERSIST",
            TimerKind::DelayedAck => "DELAYED-ACK",
            TimerKind::KeepAlive => "KEEP-ALIVE",
        };

        write!(f, "{name}")
    }
}

/// A timer as seen by the host: which connection it belongs to and which of
/// its logical timers it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timer {
    /// Application owning the connection.
    pub app: AppId,
    /// Connection the timer belongs to.
    pub conn: ConnId,
    /// Logical timer.
    pub kind: TimerKind,
}

/// One logical timer of a connection.
///
/// Cancellation is idempotent, and a handle that no longer matches the slot
/// (because the timer was cancelled or rescheduled after the host queued its
/// expiry) is reported as stale by [`TimerSlot::fire`].
#[derive(Debug, Clone, Copy)]
pub struct TimerSlot {
    kind: TimerKind,
    handle: Option<TimerHandle>,
    deadline: Duration,
}

impl TimerSlot {
    /// Creates an idle slot for the given timer kind.
    pub const fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            handle: None,
            deadline: Duration::ZERO,
        }
    }

    /// Kind of timer held by this slot.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Returns `true` if the timer is pending.
    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    /// Deadline of the pending timer, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.handle.map(|_| self.deadline)
    }

    /// Schedules the timer `after` from now, replacing any pending instance.
    pub fn schedule(&mut self, host: &mut dyn Host, app: AppId, conn: ConnId, after: Duration) {
        self.cancel(host);

        let deadline = host.now() + after;
        let timer = Timer {
            app,
            conn,
            kind: self.kind,
        };

        self.handle = Some(host.schedule_at(deadline, timer));
        self.deadline = deadline;
    }

    /// Cancels the pending timer, if any.
    pub fn cancel(&mut self, host: &mut dyn Host) {
        if let Some(handle) = self.handle.take() {
            host.cancel(handle);
        }
    }

    /// Consumes an expiry delivered by the host. Returns `false` if `handle`
    /// is not the currently pending instance.
    pub fn fire(&mut self, handle: TimerHandle) -> bool {
        if self.handle == Some(handle) {
            self.handle = None;
            true
        } else {
            false
        }
    }
}
