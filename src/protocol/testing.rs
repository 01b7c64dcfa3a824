//! Recording [`Host`] for unit tests.

use std::time::Duration;

use super::host::{AppId, ConnId, Host, Indication};
use super::segment::TcpSegment;
use super::timer::{Timer, TimerHandle, TimerKind};

#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub now: Duration,
    next_handle: u64,
    pub timers: Vec<(TimerHandle, Duration, Timer)>,
    pub sent: Vec<(TcpSegment, [u8; 4], [u8; 4])>,
    pub indications: Vec<(AppId, ConnId, Indication)>,
}

impl RecordingHost {
    /// Pending timer of the given kind, if any.
    pub fn timer(&self, kind: TimerKind) -> Option<(TimerHandle, Duration)> {
        self.timers
            .iter()
            .find(|(_, _, t)| t.kind == kind)
            .map(|(h, d, _)| (*h, *d))
    }

    /// Removes the pending timer of the given kind, as the scheduler does
    /// when it expires, and returns its handle.
    pub fn expire(&mut self, kind: TimerKind) -> Option<TimerHandle> {
        let pos = self.timers.iter().position(|(_, _, t)| t.kind == kind)?;
        let (handle, deadline, _) = self.timers.remove(pos);
        self.now = self.now.max(deadline);
        Some(handle)
    }

    pub fn last_sent(&self) -> &TcpSegment {
        &self.sent.last().expect("no segment sent").0
    }
}

impl Host for RecordingHost {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule_at(&mut self, deadline: Duration, timer: Timer) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.timers.push((handle, deadline, timer));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.retain(|(h, _, _)| *h != handle);
    }

    fn send_segment(&mut self, segment: TcpSegment, src: [u8; 4], dst: [u8; 4]) {
        self.sent.push((segment, src, dst));
    }

    fn indicate(&mut self, app: AppId, conn: ConnId, indication: Indication) {
        self.indications.push((app, conn, indication));
    }
}
