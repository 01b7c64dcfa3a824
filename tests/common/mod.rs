#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use tcp::{
    AppId, Command, ConnId, ConnectionManager, Host, Indication, SocketAddr, TcpConfig,
    TcpSegment, Timer, TimerHandle, TimerKind,
};

pub const A_ADDR: [u8; 4] = [10, 0, 0, 1];
pub const B_ADDR: [u8; 4] = [10, 0, 0, 2];

pub const CLIENT: AppId = AppId(1);
pub const SERVER: AppId = AppId(2);

/// Host with a manual clock, a timer table, and captured output.
#[derive(Debug, Default)]
pub struct MockHost {
    pub now: Duration,
    next_handle: u64,
    pub timers: BTreeMap<TimerHandle, (Duration, Timer)>,
    pub sent: Vec<(TcpSegment, [u8; 4], [u8; 4])>,
    pub indications: Vec<(AppId, ConnId, Indication)>,
}

impl MockHost {
    /// Earliest pending timer.
    pub fn next_timer(&self) -> Option<(TimerHandle, Duration, Timer)> {
        self.timers
            .iter()
            .min_by_key(|(handle, (deadline, _))| (*deadline, **handle))
            .map(|(h, (d, t))| (*h, *d, *t))
    }

    /// Pending timer of the given kind for `conn`.
    pub fn timer(&self, conn: ConnId, kind: TimerKind) -> Option<Duration> {
        self.timers
            .values()
            .find(|(_, t)| t.conn == conn && t.kind == kind)
            .map(|(d, _)| *d)
    }

    /// Fires the earliest pending timer, advancing the clock to its deadline.
    pub fn fire_next(&mut self, mgr: &mut ConnectionManager) -> Option<Timer> {
        let (handle, deadline, timer) = self.next_timer()?;

        self.timers.remove(&handle);
        self.now = self.now.max(deadline);
        mgr.process_timer(self, handle, timer);

        Some(timer)
    }

    /// Fires pending timers of `kind` until none is left or `limit` fired.
    pub fn fire_all(&mut self, mgr: &mut ConnectionManager, kind: TimerKind, limit: usize) -> usize {
        let mut fired = 0;

        while fired < limit {
            let Some((handle, deadline, timer)) = self
                .timers
                .iter()
                .filter(|(_, (_, t))| t.kind == kind)
                .min_by_key(|(_, (d, _))| *d)
                .map(|(h, (d, t))| (*h, *d, *t))
            else {
                break;
            };

            self.timers.remove(&handle);
            self.now = self.now.max(deadline);
            mgr.process_timer(self, handle, timer);
            fired += 1;
        }

        fired
    }

    pub fn received(&self, conn: ConnId) -> Vec<u8> {
        self.indications
            .iter()
            .filter(|(_, c, _)| *c == conn)
            .filter_map(|(_, _, i)| match i {
                Indication::Data(d) => Some(d.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn indicated(&self, conn: ConnId, wanted: &Indication) -> bool {
        self.indications
            .iter()
            .any(|(_, c, i)| *c == conn && i == wanted)
    }
}

impl Host for MockHost {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule_at(&mut self, deadline: Duration, timer: Timer) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.timers.insert(handle, (deadline, timer));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }

    fn send_segment(&mut self, segment: TcpSegment, src: [u8; 4], dst: [u8; 4]) {
        self.sent.push((segment, src, dst));
    }

    fn indicate(&mut self, app: AppId, conn: ConnId, indication: Indication) {
        self.indications.push((app, conn, indication));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

struct InFlight {
    arrival: Duration,
    to: Side,
    raw: Vec<u8>,
    src: [u8; 4],
    dst: [u8; 4],
}

/// Decides whether a segment sent by a side is lost.
pub type DropRule = Box<dyn FnMut(Side, &TcpSegment) -> bool>;

/// Two TCP instances joined by a link with a fixed one-way delay. Segments
/// cross the link in wire format.
pub struct Net {
    pub a: ConnectionManager,
    pub b: ConnectionManager,
    pub ha: MockHost,
    pub hb: MockHost,
    pub delay: Duration,
    /// Every segment put on the link, with its send time and sender.
    pub log: Vec<(Duration, Side, TcpSegment)>,
    in_flight: Vec<InFlight>,
    drop_rule: Option<DropRule>,
}

impl Net {
    pub fn new(config_a: TcpConfig, config_b: TcpConfig) -> Self {
        Self {
            a: ConnectionManager::new(config_a).unwrap(),
            b: ConnectionManager::new(config_b).unwrap(),
            ha: MockHost::default(),
            hb: MockHost::default(),
            delay: Duration::from_millis(10),
            log: Vec::new(),
            in_flight: Vec::new(),
            drop_rule: None,
        }
    }

    pub fn set_drop_rule(&mut self, rule: impl FnMut(Side, &TcpSegment) -> bool + 'static) {
        self.drop_rule = Some(Box::new(rule));
    }

    pub fn clear_drop_rule(&mut self) {
        self.drop_rule = None;
    }

    pub fn now(&self) -> Duration {
        self.ha.now
    }

    pub fn command(&mut self, side: Side, app: AppId, conn: ConnId, command: Command) -> tcp::Result<()> {
        let result = match side {
            Side::A => self.a.process_command(&mut self.ha, app, conn, command),
            Side::B => self.b.process_command(&mut self.hb, app, conn, command),
        };
        self.collect();
        result
    }

    /// Server listening on B port 80 (connection 1), client on A connecting
    /// from port 2000 (connection 1). Runs until the handshake completes.
    pub fn connect(&mut self) {
        self.command(
            Side::B,
            SERVER,
            ConnId(1),
            Command::OpenPassive {
                local: SocketAddr::new(B_ADDR, 80),
                fork: false,
                algorithm: None,
            },
        )
        .unwrap();
        self.command(
            Side::A,
            CLIENT,
            ConnId(1),
            Command::OpenActive {
                local: SocketAddr::new(A_ADDR, 2000),
                remote: SocketAddr::new(B_ADDR, 80),
                algorithm: None,
            },
        )
        .unwrap();

        self.run_for(Duration::from_millis(100));
    }

    /// Moves segments the hosts emitted onto the link.
    fn collect(&mut self) {
        let now = self.now();

        for (side, host) in [(Side::A, &mut self.ha), (Side::B, &mut self.hb)] {
            for (seg, src, dst) in host.sent.drain(..) {
                self.log.push((now, side, seg.clone()));

                if let Some(rule) = self.drop_rule.as_mut() {
                    if rule(side, &seg) {
                        continue;
                    }
                }

                let raw = seg.to_be_bytes(src, dst).unwrap();
                self.in_flight.push(InFlight {
                    arrival: now + self.delay,
                    to: if side == Side::A { Side::B } else { Side::A },
                    raw,
                    src,
                    dst,
                });
            }
        }
    }

    fn next_event(&self) -> Option<Duration> {
        let arrival = self.in_flight.iter().map(|f| f.arrival).min();
        let timer_a = self.ha.next_timer().map(|(_, d, _)| d);
        let timer_b = self.hb.next_timer().map(|(_, d, _)| d);

        [arrival, timer_a, timer_b].into_iter().flatten().min()
    }

    /// Processes the next arrival or timer expiry. Returns `false` when
    /// nothing is pending.
    pub fn step(&mut self) -> bool {
        let Some(at) = self.next_event() else {
            return false;
        };

        self.ha.now = self.ha.now.max(at);
        self.hb.now = self.hb.now.max(at);

        if let Some(pos) = self.in_flight.iter().position(|f| f.arrival == at) {
            let f = self.in_flight.remove(pos);
            let seg = TcpSegment::parse(&f.raw).unwrap();
            assert!(seg.header.is_valid_checksum(f.src, f.dst, &seg.payload));

            match f.to {
                Side::A => self.a.process_segment(&mut self.ha, &seg, f.src, f.dst),
                Side::B => self.b.process_segment(&mut self.hb, &seg, f.src, f.dst),
            }
        } else if self.ha.next_timer().is_some_and(|(_, d, _)| d == at) {
            self.ha.fire_next(&mut self.a);
        } else {
            self.hb.fire_next(&mut self.b);
        }

        self.collect();
        true
    }

    /// Runs every event due within `duration` from now.
    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now() + duration;

        while self.next_event().is_some_and(|t| t <= end) {
            self.step();
        }

        self.ha.now = self.ha.now.max(end);
        self.hb.now = self.hb.now.max(end);
    }

    /// Runs until `done` holds, giving up after `limit` of simulated time.
    pub fn run_until(&mut self, limit: Duration, mut done: impl FnMut(&Net) -> bool) -> bool {
        let end = self.now() + limit;

        while !done(self) {
            match self.next_event() {
                Some(t) if t <= end => {
                    self.step();
                }
                _ => return done(self),
            }
        }

        true
    }

    /// Data segments sent by `side`.
    pub fn data_sent_by(&self, side: Side) -> Vec<&TcpSegment> {
        self.log
            .iter()
            .filter(|(_, s, seg)| *s == side && seg.payload_len() > 0)
            .map(|(_, _, seg)| seg)
            .collect()
    }
}

/// Deterministic test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
