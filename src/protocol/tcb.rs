//! Transmission Control Block (TCB): the state variables of one connection and
//! the segment output routines built on top of them.
//!
//! Output routines never notify the congestion control algorithm themselves.
//! They return what they did (for example a [`SendReport`]) and the algorithm
//! wrappers in [`congestion`](super::congestion) do the bookkeeping (RTT
//! sampling, retransmission timer) from that.

use std::time::Duration;

use super::fsm::ConnectionState;
use super::headers::{SackBlock, TcpHeader, TcpOption};
use super::host::{AppId, ConnId, Host};
use super::rcv_queue::ReceiveQueue;
use super::sack_queue::SackRetransmitQueue;
use super::segment::TcpSegment;
use super::send_queue::SendQueue;
use super::seq::{seq_ge, seq_gt, seq_in_range, seq_le, seq_lt, seq_max, seq_min};
use super::socket::Socket;
use super::timer::{TimerKind, TimerSlot};
use crate::config::{DEFAULT_MSS, TCP_MAX_WIN, TCP_MAX_WIN_SCALED, TcpConfig};
use crate::{debug, warn};

/// Most SACK blocks remembered for reporting to the peer.
pub const MAX_SACK_BLOCKS: usize = 60;

/// Largest window scale shift allowed by RFC 1323.
pub const MAX_WINDOW_SCALE: u8 = 14;

/// Duplicate acknowledgments that trigger fast retransmit.
pub const DUPTHRESH: u32 = 3;

/// RFC 1323 (4.2.3)
///
/// If a connection stays idle for more than 24 days, the timestamp clock of
/// the peer may have wrapped and `TS.Recent` must be considered invalid.
pub const PAWS_IDLE_TIME_THRESH: Duration = Duration::from_secs(24 * 24 * 60 * 60);

/// Send Sequence Space.
///
/// (RFC 793 3.2)
///
/// ```text
///                   1         2          3          4
///              ----------|----------|----------|----------
///                     SND.UNA    SND.NXT    SND.UNA
///                                          +SND.WND
///
///        1 - old sequence numbers which have been acknowledged
///        2 - sequence numbers of unacknowledged data
///        3 - sequence numbers allowed for new data transmission
///        4 - future sequence numbers which are not yet allowed
/// ```
///
/// `max` is the highest sequence number ever sent. After a retransmission
/// timeout `nxt` is pulled back to `una` while `max` stays put.
#[derive(Debug, Default, Clone)]
pub struct SendSeqSpace {
    /// SND.UNA - send unacknowledged
    pub una: u32,
    /// SND.NXT - send next
    pub nxt: u32,
    /// SND.MAX - highest sequence number sent
    pub max: u32,
    /// SND.WND - send window, in bytes (already scaled)
    pub wnd: u32,
    /// SND.UP  - send urgent pointer
    pub up: u32,
    /// SND.WL1 - segment sequence number used for last window update
    pub wl1: u32,
    /// SND.WL2 - segment acknowledgment number used for last window update
    pub wl2: u32,
    /// ISS     - initial send sequence number
    pub iss: u32,
    /// Effective MSS for outgoing segments.
    pub mss: u32,
}

/// Receive Sequence Space.
///
/// (RFC 793 3.2)
///
/// ```text
///                       1          2          3
///                   ----------|----------|----------
///                          RCV.NXT    RCV.NXT
///                                    +RCV.WND
///
///        1 - old sequence numbers which have been acknowledged
///        2 - sequence numbers allowed for new reception
///        3 - future sequence numbers which are not yet allowed
/// ```
///
/// `adv` is the right edge of the last advertised window; it never moves left.
#[derive(Debug, Default, Clone)]
pub struct RecvSeqSpace {
    /// RCV.NXT - receive next
    pub nxt: u32,
    /// RCV.WND - receive window, in bytes (unscaled)
    pub wnd: u32,
    /// RCV.UP  - receive urgent pointer
    pub up: u32,
    /// IRS     - initial receive sequence number
    pub irs: u32,
    /// RCV.ADV - right edge of the advertised window
    pub adv: u32,
}

/// Connection termination bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct FinState {
    /// CLOSE was issued; a FIN goes out once the send queue drains.
    pub send_fin: bool,
    /// Sequence number occupied by our FIN.
    pub snd_fin_seq: u32,
    /// A FIN arrived above RCV.NXT and waits for the gap to fill.
    pub fin_rcvd: bool,
    /// Sequence number of the peer's FIN.
    pub rcv_fin_seq: u32,
    /// Our FIN has been acknowledged.
    pub fin_ack_rcvd: bool,
}

/// RFC 1323 and RFC 2018 negotiation state.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone)]
pub struct OptionState {
    pub ws_support: bool,
    pub ws_enabled: bool,
    /// Window scale option was sent.
    pub snd_ws: bool,
    /// Window scale option was received.
    pub rcv_ws: bool,
    /// Shift applied to windows received from the peer.
    pub snd_wnd_scale: u8,
    /// Shift applied to windows we advertise.
    pub rcv_wnd_scale: u8,

    pub ts_support: bool,
    pub ts_enabled: bool,
    /// Timestamp option was sent in our SYN.
    pub snd_initial_ts: bool,
    /// Timestamp option was received in the peer's SYN.
    pub rcv_initial_ts: bool,
    /// TS.Recent: timestamp to echo to the peer.
    pub ts_recent: u32,
    /// When `ts_recent` was last updated.
    pub ts_recent_age: Duration,

    pub sack_support: bool,
    pub sack_enabled: bool,
    /// SACK-Permitted option was sent.
    pub snd_sack_perm: bool,
    /// SACK-Permitted option was received.
    pub rcv_sack_perm: bool,
}

/// Receiver side of SACK: what the next ACK should report.
#[derive(Debug, Default, Clone)]
pub struct SackReport {
    /// An out-of-order segment arrived; report the block containing it.
    pub snd_sack: bool,
    /// A duplicate segment arrived; report it first as a D-SACK (RFC 2883).
    pub snd_dsack: bool,
    /// Range of the segment that triggered the report.
    pub trigger: Option<(u32, u32)>,
    /// Blocks reported so far, most recent first.
    pub blocks: Vec<SackBlock>,
}

/// Sender side of SACK-based loss recovery (RFC 3517).
#[allow(missing_docs)]
#[derive(Debug, Default, Clone)]
pub struct LossRecovery {
    pub active: bool,
    /// Highest sequence number outstanding when recovery started.
    pub recovery_point: Option<u32>,
    /// HighRxt: end of the highest retransmitted range.
    pub high_rxt: Option<u32>,
    /// Estimate of bytes outstanding in the network.
    pub pipe: u32,
    pub sacked_bytes: u32,
    pub sacked_bytes_old: u32,
}

/// Per-connection counters.
#[allow(missing_docs)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Statistics {
    pub rcv_out_of_order_segments: u64,
    pub rcv_unacceptable_segments: u64,
    pub rcv_queue_drops: u64,
    pub sack_blocks_sent: u64,
    pub sack_blocks_received: u64,
    pub dsacks_received: u64,
}

/// Timers driven by the connection itself rather than by the congestion
/// control algorithm.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy)]
pub struct ConnTimers {
    pub conn_estab: TimerSlot,
    pub fin_wait2: TimerSlot,
    pub two_msl: TimerSlot,
    pub syn_rexmit: TimerSlot,
}

impl Default for ConnTimers {
    fn default() -> Self {
        Self {
            conn_estab: TimerSlot::new(TimerKind::ConnEstab),
            fin_wait2: TimerSlot::new(TimerKind::FinWait2),
            two_msl: TimerSlot::new(TimerKind::TwoMsl),
            syn_rexmit: TimerSlot::new(TimerKind::SynRexmit),
        }
    }
}

impl ConnTimers {
    /// Cancels every connection timer.
    pub fn cancel_all(&mut self, host: &mut dyn Host) {
        self.conn_estab.cancel(host);
        self.fin_wait2.cancel(host);
        self.two_msl.cancel(host);
        self.syn_rexmit.cancel(host);
    }
}

/// Outcome of [`Tcb::send_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// SND.NXT before sending.
    pub old_snd_nxt: u32,
    /// Range sent below the previous SND.MAX, if any.
    pub retransmitted: Option<(u32, u32)>,
    /// HighRxt moved while sending.
    pub high_rxt_changed: bool,
}

/// Outcome of [`Tcb::send_segment_during_loss_recovery`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySend {
    pub from: u32,
    pub to: u32,
    pub retransmission: bool,
    pub high_rxt_changed: bool,
}

/// Transmission Control Block (TCB).
#[derive(Debug)]
#[allow(missing_docs)]
pub struct Tcb {
    pub app: AppId,
    pub conn: ConnId,
    /// Current state of the TCP connection.
    pub state: ConnectionState,
    /// Socket addresses of the host and remote TCPs.
    pub socket: Socket,
    pub config: TcpConfig,
    /// Connection was opened actively (or by OPEN_ACTIVE issued in LISTEN).
    pub active: bool,
    /// A listening connection stays in LISTEN and spins off a copy per SYN.
    pub fork: bool,

    pub snd: SendSeqSpace,
    pub rcv: RecvSeqSpace,
    pub fin: FinState,
    pub opts: OptionState,
    pub sack_report: SackReport,
    pub recovery: LossRecovery,
    pub stats: Statistics,

    pub syn_rexmit_count: u32,
    pub syn_rexmit_timeout: Duration,

    pub dupacks: u32,
    /// Full-sized segments received since the last ACK we sent.
    pub full_sized_segment_counter: u32,
    /// Next received segment must be acknowledged immediately.
    pub ack_now: bool,
    /// RCV.NXT carried by the last ACK we sent.
    pub last_ack_sent: u32,
    /// Retransmitting from SND.UNA after a timeout (go-back-N until SND.MAX).
    pub after_rto: bool,
    pub time_last_data_sent: Duration,

    pub max_rcv_buffer: u32,

    pub send_queue: SendQueue,
    pub receive_queue: ReceiveQueue,
    pub rexmit_queue: SackRetransmitQueue,
    pub timers: ConnTimers,
}

impl Tcb {
    /// Creates a TCB in the INIT state.
    pub fn new(app: AppId, conn: ConnId, config: TcpConfig) -> Self {
        let opts = OptionState {
            ws_support: config.window_scaling_support,
            ts_support: config.timestamp_support,
            sack_support: config.sack_support,
            ..Default::default()
        };

        let mut tcb = Self {
            app,
            conn,
            state: ConnectionState::INIT,
            socket: Socket::default(),
            active: false,
            fork: false,
            snd: SendSeqSpace {
                mss: config.mss,
                ..Default::default()
            },
            rcv: RecvSeqSpace {
                wnd: config.advertised_window,
                adv: config.advertised_window,
                ..Default::default()
            },
            fin: FinState::default(),
            opts,
            sack_report: SackReport::default(),
            recovery: LossRecovery::default(),
            stats: Statistics::default(),
            syn_rexmit_count: 0,
            syn_rexmit_timeout: Duration::ZERO,
            dupacks: 0,
            full_sized_segment_counter: 0,
            ack_now: false,
            last_ack_sent: 0,
            after_rto: false,
            time_last_data_sent: Duration::ZERO,
            max_rcv_buffer: config.advertised_window,
            send_queue: SendQueue::new(),
            receive_queue: ReceiveQueue::new(),
            rexmit_queue: SackRetransmitQueue::new(),
            timers: ConnTimers::default(),
            config,
        };

        tcb.opts.rcv_wnd_scale = tcb.wanted_rcv_wnd_scale();
        tcb
    }

    /// Copy of a listening TCB used when a listener forks on SYN arrival.
    pub fn clone_listening(&self, conn: ConnId) -> Self {
        let mut tcb = Self::new(self.app, conn, self.config.clone());
        tcb.state = ConnectionState::LISTEN;
        tcb.socket = self.socket;
        tcb.fork = self.fork;
        tcb
    }

    /// Smallest shift that lets the whole receive buffer be advertised.
    fn wanted_rcv_wnd_scale(&self) -> u8 {
        let mut scale = 0;

        while scale < MAX_WINDOW_SCALE && (self.max_rcv_buffer >> scale) > TCP_MAX_WIN {
            scale += 1;
        }

        scale
    }

    /// Selects the initial send sequence number from a clock that ticks
    /// every 4 microseconds (RFC 793 3.3), and initializes the send side.
    pub fn select_initial_seq_num(&mut self, now: Duration) {
        let iss = (now.as_micros() / 4) as u32;

        self.snd.iss = iss;
        self.snd.una = iss;
        self.snd.nxt = iss.wrapping_add(1);
        self.snd.max = iss.wrapping_add(1);

        self.send_queue.init(iss.wrapping_add(1));
        self.rexmit_queue.init(iss.wrapping_add(1));
    }

    /// Initializes the receive side from the peer's SYN.
    pub fn init_receive_side(&mut self, irs: u32) {
        self.rcv.irs = irs;
        self.rcv.nxt = irs.wrapping_add(1);
        self.rcv.adv = self.rcv.nxt.wrapping_add(self.rcv.wnd);
        self.receive_queue.init(self.rcv.nxt);
    }

    /// Recomputes which negotiated options are in effect once both SYNs have
    /// been seen.
    pub fn negotiate_options(&mut self) {
        let o = &mut self.opts;

        o.ws_enabled = o.ws_support && o.snd_ws && o.rcv_ws;
        o.ts_enabled = o.ts_support && o.snd_initial_ts && o.rcv_initial_ts;
        o.sack_enabled = o.sack_support && o.snd_sack_perm && o.rcv_sack_perm;

        if !o.ws_enabled {
            o.snd_wnd_scale = 0;
            o.rcv_wnd_scale = 0;
        }

        debug!(
            "[{}] ({}) negotiated options: ws={} ({}/{}) ts={} sack={} mss={}",
            self.socket,
            self.state,
            o.ws_enabled,
            o.snd_wnd_scale,
            o.rcv_wnd_scale,
            o.ts_enabled,
            o.sack_enabled,
            self.snd.mss
        );
    }

    /// Timestamp clock, in milliseconds.
    pub fn ts_clock(now: Duration) -> u32 {
        now.as_millis() as u32
    }

    /// Number of bytes sent but not yet acknowledged.
    pub fn bytes_in_flight(&self) -> u32 {
        self.snd.max.wrapping_sub(self.snd.una)
    }

    /// RFC 793 (3.3) segment acceptability test, preceded by the RFC 1323
    /// PAWS check when timestamps are in use.
    ///
    /// ```text
    ///     Segment Receive  Test
    ///     Length  Window
    ///     ------- -------  -------------------------------------------
    ///        0       0     SEG.SEQ = RCV.NXT
    ///        0      >0     RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
    ///       >0       0     not acceptable
    ///       >0      >0     RCV.NXT =< SEG.SEQ < RCV.NXT+RCV.WND
    ///                   or RCV.NXT =< SEG.SEQ+SEG.LEN-1 < RCV.NXT+RCV.WND
    /// ```
    ///
    /// An empty segment may also sit on the right edge of the window. An
    /// empty segment failing the test is still accepted if it carries an
    /// acceptable ACK (`SND.UNA < SEG.ACK =< SND.NXT`, or `SND.MAX` after a
    /// retransmission timeout pulled SND.NXT back), so that ACKs from a peer
    /// that rewound its own SND.NXT are not lost.
    pub fn is_segment_acceptable(&self, seg: &TcpSegment, now: Duration) -> bool {
        if self.opts.ts_enabled && !seg.header.rst() {
            if let Some((tsval, _)) = seg.header.timestamp() {
                let stale = seq_lt(tsval, self.opts.ts_recent);
                let idle = now.saturating_sub(self.opts.ts_recent_age);

                if stale && idle <= PAWS_IDLE_TIME_THRESH {
                    debug!(
                        "[{}] ({}) PAWS: TSval {} older than TS.Recent {}",
                        self.socket, self.state, tsval, self.opts.ts_recent
                    );
                    return false;
                }
            }
        }

        let seq = seg.seq();
        let len = seg.seg_len();
        let wnd = self.rcv.wnd;
        let nxt = self.rcv.nxt;
        let nxt_wnd = nxt.wrapping_add(wnd);

        let in_window = match (len, wnd) {
            (0, 0) => seq == nxt,
            (0, _) => seq_le(nxt, seq) && seq_le(seq, nxt_wnd),
            (_, 0) => false,
            (_, _) => {
                seq_in_range(nxt, seq, nxt_wnd)
                    || seq_in_range(nxt, seq.wrapping_add(len - 1), nxt_wnd)
            }
        };

        if in_window || len != 0 || !seg.header.ack() || seg.header.rst() {
            return in_window;
        }

        let ack = seg.ack();
        let limit = if self.after_rto { self.snd.max } else { self.snd.nxt };

        seq_lt(self.snd.una, ack) && seq_le(ack, limit)
    }

    /// Recomputes RCV.WND from the free receive buffer.
    ///
    /// Silly window avoidance: a window smaller than both a quarter of the
    /// buffer and one MSS is advertised as zero. The right edge previously
    /// advertised is never retracted.
    pub fn update_rcv_wnd(&mut self) {
        let mut win = self.receive_queue.free_bytes(self.max_rcv_buffer);

        if win < self.max_rcv_buffer / 4 && win < self.snd.mss {
            win = 0;
        }

        if seq_gt(self.rcv.adv, self.rcv.nxt) {
            win = u32::max(win, self.rcv.adv.wrapping_sub(self.rcv.nxt));
        }

        let max_win = if self.opts.ws_enabled {
            u32::min(TCP_MAX_WIN << self.opts.rcv_wnd_scale, TCP_MAX_WIN_SCALED)
        } else {
            TCP_MAX_WIN
        };

        win = u32::min(win, max_win);

        if win > 0 && seq_ge(self.rcv.nxt.wrapping_add(win), self.rcv.adv) {
            self.rcv.adv = self.rcv.nxt.wrapping_add(win);
        }

        self.rcv.wnd = win;
    }

    /// Value for the window field of an outgoing segment. Windows in SYN
    /// segments are never scaled.
    fn window_field(&self, syn: bool) -> u16 {
        let shift = if syn || !self.opts.ws_enabled {
            0
        } else {
            self.opts.rcv_wnd_scale
        };

        u32::min(self.rcv.wnd >> shift, TCP_MAX_WIN) as u16
    }

    /// Send window advertised by `seg`, scaled unless it is a SYN.
    pub fn segment_window(&self, seg: &TcpSegment) -> u32 {
        let wnd = seg.header.window() as u32;

        if seg.header.syn() || !self.opts.ws_enabled {
            wnd
        } else {
            wnd << self.opts.snd_wnd_scale
        }
    }

    /// RFC 793 (3.9)
    ///
    /// If SND.WL1 < SEG.SEQ or (SND.WL1 = SEG.SEQ and SND.WL2 =< SEG.ACK),
    /// set SND.WND <- SEG.WND, set SND.WL1 <- SEG.SEQ, and set
    /// SND.WL2 <- SEG.ACK.
    ///
    /// A pure window increase carrying the same acknowledgment is accepted
    /// too.
    pub fn update_wnd_info(&mut self, seg: &TcpSegment) {
        if !seg.header.ack() {
            return;
        }

        let seq = seg.seq();
        let ack = seg.ack();
        let wnd = self.segment_window(seg);

        if seq_lt(self.snd.wl1, seq)
            || (self.snd.wl1 == seq && seq_le(self.snd.wl2, ack))
            || (self.snd.wl2 == ack && wnd > self.snd.wnd)
        {
            self.snd.wnd = wnd;
            self.snd.wl1 = seq;
            self.snd.wl2 = ack;
        }
    }

    fn header(&self, seq: u32) -> TcpHeader {
        TcpHeader::new(self.socket.local.port, self.socket.remote.port, seq, 0)
    }

    /// Fills in options, logs the segment and hands it to the host.
    fn emit(&mut self, host: &mut dyn Host, mut seg: TcpSegment) {
        self.write_header_options(&mut seg.header, host.now());

        debug!("[{}] ({}) sending {}", self.socket, self.state, seg);

        host.send_segment(seg, self.socket.local.addr, self.socket.remote.addr);
    }

    /// `<SEQ=ISS><CTL=SYN>`
    pub fn send_syn(&mut self, host: &mut dyn Host) {
        let mut h = self.header(self.snd.iss);
        h.set_syn();

        self.update_rcv_wnd();
        h.set_window(self.window_field(true));

        self.snd.nxt = self.snd.iss.wrapping_add(1);
        self.snd.max = self.snd.nxt;

        self.emit(host, TcpSegment::new(h, &[]));
    }

    /// `<SEQ=ISS><ACK=RCV.NXT><CTL=SYN,ACK>`
    pub fn send_syn_ack(&mut self, host: &mut dyn Host) {
        let mut h = self.header(self.snd.iss);
        h.set_syn();
        h.set_ack();
        h.set_ack_number(self.rcv.nxt);

        self.update_rcv_wnd();
        h.set_window(self.window_field(true));

        self.snd.nxt = self.snd.iss.wrapping_add(1);
        self.snd.max = self.snd.nxt;

        self.emit(host, TcpSegment::new(h, &[]));
    }

    /// `<SEQ=seq><CTL=RST>` on this connection's socket pair.
    pub fn send_rst(&mut self, host: &mut dyn Host, seq: u32) {
        Self::send_rst_to(host, seq, self.socket);
    }

    /// `<SEQ=seq><CTL=RST>` from `socket.local` to `socket.remote`, for
    /// segments that have no connection.
    pub fn send_rst_to(host: &mut dyn Host, seq: u32, socket: Socket) {
        let mut h = TcpHeader::new(socket.local.port, socket.remote.port, seq, 0);
        h.set_rst();

        let seg = TcpSegment::new(h, &[]);
        debug!("[{}] sending {}", socket, seg);

        host.send_segment(seg, socket.local.addr, socket.remote.addr);
    }

    /// `<SEQ=seq><ACK=ack><CTL=RST,ACK>` from `socket.local` to
    /// `socket.remote`.
    pub fn send_rst_ack_to(host: &mut dyn Host, seq: u32, ack: u32, socket: Socket) {
        let mut h = TcpHeader::new(socket.local.port, socket.remote.port, seq, 0);
        h.set_rst();
        h.set_ack();
        h.set_ack_number(ack);

        let seg = TcpSegment::new(h, &[]);
        debug!("[{}] sending {}", socket, seg);

        host.send_segment(seg, socket.local.addr, socket.remote.addr);
    }

    /// `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=ACK>`
    pub fn send_ack(&mut self, host: &mut dyn Host) {
        let mut h = self.header(self.snd.nxt);
        h.set_ack();
        h.set_ack_number(self.rcv.nxt);

        self.update_rcv_wnd();
        h.set_window(self.window_field(false));

        self.emit(host, TcpSegment::new(h, &[]));
    }

    /// `<SEQ=SND.NXT><ACK=RCV.NXT><CTL=FIN,ACK>`
    pub fn send_fin(&mut self, host: &mut dyn Host) {
        let mut h = self.header(self.snd.nxt);
        h.set_fin();
        h.set_ack();
        h.set_ack_number(self.rcv.nxt);

        self.update_rcv_wnd();
        h.set_window(self.window_field(false));

        self.emit(host, TcpSegment::new(h, &[]));
    }

    /// Sends up to `bytes` bytes starting at SND.NXT and advances SND.NXT.
    /// Attaches the FIN when the segment reaches the end of a closed send
    /// queue. Returns the data range sent.
    fn send_segment(&mut self, host: &mut dyn Host, bytes: u32) -> (u32, u32) {
        if self.opts.sack_enabled && self.after_rto {
            // Skip over data the receiver already holds or that was resent.
            let forward = self.rexmit_queue.check_for_sacked_or_rexmitted(self.snd.nxt);
            self.snd.nxt = self.snd.nxt.wrapping_add(forward);
        }

        let bytes = u32::min(bytes, self.send_queue.bytes_available(self.snd.nxt));
        let from = self.snd.nxt;
        let to = from.wrapping_add(bytes);

        let mut seg = self.send_queue.create_segment_with_bytes(from, bytes);
        seg.header = self.header(from);

        if self.opts.sack_enabled && bytes > 0 {
            self.rexmit_queue.enqueue_sent_data(from, to);
        }

        seg.header.set_ack();
        seg.header.set_ack_number(self.rcv.nxt);

        self.update_rcv_wnd();
        seg.header.set_window(self.window_field(false));

        self.snd.nxt = to;

        if self.after_rto && seq_ge(self.snd.nxt, self.snd.max) {
            self.after_rto = false;
        }

        if self.fin.send_fin && self.snd.nxt == self.fin.snd_fin_seq {
            seg.header.set_fin();
            self.snd.nxt = self.fin.snd_fin_seq.wrapping_add(1);
        }

        self.emit(host, seg);

        (from, to)
    }

    /// Sends as much buffered data as the send and congestion windows allow.
    ///
    /// With `full_segments_only` (Nagle's algorithm while data is
    /// outstanding) no sub-MSS segment is sent, unless it carries the FIN.
    /// Returns `None` if nothing was sent.
    pub fn send_data(
        &mut self,
        host: &mut dyn Host,
        full_segments_only: bool,
        cwnd: u32,
    ) -> Option<SendReport> {
        if !self.after_rto {
            self.snd.nxt = self.snd.max;
        }

        let old_high_rxt = self.rexmit_queue.highest_rexmitted_seq();
        let old_snd_nxt = self.snd.nxt;
        let old_snd_max = self.snd.max;
        let mss = self.snd.mss;

        let buffered = self.send_queue.bytes_available(self.snd.nxt);
        if buffered == 0 {
            return None;
        }

        let max_window = u32::min(self.snd.wnd, cwnd);
        let outstanding = self.snd.nxt.wrapping_sub(self.snd.una);

        if max_window <= outstanding {
            debug!(
                "[{}] ({}) window full: wnd={} cwnd={} outstanding={}",
                self.socket, self.state, self.snd.wnd, cwnd, outstanding
            );
            return None;
        }

        let effective_window = max_window - outstanding;
        let mut bytes_to_send = u32::min(effective_window, buffered);

        if full_segments_only && bytes_to_send < mss && buffered > effective_window {
            return None;
        }

        let mut sent_any = false;

        while bytes_to_send >= mss {
            let (from, to) = self.send_segment(host, mss);
            bytes_to_send -= to.wrapping_sub(from);
            sent_any = true;

            if to == from {
                break;
            }
        }

        if bytes_to_send > 0 {
            let remaining = self.send_queue.bytes_available(self.snd.nxt);
            let carries_fin = self.fin.send_fin
                && self.snd.nxt.wrapping_add(bytes_to_send) == self.fin.snd_fin_seq;

            if bytes_to_send == remaining && (!full_segments_only || carries_fin) {
                self.send_segment(host, bytes_to_send);
                sent_any = true;
            } else {
                debug!(
                    "[{}] ({}) holding {} bytes (window space or Nagle)",
                    self.socket, self.state, bytes_to_send
                );
            }
        }

        if !sent_any {
            return None;
        }

        self.snd.max = seq_max(self.snd.nxt, self.snd.max);

        let retransmitted = seq_lt(old_snd_nxt, old_snd_max)
            .then(|| (old_snd_nxt, seq_min(self.snd.nxt, old_snd_max)));

        Some(SendReport {
            old_snd_nxt,
            retransmitted,
            high_rxt_changed: old_high_rxt != self.rexmit_queue.highest_rexmitted_seq(),
        })
    }

    /// Sends one byte beyond the window to probe a zero window. Returns the
    /// probe's sequence number.
    pub fn send_probe(&mut self, host: &mut dyn Host) -> Option<u32> {
        self.snd.nxt = self.snd.max;

        if self.send_queue.bytes_available(self.snd.nxt) == 0 {
            debug!("[{}] ({}) nothing to probe with", self.socket, self.state);
            return None;
        }

        let (from, _) = self.send_segment(host, 1);
        self.snd.max = self.snd.nxt;

        Some(from)
    }

    /// Retransmits one segment starting at SND.UNA. Outside a timeout, SND.NXT
    /// is restored afterwards so new data continues where it left off.
    ///
    /// Returns the retransmitted range (a lone FIN counts as one byte).
    pub fn retransmit_one_segment(
        &mut self,
        host: &mut dyn Host,
        called_at_rto: bool,
    ) -> Option<(u32, u32)> {
        let old_snd_nxt = self.snd.nxt;

        self.snd.nxt = self.snd.una;

        let outstanding = self.snd.max.wrapping_sub(self.snd.nxt);
        let bytes = u32::min(
            u32::min(self.snd.mss, outstanding),
            self.send_queue.bytes_available(self.snd.nxt),
        );

        let fin_only = bytes == 0 && self.fin.send_fin && self.snd.una == self.fin.snd_fin_seq;
        if bytes == 0 && !fin_only {
            self.snd.nxt = old_snd_nxt;
            return None;
        }

        let (from, to) = self.send_segment(host, bytes);
        let to = if fin_only { to.wrapping_add(1) } else { to };

        if !called_at_rto && seq_gt(old_snd_nxt, self.snd.nxt) {
            self.snd.nxt = old_snd_nxt;
        }

        if self.opts.sack_enabled {
            self.recovery.high_rxt = self.rexmit_queue.highest_rexmitted_seq();
        }

        Some((from, to))
    }

    /// Go-back-N: retransmits everything from SND.UNA to SND.MAX in MSS-sized
    /// segments, stopping after the FIN.
    pub fn retransmit_data(&mut self, host: &mut dyn Host) -> Option<(u32, u32)> {
        self.snd.nxt = self.snd.una;

        let start = self.snd.nxt;
        let mut bytes = self.snd.max.wrapping_sub(self.snd.nxt);

        if bytes == 0 {
            return None;
        }

        while bytes > 0 {
            let chunk = u32::min(bytes, self.snd.mss);
            let before = self.snd.nxt;

            self.send_segment(host, chunk);

            let advanced = self.snd.nxt.wrapping_sub(before);
            if advanced == 0 || (self.fin.send_fin && self.snd.nxt == self.fin.snd_fin_seq.wrapping_add(1)) {
                break;
            }

            bytes = bytes.saturating_sub(advanced);
        }

        Some((start, self.snd.nxt))
    }

    /// RFC 3042 limited transmit: sends one new segment on each of the first
    /// two duplicate ACKs, allowing the flight to exceed cwnd by two segments.
    /// Returns the old SND.NXT if a segment went out.
    pub fn send_one_new_segment(
        &mut self,
        host: &mut dyn Host,
        full_segments_only: bool,
        cwnd: u32,
    ) -> Option<u32> {
        if self.opts.sack_enabled && self.recovery.sacked_bytes == self.recovery.sacked_bytes_old {
            // RFC 3517: a duplicate ACK without new SACK information does not
            // release new data.
            return None;
        }

        let mss = self.snd.mss;
        let buffered = self.send_queue.bytes_available(self.snd.max);

        if buffered == 0 || (full_segments_only && buffered < mss) {
            return None;
        }

        let outstanding = self.bytes_in_flight();

        if outstanding + mss > self.snd.wnd || outstanding + mss > cwnd + 2 * mss {
            return None;
        }

        let window = u32::min(self.snd.wnd, cwnd) + 2 * mss;
        let bytes = u32::min(window.saturating_sub(outstanding), mss);

        if bytes == 0 {
            return None;
        }

        let old_snd_nxt = self.snd.nxt;

        self.snd.nxt = self.snd.max;
        let (from, _) = self.send_segment(host, bytes);
        self.snd.max = seq_max(self.snd.nxt, self.snd.max);

        if self.after_rto {
            self.snd.nxt = old_snd_nxt;
        }

        Some(from)
    }

    /// RFC 3517 IsLost(SeqNum): at least DupThresh discontiguous SACKed
    /// sequences, or more than (DupThresh - 1) * SMSS SACKed bytes, above
    /// `seq`.
    pub fn is_lost(&self, seq: u32) -> bool {
        self.rexmit_queue.num_discontiguous_sacks(seq) >= DUPTHRESH
            || self.rexmit_queue.sacked_bytes_from(seq) >= DUPTHRESH * self.snd.mss
    }

    /// RFC 3517 SetPipe(): estimates the bytes outstanding in the network.
    pub fn set_pipe(&mut self) {
        let mss = self.snd.mss;
        let high_rxt = self.rexmit_queue.highest_rexmitted_seq();

        self.recovery.high_rxt = high_rxt;

        let mut pipe = 0;
        let mut s = self.snd.una;

        while seq_lt(s, self.snd.max) {
            if !self.rexmit_queue.is_sacked(s) {
                if !self.is_lost(s) {
                    pipe += 1;
                }

                if high_rxt.is_some_and(|h| seq_lt(s, h)) {
                    pipe += 1;
                }
            }

            s = s.wrapping_add(mss);
        }

        self.recovery.pipe = pipe * mss;
    }

    /// RFC 3517 NextSeg(): sequence number of the next segment to send during
    /// loss recovery.
    pub fn next_seg(&self) -> Option<u32> {
        let mss = self.snd.mss;
        let high_rxt = self.recovery.high_rxt;
        let above_high_rxt = |s: u32| high_rxt.is_none_or(|h| seq_ge(s, h));

        let highest_sacked = self.rexmit_queue.highest_sacked_seq();

        let candidates = || {
            let mut out = Vec::new();

            if let Some(highest) = highest_sacked {
                let mut s = self.snd.una;

                while seq_lt(s, highest) {
                    if !self.rexmit_queue.is_sacked(s) && above_high_rxt(s) {
                        out.push(s);
                    }

                    s = s.wrapping_add(mss);
                }
            }

            out
        };

        let holes = candidates();

        // (1) A lost, not yet retransmitted hole below the highest SACK.
        if let Some(&s) = holes.iter().find(|&&s| self.is_lost(s)) {
            return Some(s);
        }

        // (2) New data, if the receiver's window allows a full segment.
        if self.send_queue.bytes_available(self.snd.max) > 0
            && self.snd.wnd.saturating_sub(self.recovery.pipe) >= mss
        {
            return Some(self.snd.max);
        }

        // (3) Any remaining hole below the highest SACK.
        holes.first().copied()
    }

    /// Sends one segment at `seq` during SACK loss recovery.
    pub fn send_segment_during_loss_recovery(
        &mut self,
        host: &mut dyn Host,
        seq: u32,
    ) -> RecoverySend {
        let old_high_rxt = self.rexmit_queue.highest_rexmitted_seq();

        self.snd.nxt = seq;
        let (from, to) = self.send_segment(host, self.snd.mss);

        let retransmission = seq_le(to, self.snd.max);
        if retransmission {
            self.recovery.high_rxt = self.rexmit_queue.highest_rexmitted_seq();
        } else {
            self.snd.max = seq_max(self.snd.nxt, self.snd.max);
        }

        RecoverySend {
            from,
            to,
            retransmission,
            high_rxt_changed: old_high_rxt != self.rexmit_queue.highest_rexmitted_seq(),
        }
    }

    /// Processes the options of an arriving segment. MSS, window scale,
    /// SACK-Permitted, and the initial timestamp are only honored on a SYN
    /// received in LISTEN or SYN-SENT.
    pub fn read_header_options(&mut self, seg: &TcpSegment, now: Duration) {
        let h = &seg.header;
        let in_handshake = h.syn()
            && matches!(
                self.state,
                ConnectionState::LISTEN | ConnectionState::SYN_SENT
            );

        if in_handshake {
            self.read_syn_options(h, now);
        }

        if !in_handshake && self.opts.ts_enabled {
            if let Some((tsval, _)) = h.timestamp() {
                // RFC 1323 (4.2.1): only a segment covering Last.ACK.sent may
                // update TS.Recent.
                if seq_le(seg.seq(), self.last_ack_sent) && seq_ge(tsval, self.opts.ts_recent) {
                    self.opts.ts_recent = tsval;
                    self.opts.ts_recent_age = now;
                }
            }
        }

        if self.opts.sack_enabled && !h.sack_blocks().is_empty() {
            self.process_sack_blocks(seg.ack(), h.sack_blocks());
        }
    }

    fn read_syn_options(&mut self, h: &TcpHeader, now: Duration) {
        match h.mss() {
            Some(mss) => {
                let mss = u32::min(self.config.mss, mss as u32);
                self.snd.mss = if mss == 0 { DEFAULT_MSS } else { mss };
            }
            None => self.snd.mss = u32::min(self.config.mss, DEFAULT_MSS),
        }

        if let Some(shift) = h.window_scale() {
            if shift > MAX_WINDOW_SCALE {
                warn!(
                    "[{}] ({}) peer window scale {} exceeds {}, using {}",
                    self.socket, self.state, shift, MAX_WINDOW_SCALE, MAX_WINDOW_SCALE
                );
            }

            self.opts.rcv_ws = true;
            self.opts.snd_wnd_scale = u8::min(shift, MAX_WINDOW_SCALE);
        }

        if h.sack_permitted() {
            self.opts.rcv_sack_perm = true;
        }

        if let Some((tsval, _)) = h.timestamp() {
            self.opts.rcv_initial_ts = true;
            self.opts.ts_recent = tsval;
            self.opts.ts_recent_age = now;
        }
    }

    /// Marks SACKed ranges on the retransmission scoreboard.
    fn process_sack_blocks(&mut self, ack: u32, blocks: &[SackBlock]) {
        self.stats.sack_blocks_received += blocks.len() as u64;

        // RFC 2883 (4): the first block is a D-SACK if it lies below the
        // cumulative ACK or inside the second block.
        if let Some(first) = blocks.first() {
            let below_ack = seq_le(first.end, ack);
            let inside_second = blocks
                .get(1)
                .is_some_and(|b| seq_ge(first.start, b.start) && seq_le(first.end, b.end));

            if below_ack || inside_second {
                self.stats.dsacks_received += 1;
                debug!(
                    "[{}] ({}) received D-SACK [{}, {})",
                    self.socket, self.state, first.start, first.end
                );
            }
        }

        for b in blocks {
            if seq_lt(b.start, b.end) && seq_ge(b.start, self.snd.una) {
                self.rexmit_queue.set_sacked_bit(b.start, b.end);
            }
        }

        self.recovery.sacked_bytes_old = self.recovery.sacked_bytes;
        self.recovery.sacked_bytes = self.rexmit_queue.total_sacked_bytes();
    }

    /// Appends the options appropriate for the segment being sent. If they do
    /// not fit in the 40 bytes of option space, the segment goes out without
    /// options.
    fn write_header_options(&mut self, h: &mut TcpHeader, now: Duration) {
        let mut options = Vec::new();

        if h.syn() {
            // A SYN+ACK only echoes what the peer's SYN offered.
            let answering = h.ack();

            options.push(TcpOption::Mss(self.config.mss as u16));

            if self.opts.ws_support && (!answering || self.opts.rcv_ws) {
                options.push(TcpOption::Nop);
                options.push(TcpOption::WindowScale(self.opts.rcv_wnd_scale));
                self.opts.snd_ws = true;
            }

            if self.opts.sack_support && (!answering || self.opts.rcv_sack_perm) {
                options.push(TcpOption::Nop);
                options.push(TcpOption::Nop);
                options.push(TcpOption::SackPermitted);
                self.opts.snd_sack_perm = true;
            }

            if self.opts.ts_support && (!answering || self.opts.rcv_initial_ts) {
                options.push(TcpOption::Nop);
                options.push(TcpOption::Nop);
                options.push(TcpOption::Timestamp {
                    value: Self::ts_clock(now),
                    echo_reply: if answering { self.opts.ts_recent } else { 0 },
                });
                self.opts.snd_initial_ts = true;
            }
        } else {
            if self.opts.ts_enabled {
                options.push(TcpOption::Nop);
                options.push(TcpOption::Nop);
                options.push(TcpOption::Timestamp {
                    value: Self::ts_clock(now),
                    echo_reply: self.opts.ts_recent,
                });
            }

            let reports_sacks = matches!(
                self.state,
                ConnectionState::SYN_RCVD
                    | ConnectionState::ESTABLISHED
                    | ConnectionState::FIN_WAIT_1
                    | ConnectionState::FIN_WAIT_2
            );

            if self.opts.sack_enabled
                && reports_sacks
                && (self.sack_report.snd_sack || self.sack_report.snd_dsack)
            {
                let used: usize = options.iter().map(TcpOption::len).sum();
                // Two NOPs plus the kind and length bytes.
                let room = TcpHeader::MAX_OPTIONS_LEN.saturating_sub(used + 4) / SackBlock::LEN;

                let blocks = self.sack_blocks_to_send(room);
                if !blocks.is_empty() {
                    self.stats.sack_blocks_sent += blocks.len() as u64;
                    options.push(TcpOption::Nop);
                    options.push(TcpOption::Nop);
                    options.push(TcpOption::Sack(blocks));
                }
            }
        }

        for option in options {
            if let Err(e) = h.push_option(option) {
                warn!(
                    "[{}] ({}) dropping options from outgoing segment: {}",
                    self.socket, self.state, e
                );
                h.clear_options();
                return;
            }
        }
    }

    /// Builds the SACK blocks for an outgoing ACK (RFC 2018 4, RFC 2883 4)
    /// and resets the pending-report flags.
    ///
    /// The first block reports the segment that triggered the ACK (or the
    /// duplicate, for a D-SACK); the rest repeat the most recently reported
    /// blocks.
    fn sack_blocks_to_send(&mut self, room: usize) -> Vec<SackBlock> {
        let rcv_nxt = self.rcv.nxt;
        let report = &mut self.sack_report;

        report.blocks.retain(|b| seq_gt(b.end, rcv_nxt));

        let mut out: Vec<SackBlock> = Vec::with_capacity(room);
        let mut first_regular = None;

        match report.trigger {
            Some((start, end)) if report.snd_dsack => {
                let end = if seq_lt(start, rcv_nxt) && seq_gt(end, rcv_nxt) {
                    rcv_nxt
                } else {
                    end
                };
                out.push(SackBlock::new(start, end));

                // Duplicate data inside a larger out-of-order block: that
                // block follows the D-SACK.
                if seq_ge(start, rcv_nxt) {
                    let left = self.receive_queue.left_edge(start);
                    let right = self.receive_queue.right_edge(start);
                    if seq_lt(left, right) && (left != start || right != end) {
                        first_regular = Some(SackBlock::new(left, right));
                    }
                }
            }
            Some((start, _)) if report.snd_sack => {
                let left = self.receive_queue.left_edge(start);
                let right = self.receive_queue.right_edge(start);
                if seq_lt(left, right) {
                    first_regular = Some(SackBlock::new(left, right));
                }
            }
            _ => {}
        }

        let mut regular: Vec<SackBlock> = Vec::with_capacity(report.blocks.len() + 1);
        regular.extend(first_regular);

        for b in &report.blocks {
            let covered = regular
                .iter()
                .any(|r| seq_le(r.start, b.start) && seq_ge(r.end, b.end));
            if !covered {
                regular.push(*b);
            }
        }

        regular.truncate(MAX_SACK_BLOCKS);
        report.blocks = regular;

        out.extend(report.blocks.iter().copied());
        out.truncate(room);

        report.snd_sack = false;
        report.snd_dsack = false;
        report.trigger = None;

        out
    }

    /// Records that an ACK for the current RCV.NXT went out.
    pub fn mark_ack_sent(&mut self) {
        self.full_sized_segment_counter = 0;
        self.ack_now = false;
        self.last_ack_sent = self.rcv.nxt;
    }

    /// Out-of-order data remains buffered above RCV.NXT.
    pub fn has_out_of_order_data(&self) -> bool {
        self.receive_queue
            .regions()
            .any(|(begin, _)| seq_gt(begin, self.rcv.nxt))
    }
}
