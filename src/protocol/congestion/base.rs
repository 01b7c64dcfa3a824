use std::collections::VecDeque;
use std::time::Duration;

use crate::debug;
use crate::protocol::host::Host;
use crate::protocol::seq::{seq_ge, seq_in_range, seq_le, seq_lt};
use crate::protocol::tcb::{DUPTHRESH, SendReport, Tcb};
use crate::protocol::timer::{TimerKind, TimerSlot};

/// Consecutive retransmission timeouts after which the connection is aborted.
pub const MAX_REXMIT_COUNT: u32 = 12;

/// RTO bounds in seconds (RFC 6298 2.4, 2.5).
const MIN_REXMIT_TIMEOUT: f64 = 1.0;
const MAX_REXMIT_TIMEOUT: f64 = 240.0;

/// RFC 6298 (2.1): until a measurement is made, RTO <- 3 seconds.
const INITIAL_RTO: f64 = 3.0;
const INITIAL_RTTVAR: f64 = 0.75;

/// Persist timer bounds in seconds (RFC 1122 4.2.2.17).
const MIN_PERSIST_TIMEOUT: f64 = 5.0;
const MAX_PERSIST_TIMEOUT: f64 = 60.0;
const MAX_PERSIST_FACTOR: u32 = 64;

const DELAYED_ACK_TIMEOUT: Duration = Duration::from_millis(200);

/// RFC 3390 initial window: min(4*MSS, max(2*MSS, 4380 bytes)).
fn increased_initial_window(mss: u32) -> u32 {
    u32::min(4 * mss, u32::max(2 * mss, 4380))
}

/// One transmission of a range of sequence space, kept by algorithms that
/// need per-segment RTT samples.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentRange {
    pub begin: u32,
    pub end: u32,
    pub sent_at: Duration,
    pub transmits: u32,
}

/// Ordered log of [`SentRange`]s between SND.UNA and SND.MAX.
#[derive(Debug, Default)]
pub struct TransmitLog {
    ranges: VecDeque<SentRange>,
}

impl TransmitLog {
    fn record(&mut self, begin: u32, end: u32, now: Duration) {
        if !seq_lt(begin, end) {
            return;
        }

        let is_new = self.ranges.back().is_none_or(|r| seq_ge(begin, r.end));

        if is_new {
            self.ranges.push_back(SentRange {
                begin,
                end,
                sent_at: now,
                transmits: 1,
            });
        } else {
            self.retransmitted(begin, end, now);
        }
    }

    fn retransmitted(&mut self, begin: u32, end: u32, now: Duration) {
        for r in &mut self.ranges {
            if seq_lt(r.begin, end) && seq_lt(begin, r.end) {
                r.sent_at = now;
                r.transmits += 1;
            }
        }
    }

    /// Drops every range acknowledged by `una` and returns the latest of them.
    fn acked(&mut self, una: u32) -> Option<SentRange> {
        let mut last = None;

        while let Some(r) = self.ranges.front() {
            if !seq_le(r.end, una) {
                break;
            }
            last = self.ranges.pop_front();
        }

        last
    }

    /// Oldest range still unacknowledged.
    pub fn oldest(&self) -> Option<&SentRange> {
        self.ranges.front()
    }

    fn clear(&mut self) {
        self.ranges.clear();
    }
}

/// State and behavior common to every congestion control variant.
///
/// All output goes through the wrappers here so every transmission updates
/// the retransmission timer, the RTT measurement, and the delayed-ACK state.
#[derive(Debug)]
pub struct BaseAlgorithm {
    /// Congestion window in bytes.
    pub cwnd: u32,
    /// Slow start threshold in bytes.
    pub ssthresh: u32,

    /// Consecutive retransmission timeouts of the current segment.
    pub rexmit_count: u32,
    /// Total retransmission timeouts over the connection's lifetime.
    pub num_rtos: u64,

    rto: f64,
    srtt: f64,
    rttvar: f64,
    min_rtt: Option<Duration>,

    rtseq: u32,
    rtseq_sendtime: Option<Duration>,

    persist_factor: u32,
    persist_timeout: f64,

    transmit_log: Option<TransmitLog>,

    /// Retransmission timer (RFC 6298).
    pub rexmit_timer: TimerSlot,
    /// Zero-window probe timer.
    pub persist_timer: TimerSlot,
    /// Delayed acknowledgment timer.
    pub delayed_ack_timer: TimerSlot,
    /// Keep-alive timer; expiry has no effect.
    pub keepalive_timer: TimerSlot,
}

impl Default for BaseAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseAlgorithm {
    /// Fresh state with the RFC 6298 initial RTO.
    pub fn new() -> Self {
        Self {
            cwnd: 0,
            // RFC 5681 (3.1): the initial value of ssthresh SHOULD be set
            // arbitrarily high.
            ssthresh: u32::MAX,
            rexmit_count: 0,
            num_rtos: 0,
            rto: INITIAL_RTO,
            srtt: 0.0,
            rttvar: INITIAL_RTTVAR,
            min_rtt: None,
            rtseq: 0,
            rtseq_sendtime: None,
            persist_factor: 0,
            persist_timeout: MIN_PERSIST_TIMEOUT,
            transmit_log: None,
            rexmit_timer: TimerSlot::new(TimerKind::Rexmit),
            persist_timer: TimerSlot::new(TimerKind::Persist),
            delayed_ack_timer: TimerSlot::new(TimerKind::DelayedAck),
            keepalive_timer: TimerSlot::new(TimerKind::KeepAlive),
        }
    }

    pub(super) fn enable_transmit_log(&mut self) {
        self.transmit_log = Some(TransmitLog::default());
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        Duration::from_secs_f64(self.rto)
    }

    /// Smoothed round-trip time.
    pub fn srtt(&self) -> Duration {
        Duration::from_secs_f64(self.srtt)
    }

    /// Smallest RTT measured so far.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    /// Per-segment transmission log, when the variant keeps one.
    pub fn transmit_log(&self) -> Option<&TransmitLog> {
        self.transmit_log.as_ref()
    }

    pub(super) fn established(&mut self, tcb: &mut Tcb, host: &mut dyn Host, active: bool) {
        let mss = tcb.snd.mss;

        self.cwnd = if tcb.config.increased_iw_enabled && tcb.syn_rexmit_count == 0 {
            increased_initial_window(mss)
        } else {
            mss
        };

        debug!(
            "[{}] ({}) initial cwnd={} ssthresh={}",
            tcb.socket, tcb.state, self.cwnd, self.ssthresh
        );

        if active {
            // Complete the handshake, piggybacking the ACK on data if any.
            if !self.send_data(tcb, host) {
                self.send_ack(tcb, host);
            }
        }
    }

    pub(super) fn connection_closed(&mut self, host: &mut dyn Host) {
        self.rexmit_timer.cancel(host);
        self.persist_timer.cancel(host);
        self.delayed_ack_timer.cancel(host);
        self.keepalive_timer.cancel(host);

        if let Some(log) = &mut self.transmit_log {
            log.clear();
        }
    }

    /// Shared part of the retransmission timeout. Returns `false` once the
    /// segment has timed out [`MAX_REXMIT_COUNT`] times and the connection
    /// must be aborted.
    pub(super) fn process_rexmit_timer(&mut self, tcb: &mut Tcb, host: &mut dyn Host) -> bool {
        self.rexmit_count += 1;
        self.num_rtos += 1;

        if self.rexmit_count >= MAX_REXMIT_COUNT {
            debug!(
                "[{}] ({}) retransmission count exceeds {}, aborting",
                tcb.socket, tcb.state, MAX_REXMIT_COUNT
            );
            return false;
        }

        // RFC 6298 (5.5): back off the timer.
        self.rto = f64::min(self.rto * 2.0, MAX_REXMIT_TIMEOUT);
        self.start_rexmit_timer(tcb, host);

        // Karn's algorithm: no RTT sample from a retransmitted segment.
        self.rtseq_sendtime = None;

        debug!(
            "[{}] ({}) retransmission timeout #{}, new RTO {:.3}s",
            tcb.socket, tcb.state, self.rexmit_count, self.rto
        );

        if tcb.opts.sack_enabled {
            // RFC 3517 (5.1): after a timeout SACK information is no longer
            // trusted.
            tcb.rexmit_queue.reset_sacked_bits();
            tcb.rexmit_queue.reset_rexmitted_bits();
            tcb.recovery.high_rxt = None;

            if tcb.recovery.active {
                tcb.recovery.active = false;
                tcb.recovery.recovery_point = Some(tcb.snd.max);
            }
        }

        tcb.time_last_data_sent = host.now();

        true
    }

    pub(super) fn process_persist_timer(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.persist_factor = match self.persist_factor {
            0 => 1,
            f if f < MAX_PERSIST_FACTOR => f * 2,
            f => f,
        };

        self.persist_timeout = (self.persist_factor as f64 * 1.5)
            .clamp(MIN_PERSIST_TIMEOUT, MAX_PERSIST_TIMEOUT);

        self.persist_timer.schedule(
            host,
            tcb.app,
            tcb.conn,
            Duration::from_secs_f64(self.persist_timeout),
        );

        if let Some(from) = tcb.send_probe(host) {
            self.ack_sent(tcb, host);
            self.data_sent(tcb, host, from);
        }
    }

    pub(super) fn process_delayed_ack_timer(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        tcb.ack_now = true;
        self.send_ack(tcb, host);
    }

    pub(super) fn received_out_of_order_segment(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        // RFC 5681 (4.2): an out-of-order segment is acknowledged at once.
        tcb.ack_now = true;
        self.send_ack(tcb, host);
    }

    /// Delayed acknowledgments: at least every second full-sized segment and
    /// within 200 ms of the arrival of unacknowledged data (RFC 1122 4.2.3.2).
    pub(super) fn receive_seq_changed(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        if !tcb.config.delayed_acks_enabled
            || tcb.ack_now
            || tcb.full_sized_segment_counter >= 2
        {
            self.send_ack(tcb, host);
        } else if !self.delayed_ack_timer.is_scheduled() {
            self.delayed_ack_timer
                .schedule(host, tcb.app, tcb.conn, DELAYED_ACK_TIMEOUT);
        }
    }

    /// Shared part of the processing of an ACK advancing SND.UNA. Returns the
    /// per-segment RTT sample if the variant keeps a transmit log.
    pub(super) fn received_data_ack(
        &mut self,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) -> Option<Duration> {
        let now = host.now();

        if !tcb.opts.ts_enabled {
            if let Some(sent) = self.rtseq_sendtime {
                if seq_lt(self.rtseq, tcb.snd.una) {
                    self.rtt_measurement_complete(tcb, sent, now);
                    self.rtseq_sendtime = None;
                }
            }
        }

        let sample = self
            .transmit_log
            .as_mut()
            .and_then(|log| log.acked(tcb.snd.una))
            .filter(|r| r.transmits == 1)
            .map(|r| now.saturating_sub(r.sent_at));

        if let Some(rtt) = sample {
            self.note_rtt(rtt);
        }

        // RFC 6298 (5.2, 5.3)
        if tcb.snd.una == tcb.snd.max {
            self.rexmit_timer.cancel(host);
        } else {
            self.restart_rexmit_timer(tcb, host);
        }

        self.update_persist_timer(tcb, host);

        sample
    }

    /// A segment changed the send window without acknowledging new data.
    pub(super) fn window_updated(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.update_persist_timer(tcb, host);

        if tcb.snd.wnd > 0 {
            self.send_data(tcb, host);
        }
    }

    /// RFC 1122 (4.2.2.17): probe a zero window when nothing else would
    /// elicit a window update.
    fn update_persist_timer(&mut self, tcb: &Tcb, host: &mut dyn Host) {
        if tcb.snd.wnd > 0 {
            self.persist_timer.cancel(host);
            self.persist_factor = 0;
        } else if self.rexmit_timer.is_scheduled() {
            self.persist_timer.cancel(host);
            self.persist_factor = 0;
        } else if !self.persist_timer.is_scheduled()
            && tcb.send_queue.bytes_available(tcb.snd.max) > 0
        {
            self.persist_timer.schedule(
                host,
                tcb.app,
                tcb.conn,
                Duration::from_secs_f64(self.persist_timeout),
            );
        }
    }

    /// RFC 3042 limited transmit on the first two duplicate ACKs.
    pub(super) fn received_duplicate_ack(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        if tcb.config.limited_transmit_enabled && tcb.dupacks < DUPTHRESH {
            let full_segments_only = self.full_segments_only(tcb);

            if let Some(from) = tcb.send_one_new_segment(host, full_segments_only, self.cwnd) {
                self.ack_sent(tcb, host);
                self.data_sent(tcb, host, from);
            }
        }
    }

    pub(super) fn received_ack_for_data_not_yet_sent(
        &mut self,
        tcb: &mut Tcb,
        host: &mut dyn Host,
        seq: u32,
    ) {
        debug!(
            "[{}] ({}) ACK {} acknowledges data not yet sent (SND.MAX={})",
            tcb.socket, tcb.state, seq, tcb.snd.max
        );

        self.send_ack(tcb, host);
    }

    /// Nagle's algorithm (RFC 896): while data is unacknowledged only
    /// full-sized segments are sent.
    fn full_segments_only(&self, tcb: &Tcb) -> bool {
        tcb.config.nagle_enabled && tcb.snd.una != tcb.snd.max
    }

    /// Sends as much data as the windows allow. Returns whether anything was
    /// sent.
    pub fn send_data(&mut self, tcb: &mut Tcb, host: &mut dyn Host) -> bool {
        let now = host.now();

        // RFC 5681 (4.1): restart from the initial window after an idle
        // period longer than the RTO.
        if tcb.snd.una == tcb.snd.max
            && tcb.time_last_data_sent > Duration::ZERO
            && now.saturating_sub(tcb.time_last_data_sent) > self.rto()
        {
            let restart_window = if tcb.config.increased_iw_enabled {
                increased_initial_window(tcb.snd.mss)
            } else {
                tcb.snd.mss
            };

            if restart_window < self.cwnd {
                debug!(
                    "[{}] ({}) idle for longer than RTO, cwnd {} -> {}",
                    tcb.socket, tcb.state, self.cwnd, restart_window
                );
                self.cwnd = restart_window;
            }
        }

        let full_segments_only = self.full_segments_only(tcb);

        match tcb.send_data(host, full_segments_only, self.cwnd) {
            Some(report) => {
                self.after_send(tcb, host, report);
                true
            }
            None => false,
        }
    }

    fn after_send(&mut self, tcb: &mut Tcb, host: &mut dyn Host, report: SendReport) {
        self.ack_sent(tcb, host);

        if tcb.opts.sack_enabled && tcb.recovery.active && report.high_rxt_changed {
            self.restart_rexmit_timer(tcb, host);
        } else {
            self.data_sent(tcb, host, report.old_snd_nxt);
        }

        if let Some((from, to)) = report.retransmitted {
            self.segment_retransmitted(tcb, from, to, host.now());
        }
    }

    /// RFC 3517 (5) step (C): sends segments chosen by NextSeg() while
    /// cwnd - pipe >= 1 SMSS.
    pub fn send_data_during_loss_recovery(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        let mss = tcb.snd.mss;

        while self.cwnd.saturating_sub(tcb.recovery.pipe) >= mss {
            let Some(seq) = tcb.next_seg() else {
                break;
            };

            let sent = tcb.send_segment_during_loss_recovery(host, seq);

            // (C.4) pipe grows by the segment just sent.
            tcb.recovery.pipe += mss;

            self.ack_sent(tcb, host);

            if sent.retransmission {
                self.segment_retransmitted(tcb, sent.from, sent.to, host.now());
            }

            if sent.high_rxt_changed {
                self.restart_rexmit_timer(tcb, host);
            } else {
                self.data_sent(tcb, host, sent.from);
            }

            if sent.from == sent.to {
                break;
            }
        }
    }

    /// Retransmits the segment at SND.UNA.
    pub fn retransmit_one_segment(&mut self, tcb: &mut Tcb, host: &mut dyn Host, at_rto: bool) {
        if let Some((from, to)) = tcb.retransmit_one_segment(host, at_rto) {
            self.ack_sent(tcb, host);
            self.segment_retransmitted(tcb, from, to, host.now());
        }
    }

    /// Go-back-N retransmission of everything outstanding.
    pub fn retransmit_data(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        if let Some((from, to)) = tcb.retransmit_data(host) {
            self.ack_sent(tcb, host);
            self.segment_retransmitted(tcb, from, to, host.now());
        }
    }

    /// Sends an ACK and records it.
    pub fn send_ack(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        tcb.send_ack(host);
        self.ack_sent(tcb, host);
    }

    /// Sends a FIN and records the piggybacked ACK.
    pub fn send_fin(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        tcb.send_fin(host);
        self.ack_sent(tcb, host);
    }

    /// Every segment carries an ACK, so a pending delayed ACK is satisfied.
    fn ack_sent(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        tcb.mark_ack_sent();
        self.delayed_ack_timer.cancel(host);
    }

    /// New data beginning at `from` went out.
    fn data_sent(&mut self, tcb: &mut Tcb, host: &mut dyn Host, from: u32) {
        let now = host.now();

        // RFC 6298 (5.1)
        if !self.rexmit_timer.is_scheduled() {
            self.start_rexmit_timer(tcb, host);
        }

        if !tcb.opts.ts_enabled && self.rtseq_sendtime.is_none() {
            self.rtseq = from;
            self.rtseq_sendtime = Some(now);
            debug!(
                "[{}] ({}) timing segment {} for RTT",
                tcb.socket, tcb.state, from
            );
        }

        if let Some(log) = &mut self.transmit_log {
            log.record(from, tcb.snd.nxt, now);
        }

        tcb.time_last_data_sent = now;
    }

    fn segment_retransmitted(&mut self, tcb: &Tcb, from: u32, to: u32, now: Duration) {
        if self.rtseq_sendtime.is_some() && seq_in_range(from, self.rtseq, to) {
            debug!(
                "[{}] ({}) cancelling RTT measurement of retransmitted {}",
                tcb.socket, tcb.state, self.rtseq
            );
            self.rtseq_sendtime = None;
        }

        if let Some(log) = &mut self.transmit_log {
            log.retransmitted(from, to, now);
        }
    }

    fn start_rexmit_timer(&mut self, tcb: &Tcb, host: &mut dyn Host) {
        self.rexmit_timer
            .schedule(host, tcb.app, tcb.conn, self.rto());
    }

    /// Restarts the retransmission timer with a fresh count.
    pub fn restart_rexmit_timer(&mut self, tcb: &Tcb, host: &mut dyn Host) {
        self.rexmit_count = 0;
        self.start_rexmit_timer(tcb, host);
    }

    fn note_rtt(&mut self, rtt: Duration) {
        if self.min_rtt.is_none_or(|m| rtt < m) {
            self.min_rtt = Some(rtt);
        }
    }

    /// RFC 6298 (2.2, 2.3) smoothed RTT and variance update.
    fn rtt_measurement_complete(&mut self, tcb: &Tcb, sent: Duration, acked: Duration) {
        let rtt = acked.saturating_sub(sent);
        self.note_rtt(rtt);

        let sample = rtt.as_secs_f64();
        let g = 0.125;
        let err = sample - self.srtt;

        self.srtt += g * err;
        self.rttvar += g * (err.abs() - self.rttvar);
        self.rto = (self.srtt + 4.0 * self.rttvar).clamp(MIN_REXMIT_TIMEOUT, MAX_REXMIT_TIMEOUT);

        debug!(
            "[{}] ({}) RTT sample {:.3}s: srtt={:.3}s rttvar={:.3}s rto={:.3}s",
            tcb.socket, tcb.state, sample, self.srtt, self.rttvar, self.rto
        );
    }

    /// RFC 1323 (4): RTT from the echoed timestamp of an acceptable ACK.
    pub fn rtt_measurement_complete_using_ts(&mut self, tcb: &Tcb, host: &dyn Host, echoed: u32) {
        let now = host.now();
        let elapsed_ms = Tcb::ts_clock(now).wrapping_sub(echoed);

        let rtt = Duration::from_millis(elapsed_ms as u64);
        self.rtt_measurement_complete(tcb, now.saturating_sub(rtt), now);
    }

    /// Halves the flight size (RFC 5681 equation 4).
    pub(super) fn reduce_ssthresh(&mut self, tcb: &Tcb) {
        let flight = tcb.bytes_in_flight();
        self.ssthresh = u32::max(flight / 2, 2 * tcb.snd.mss);

        debug!(
            "[{}] ({}) ssthresh <- {} (flight {})",
            tcb.socket, tcb.state, self.ssthresh, flight
        );
    }

    /// Slow start below ssthresh, congestion avoidance above (RFC 5681 3.1).
    pub(super) fn open_cwnd(&mut self, tcb: &Tcb) {
        let mss = tcb.snd.mss;

        if self.cwnd < self.ssthresh {
            self.cwnd = self.cwnd.saturating_add(mss);
        } else {
            let incr = u32::max(mss * mss / u32::max(self.cwnd, 1), 1);
            self.cwnd = self.cwnd.saturating_add(incr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TcpConfig;
    use crate::protocol::congestion::tests::established_tcb;
    use crate::protocol::testing::RecordingHost;

    #[test]
    fn base_initial_window_follows_rfc_3390() {
        assert_eq!(increased_initial_window(500), 2000);
        assert_eq!(increased_initial_window(1460), 4380);
        assert_eq!(increased_initial_window(4000), 8000);
    }

    #[test]
    fn base_rtt_estimator_converges() {
        let tcb = established_tcb(TcpConfig::default(), 0);
        let mut alg = BaseAlgorithm::new();

        assert_eq!(alg.rto(), Duration::from_secs(3));

        for i in 0..50u64 {
            let sent = Duration::from_secs(i);
            alg.rtt_measurement_complete(&tcb, sent, sent + Duration::from_millis(100));
        }

        assert!((alg.srtt().as_secs_f64() - 0.1).abs() < 0.01);
        // Clamped to the 1 second minimum.
        assert_eq!(alg.rto(), Duration::from_secs(1));
        assert_eq!(alg.min_rtt(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn base_rto_backs_off_and_aborts() {
        let mut host = RecordingHost::default();
        let mut tcb = established_tcb(TcpConfig::default(), 1000);
        let mut alg = BaseAlgorithm::new();
        alg.established(&mut tcb, &mut host, false);

        for n in 1..MAX_REXMIT_COUNT {
            assert!(alg.process_rexmit_timer(&mut tcb, &mut host));
            let expected = f64::min(3.0 * 2f64.powi(n as i32), MAX_REXMIT_TIMEOUT);
            assert_eq!(alg.rto(), Duration::from_secs_f64(expected));
        }

        assert!(!alg.process_rexmit_timer(&mut tcb, &mut host));
        assert_eq!(alg.num_rtos, MAX_REXMIT_COUNT as u64);
    }

    #[test]
    fn base_karn_discards_retransmitted_sample() {
        let mut host = RecordingHost::default();
        let mut tcb = established_tcb(TcpConfig::default().with_mss(100), 1000);
        let mut alg = BaseAlgorithm::new();
        alg.established(&mut tcb, &mut host, false);

        assert!(alg.send_data(&mut tcb, &mut host));
        assert!(alg.rtseq_sendtime.is_some());

        alg.retransmit_one_segment(&mut tcb, &mut host, false);
        assert!(alg.rtseq_sendtime.is_none());
    }

    #[test]
    fn base_delayed_ack_waits_for_second_segment() {
        let mut host = RecordingHost::default();
        let mut tcb = established_tcb(TcpConfig::default().with_delayed_acks(true), 0);
        let mut alg = BaseAlgorithm::new();

        tcb.full_sized_segment_counter = 1;
        alg.receive_seq_changed(&mut tcb, &mut host);
        assert!(host.sent.is_empty());
        assert!(host.timer(TimerKind::DelayedAck).is_some());

        tcb.full_sized_segment_counter = 2;
        alg.receive_seq_changed(&mut tcb, &mut host);
        assert_eq!(host.sent.len(), 1);
        assert!(host.timer(TimerKind::DelayedAck).is_none());
    }

    #[test]
    fn base_persist_timer_backs_off_within_bounds() {
        let mut host = RecordingHost::default();
        let mut tcb = established_tcb(TcpConfig::default(), 10);
        let mut alg = BaseAlgorithm::new();
        tcb.snd.wnd = 0;

        let mut timeouts = Vec::new();
        for _ in 0..8 {
            alg.process_persist_timer(&mut tcb, &mut host);
            timeouts.push(alg.persist_timeout);
            // Probe acknowledged: nothing outstanding again.
            tcb.snd.una = tcb.snd.max;
            alg.rexmit_timer.cancel(&mut host);
        }

        assert_eq!(timeouts[0], MIN_PERSIST_TIMEOUT);
        assert_eq!(*timeouts.last().unwrap(), MAX_PERSIST_TIMEOUT);
        assert!(timeouts.windows(2).all(|w| w[0] <= w[1]));
        // One probe byte per expiry.
        assert_eq!(host.sent.len(), 8);
        assert!(host.sent.iter().all(|(s, _, _)| s.payload_len() == 1));
    }

    #[test]
    fn base_transmit_log_samples_first_transmissions_only() {
        let mut log = TransmitLog::default();
        let t = Duration::from_millis;

        log.record(100, 200, t(0));
        log.record(200, 300, t(10));
        log.record(100, 200, t(50));

        let acked = log.acked(200).unwrap();
        assert_eq!(acked.transmits, 2);

        let acked = log.acked(300).unwrap();
        assert_eq!((acked.sent_at, acked.transmits), (t(10), 1));
        assert!(log.oldest().is_none());
    }
}
