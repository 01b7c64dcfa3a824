//! TCP Vegas (Brakmo & Peterson, 1995).
//!
//! Once per RTT the expected throughput (cwnd / BaseRTT) is compared with the
//! actual one (cwnd / RTT). The difference, expressed in segments queued in
//! the network, keeps the window between `ALPHA` and `BETA` segments of
//! backlog. Slow start doubles the window only every other RTT and ends as
//! soon as the backlog exceeds `GAMMA`.
//!
//! Losses are detected early: a duplicate ACK for a segment outstanding for
//! longer than the RTO triggers a retransmission without waiting for three
//! duplicates, and the window shrinks to 3/4 at most once per window of data.

use std::time::Duration;

use super::base::BaseAlgorithm;
use crate::debug;
use crate::protocol::host::Host;
use crate::protocol::seq::seq_ge;
use crate::protocol::tcb::{DUPTHRESH, Tcb};

const ALPHA: f64 = 2.0;
const BETA: f64 = 4.0;
const GAMMA: f64 = 1.0;

#[derive(Debug, Default)]
pub(super) struct Vegas {
    /// Start of the current measurement RTT.
    beg_seq: u32,
    sum_rtt: Duration,
    cnt_rtt: u32,
    /// Slow start grows the window only in every other RTT.
    inc_flag: bool,
    /// Window reductions apply once per window of data.
    recovery_point: u32,
    /// SND.UNA of the last early retransmission.
    last_rexmit_una: Option<u32>,
}

impl Vegas {
    pub(super) fn established(&mut self, tcb: &Tcb) {
        self.beg_seq = tcb.snd.nxt;
        self.recovery_point = tcb.snd.una;
        self.inc_flag = true;
    }

    pub(super) fn process_rexmit_timer(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        let mss = tcb.snd.mss;

        base.ssthresh = u32::max(u32::min(base.cwnd, tcb.snd.wnd) / 2, 2 * mss);
        base.cwnd = mss;
        tcb.after_rto = true;

        self.beg_seq = tcb.snd.max;
        self.sum_rtt = Duration::ZERO;
        self.cnt_rtt = 0;
        self.inc_flag = true;
        self.recovery_point = tcb.snd.max;

        base.retransmit_one_segment(tcb, host, true);
    }

    pub(super) fn received_data_ack(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
        sample: Option<Duration>,
    ) {
        let mss = tcb.snd.mss;

        if let Some(rtt) = sample {
            self.sum_rtt += rtt;
            self.cnt_rtt += 1;
        }

        self.last_rexmit_una = None;

        if seq_ge(tcb.snd.una, self.beg_seq) {
            self.once_per_rtt(base, tcb);

            self.beg_seq = tcb.snd.max;
            self.sum_rtt = Duration::ZERO;
            self.cnt_rtt = 0;
            self.inc_flag = !self.inc_flag;
        }

        if base.cwnd < base.ssthresh && self.inc_flag {
            base.cwnd = base.cwnd.saturating_add(mss);
        }

        base.cwnd = u32::max(base.cwnd, 2 * mss);

        base.send_data(tcb, host);
    }

    fn once_per_rtt(&mut self, base: &mut BaseAlgorithm, tcb: &Tcb) {
        let mss = tcb.snd.mss;

        let (Some(base_rtt), true) = (base.min_rtt(), self.cnt_rtt > 0) else {
            return;
        };

        let avg_rtt = self.sum_rtt / self.cnt_rtt;
        if avg_rtt.is_zero() || base_rtt.is_zero() {
            return;
        }

        // diff = (expected - actual) * BaseRTT, in segments.
        let cwnd = base.cwnd as f64;
        let diff = cwnd * (1.0 - base_rtt.as_secs_f64() / avg_rtt.as_secs_f64()) / mss as f64;

        debug!(
            "[{}] ({}) vegas: base_rtt={:?} avg_rtt={:?} diff={:.2} cwnd={}",
            tcb.socket, tcb.state, base_rtt, avg_rtt, diff, base.cwnd
        );

        if base.cwnd < base.ssthresh {
            if diff > GAMMA {
                // Leave slow start and give back the last increase.
                base.ssthresh = u32::min(base.ssthresh, base.cwnd.saturating_sub(mss));
                base.cwnd = base.cwnd.saturating_sub(base.cwnd / 8);
            }
        } else if diff > BETA {
            base.cwnd = base.cwnd.saturating_sub(mss);
            base.ssthresh = u32::min(base.ssthresh, base.cwnd);
        } else if diff < ALPHA {
            base.cwnd = base.cwnd.saturating_add(mss);
        }
    }

    pub(super) fn received_duplicate_ack(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        let mss = tcb.snd.mss;
        let now = host.now();

        let expired = base
            .transmit_log()
            .and_then(|log| log.oldest())
            .is_some_and(|r| r.begin == tcb.snd.una && now.saturating_sub(r.sent_at) > base.rto());

        let already_sent = self.last_rexmit_una == Some(tcb.snd.una);

        if (tcb.dupacks == DUPTHRESH || (tcb.dupacks < DUPTHRESH && expired)) && !already_sent {
            debug!(
                "[{}] ({}) vegas: retransmitting {} after {} duplicate ACKs",
                tcb.socket, tcb.state, tcb.snd.una, tcb.dupacks
            );

            base.retransmit_one_segment(tcb, host, false);
            self.last_rexmit_una = Some(tcb.snd.una);

            if seq_ge(tcb.snd.una, self.recovery_point) {
                base.cwnd = u32::max(base.cwnd * 3 / 4, 2 * mss);
                base.ssthresh = u32::max(base.cwnd, 2 * mss);
                self.recovery_point = tcb.snd.max;
            }
        } else if tcb.dupacks > DUPTHRESH {
            base.cwnd = base.cwnd.saturating_add(mss);
        }

        base.send_data(tcb, host);
    }
}
