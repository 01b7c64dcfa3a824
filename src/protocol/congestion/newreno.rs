//! TCP NewReno (RFC 3782): fast recovery that survives multiple losses in
//! one window by retransmitting on every partial acknowledgment.

use super::base::BaseAlgorithm;
use crate::debug;
use crate::protocol::host::Host;
use crate::protocol::seq::{seq_ge, seq_lt};
use crate::protocol::tcb::{DUPTHRESH, Tcb};

#[derive(Debug, Default)]
pub(super) struct NewReno {
    /// Highest sequence number sent when fast recovery was entered.
    recover: Option<u32>,
    in_recovery: bool,
    first_partial_ack: bool,
}

impl NewReno {
    pub(super) fn process_rexmit_timer(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        // RFC 3782 (8): after a timeout, record the highest sequence number
        // sent so stale duplicate ACKs do not trigger fast retransmit.
        self.recover = Some(tcb.snd.max);
        self.in_recovery = false;

        base.reduce_ssthresh(tcb);
        base.cwnd = tcb.snd.mss;
        tcb.after_rto = true;

        base.retransmit_one_segment(tcb, host, true);
    }

    pub(super) fn received_data_ack(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
        first_seq_acked: u32,
    ) {
        let mss = tcb.snd.mss;

        if !self.in_recovery {
            base.open_cwnd(tcb);
            base.send_data(tcb, host);
            return;
        }

        let recover = self.recover.unwrap_or(tcb.snd.max);

        if seq_ge(tcb.snd.una, recover) {
            // (5) Full acknowledgment: deflate and leave fast recovery.
            let flight = tcb.bytes_in_flight();
            base.cwnd = u32::min(base.ssthresh, u32::max(flight, mss) + mss);
            self.in_recovery = false;

            debug!(
                "[{}] ({}) full ACK {} ends fast recovery, cwnd={}",
                tcb.socket, tcb.state, tcb.snd.una, base.cwnd
            );
        } else {
            // (5) Partial acknowledgment: retransmit the next unacknowledged
            // segment and deflate by the amount acknowledged.
            let acked = tcb.snd.una.wrapping_sub(first_seq_acked);

            debug!(
                "[{}] ({}) partial ACK {} (recover {}), retransmitting",
                tcb.socket, tcb.state, tcb.snd.una, recover
            );

            base.retransmit_one_segment(tcb, host, false);

            base.cwnd = base.cwnd.saturating_sub(acked);
            if acked >= mss {
                base.cwnd = base.cwnd.saturating_add(mss);
            }

            // Impatient variant: only the first partial ACK resets the timer.
            if self.first_partial_ack {
                self.first_partial_ack = false;
                base.restart_rexmit_timer(tcb, host);
            }
        }

        base.send_data(tcb, host);
    }

    pub(super) fn received_duplicate_ack(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        if self.in_recovery {
            // (4) Inflate by one segment per duplicate.
            base.cwnd = base.cwnd.saturating_add(tcb.snd.mss);
            base.send_data(tcb, host);
            return;
        }

        if tcb.dupacks != DUPTHRESH {
            return;
        }

        // (1) Only ACKs covering more than `recover` may start a recovery.
        if self.recover.is_some_and(|r| seq_lt(tcb.snd.una, r)) {
            debug!(
                "[{}] ({}) duplicate ACKs below recover {:?}, no fast retransmit",
                tcb.socket, tcb.state, self.recover
            );
            return;
        }

        self.recover = Some(tcb.snd.max);
        self.in_recovery = true;
        self.first_partial_ack = true;

        debug!(
            "[{}] ({}) fast retransmit of {}, recover={}",
            tcb.socket, tcb.state, tcb.snd.una, tcb.snd.max
        );

        // (2), (3)
        base.reduce_ssthresh(tcb);
        base.retransmit_one_segment(tcb, host, false);
        base.cwnd = base.ssthresh.saturating_add(3 * tcb.snd.mss);

        base.send_data(tcb, host);
    }
}
