//! TCP Tahoe: slow start, congestion avoidance, and fast retransmit, without
//! fast recovery.

use super::base::BaseAlgorithm;
use crate::debug;
use crate::protocol::host::Host;
use crate::protocol::tcb::{DUPTHRESH, Tcb};

#[derive(Debug, Default)]
pub(super) struct Tahoe;

impl Tahoe {
    pub(super) fn process_rexmit_timer(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
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
    ) {
        base.open_cwnd(tcb);
        base.send_data(tcb, host);
    }

    pub(super) fn received_duplicate_ack(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        if tcb.dupacks != DUPTHRESH {
            return;
        }

        debug!(
            "[{}] ({}) fast retransmit of {}, cwnd back to one segment",
            tcb.socket, tcb.state, tcb.snd.una
        );

        base.reduce_ssthresh(tcb);
        base.retransmit_one_segment(tcb, host, false);
        base.cwnd = tcb.snd.mss;
    }
}
