//! TCP Reno: Tahoe plus fast recovery (RFC 5681 3.2). When SACK is in use,
//! loss recovery follows the conservative algorithm of RFC 3517 instead.

use super::base::BaseAlgorithm;
use crate::debug;
use crate::protocol::host::Host;
use crate::protocol::seq::seq_ge;
use crate::protocol::tcb::{DUPTHRESH, Tcb};

#[derive(Debug, Default)]
pub(super) struct Reno;

impl Reno {
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
        if tcb.opts.sack_enabled && tcb.recovery.active {
            // RFC 3517 (5): recovery ends once the recovery point is
            // acknowledged; until then every ACK clocks out more segments.
            let done = tcb
                .recovery
                .recovery_point
                .is_none_or(|rp| seq_ge(tcb.snd.una, rp));

            if done {
                debug!(
                    "[{}] ({}) leaving SACK loss recovery at {}",
                    tcb.socket, tcb.state, tcb.snd.una
                );
                tcb.recovery.active = false;
                base.cwnd = base.ssthresh;
            } else {
                tcb.set_pipe();
                base.send_data_during_loss_recovery(tcb, host);
                return;
            }
        } else if tcb.dupacks >= DUPTHRESH {
            // Exit fast recovery: deflate the window.
            base.cwnd = base.ssthresh;
        } else {
            base.open_cwnd(tcb);
        }

        base.send_data(tcb, host);
    }

    pub(super) fn received_duplicate_ack(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        if tcb.opts.sack_enabled {
            self.sack_duplicate_ack(base, tcb, host);
            return;
        }

        if tcb.dupacks == DUPTHRESH {
            debug!(
                "[{}] ({}) fast retransmit of {}, entering fast recovery",
                tcb.socket, tcb.state, tcb.snd.una
            );

            base.reduce_ssthresh(tcb);
            base.retransmit_one_segment(tcb, host, false);
            base.cwnd = base.ssthresh;
            base.send_data(tcb, host);
        } else if tcb.dupacks > DUPTHRESH {
            // Each further duplicate ACK means a segment left the network.
            base.cwnd = base.cwnd.saturating_add(tcb.snd.mss);
            base.send_data(tcb, host);
        }
    }

    fn sack_duplicate_ack(&mut self, base: &mut BaseAlgorithm, tcb: &mut Tcb, host: &mut dyn Host) {
        if tcb.recovery.active {
            tcb.set_pipe();
            base.send_data_during_loss_recovery(tcb, host);
            return;
        }

        if tcb.dupacks < DUPTHRESH {
            return;
        }

        // RFC 3517 (5) (1): only one recovery per window of data.
        let may_enter = tcb
            .recovery
            .recovery_point
            .is_none_or(|rp| seq_ge(tcb.snd.una, rp));

        if !may_enter {
            return;
        }

        debug!(
            "[{}] ({}) entering SACK loss recovery, recovery point {}",
            tcb.socket, tcb.state, tcb.snd.max
        );

        tcb.recovery.recovery_point = Some(tcb.snd.max);
        tcb.recovery.active = true;

        base.reduce_ssthresh(tcb);
        base.cwnd = base.ssthresh;

        base.retransmit_one_segment(tcb, host, false);

        tcb.set_pipe();
        base.send_data_during_loss_recovery(tcb, host);
    }
}

#[cfg(test)]
mod tests {
    use crate::TcpConfig;
    use crate::protocol::congestion::tests::{ack, established_tcb};
    use crate::protocol::congestion::{CongestionAlgorithmKind, CongestionControl};
    use crate::protocol::tcb::Tcb;
    use crate::protocol::testing::RecordingHost;

    fn reno(config: TcpConfig, bytes: usize) -> (RecordingHost, Tcb, CongestionControl) {
        let mut host = RecordingHost::default();
        let mut tcb = established_tcb(config, bytes);
        let mut alg = CongestionControl::new(CongestionAlgorithmKind::Reno);
        alg.established(&mut tcb, &mut host, false);
        (host, tcb, alg)
    }

    #[test]
    fn reno_fast_retransmit_and_recovery() {
        let (mut host, mut tcb, mut alg) = reno(TcpConfig::default().with_mss(100), 10_000);

        alg.base_mut().cwnd = 1000;
        alg.send_data(&mut tcb, &mut host);
        assert_eq!(host.sent.len(), 10);

        for _ in 0..3 {
            ack(&mut alg, &mut tcb, &mut host, 1001);
        }

        // ssthresh = max(flight / 2, 2 * mss), cwnd = ssthresh.
        assert_eq!(alg.ssthresh(), 500);
        assert_eq!(alg.cwnd(), 500);
        assert_eq!(host.sent.len(), 11);
        assert_eq!(host.last_sent().seq(), 1001);
        assert_eq!(host.last_sent().payload_len(), 100);

        // Inflation by one segment per further duplicate.
        ack(&mut alg, &mut tcb, &mut host, 1001);
        assert_eq!(alg.cwnd(), 600);

        // The retransmission is acknowledged: deflate.
        ack(&mut alg, &mut tcb, &mut host, 2001);
        assert_eq!(alg.cwnd(), 500);
    }

    #[test]
    fn reno_timeout_collapses_window() {
        let (mut host, mut tcb, mut alg) = reno(TcpConfig::default().with_mss(100), 10_000);

        alg.base_mut().cwnd = 800;
        alg.send_data(&mut tcb, &mut host);

        let handle = host.timer(crate::TimerKind::Rexmit).unwrap().0;
        let event = alg.process_timer(crate::TimerKind::Rexmit, handle, &mut tcb, &mut host);

        assert_eq!(event, None);
        assert_eq!(alg.cwnd(), 100);
        assert_eq!(alg.ssthresh(), 400);
        assert!(tcb.after_rto);
        assert_eq!(host.last_sent().seq(), 1001);
    }

    #[test]
    fn reno_sack_recovery_retransmits_holes() {
        let (mut host, mut tcb, mut alg) =
            reno(TcpConfig::default().with_mss(100).with_sack(true), 10_000);
        tcb.opts.sack_enabled = true;

        alg.base_mut().cwnd = 1000;
        alg.send_data(&mut tcb, &mut host);
        assert_eq!(host.sent.len(), 10);

        // Segments 1001 and 1201 were lost; the rest arrived.
        tcb.rexmit_queue.set_sacked_bit(1101, 1201);
        tcb.rexmit_queue.set_sacked_bit(1301, 2001);

        for _ in 0..3 {
            ack(&mut alg, &mut tcb, &mut host, 1001);
        }

        assert!(tcb.recovery.active);
        assert_eq!(tcb.recovery.recovery_point, Some(2001));

        let resent: Vec<u32> = host.sent[10..].iter().map(|(s, _, _)| s.seq()).collect();
        assert_eq!(resent[0], 1001);
        assert!(resent.contains(&1201));

        // Acknowledging everything ends recovery.
        ack(&mut alg, &mut tcb, &mut host, 2001);
        assert!(!tcb.recovery.active);
    }
}
