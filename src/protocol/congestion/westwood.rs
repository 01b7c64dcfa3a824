//! TCP Westwood (Mascolo et al., 2001).
//!
//! The sender estimates the available bandwidth from the rate of returning
//! ACKs. After a loss, ssthresh is set to the estimated bandwidth-delay
//! product (BWE * RTTmin) instead of half the flight.

use std::time::Duration;

use super::base::BaseAlgorithm;
use crate::debug;
use crate::protocol::host::Host;
use crate::protocol::tcb::{DUPTHRESH, Tcb};

#[derive(Debug, Default)]
pub(super) struct Westwood {
    /// Filtered bandwidth estimate, bytes per second.
    bwe: f64,
    /// Previous raw sample, bytes per second.
    sample_bwe: f64,
    last_ack_time: Option<Duration>,
}

impl Westwood {
    /// Feeds `acked` bytes, acknowledged at `now`, into the Tustin filter
    /// `bwe = 19/21 * bwe + 1/21 * (sample + previous sample)`.
    fn recalculate_bwe(&mut self, acked: u32, now: Duration) {
        let Some(last) = self.last_ack_time.replace(now) else {
            return;
        };

        let elapsed = now.saturating_sub(last).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        let sample = acked as f64 / elapsed;
        self.bwe = (19.0 / 21.0) * self.bwe + (1.0 / 21.0) * (sample + self.sample_bwe);
        self.sample_bwe = sample;
    }

    /// ssthresh from the bandwidth-delay product, falling back to half the
    /// flight until an RTT has been measured.
    fn set_ssthresh(&self, base: &mut BaseAlgorithm, tcb: &Tcb) {
        let mss = tcb.snd.mss;

        match base.min_rtt() {
            Some(rtt_min) if self.bwe > 0.0 => {
                let bdp = self.bwe * rtt_min.as_secs_f64();
                base.ssthresh = u32::max(bdp.min(u32::MAX as f64) as u32, 2 * mss);

                debug!(
                    "[{}] ({}) westwood: bwe={:.0} B/s rtt_min={:?} ssthresh={}",
                    tcb.socket, tcb.state, self.bwe, rtt_min, base.ssthresh
                );
            }
            _ => base.reduce_ssthresh(tcb),
        }
    }

    pub(super) fn process_rexmit_timer(
        &mut self,
        base: &mut BaseAlgorithm,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) {
        self.set_ssthresh(base, tcb);
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
        let acked = tcb.snd.una.wrapping_sub(first_seq_acked);
        self.recalculate_bwe(acked, host.now());

        if tcb.dupacks >= DUPTHRESH {
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
        // A duplicate ACK still reports one segment leaving the network.
        self.recalculate_bwe(tcb.snd.mss, host.now());

        if tcb.dupacks == DUPTHRESH {
            self.set_ssthresh(base, tcb);
            base.cwnd = u32::min(base.cwnd, base.ssthresh);

            base.retransmit_one_segment(tcb, host, false);
            base.send_data(tcb, host);
        } else if tcb.dupacks > DUPTHRESH {
            base.cwnd = base.cwnd.saturating_add(tcb.snd.mss);
            base.send_data(tcb, host);
        }
    }
}
