//! Congestion control algorithms.
//!
//! Every connection owns one [`CongestionControl`]: the shared
//! [`BaseAlgorithm`] (retransmission, persist, and delayed-ACK timers, RTT
//! estimation, Nagle and limited transmit) plus one variant deciding how the
//! congestion window reacts to ACKs, duplicate ACKs, and timeouts.
//!
//! | Variant  | Reference                          |
//! |----------|------------------------------------|
//! | Tahoe    | RFC 5681 without fast recovery     |
//! | Reno     | RFC 5681, RFC 3517 when SACK is on |
//! | NewReno  | RFC 3782                           |
//! | Vegas    | Brakmo & Peterson, 1995            |
//! | Westwood | Mascolo et al., 2001               |

mod base;
mod newreno;
mod reno;
mod tahoe;
mod vegas;
mod westwood;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use base::{BaseAlgorithm, MAX_REXMIT_COUNT};

use self::newreno::NewReno;
use self::reno::Reno;
use self::tahoe::Tahoe;
use self::vegas::Vegas;
use self::westwood::Westwood;
use super::fsm::Event;
use super::host::Host;
use super::tcb::Tcb;
use super::timer::{TimerHandle, TimerKind};

/// Selects a congestion control algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CongestionAlgorithmKind {
    /// Slow start, congestion avoidance, fast retransmit.
    Tahoe,
    /// Tahoe plus fast recovery; SACK-based recovery when SACK is negotiated.
    Reno,
    /// Reno with partial-ACK handling.
    NewReno,
    /// Delay-based window adjustment.
    Vegas,
    /// Bandwidth-estimate-based window reduction.
    Westwood,
}

impl fmt::Display for CongestionAlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CongestionAlgorithmKind::Tahoe => "tahoe",
            CongestionAlgorithmKind::Reno => "reno",
            CongestionAlgorithmKind::NewReno => "newreno",
            CongestionAlgorithmKind::Vegas => "vegas",
            CongestionAlgorithmKind::Westwood => "westwood",
        };

        write!(f, "{name}")
    }
}

impl FromStr for CongestionAlgorithmKind {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tahoe" => Ok(CongestionAlgorithmKind::Tahoe),
            "reno" => Ok(CongestionAlgorithmKind::Reno),
            "newreno" => Ok(CongestionAlgorithmKind::NewReno),
            "vegas" => Ok(CongestionAlgorithmKind::Vegas),
            "westwood" => Ok(CongestionAlgorithmKind::Westwood),
            _ => Err(crate::ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

#[derive(Debug)]
enum Variant {
    Tahoe(Tahoe),
    Reno(Reno),
    NewReno(NewReno),
    Vegas(Vegas),
    Westwood(Westwood),
}

/// Congestion control state of one connection.
#[derive(Debug)]
pub struct CongestionControl {
    base: BaseAlgorithm,
    variant: Variant,
}

impl CongestionControl {
    /// Creates the algorithm state for a fresh connection.
    pub fn new(kind: CongestionAlgorithmKind) -> Self {
        let mut base = BaseAlgorithm::new();

        let variant = match kind {
            CongestionAlgorithmKind::Tahoe => Variant::Tahoe(Tahoe),
            CongestionAlgorithmKind::Reno => Variant::Reno(Reno),
            CongestionAlgorithmKind::NewReno => Variant::NewReno(NewReno::default()),
            CongestionAlgorithmKind::Vegas => {
                base.enable_transmit_log();
                Variant::Vegas(Vegas::default())
            }
            CongestionAlgorithmKind::Westwood => {
                base.enable_transmit_log();
                Variant::Westwood(Westwood::default())
            }
        };

        Self { base, variant }
    }

    /// Algorithm in use.
    pub fn kind(&self) -> CongestionAlgorithmKind {
        match self.variant {
            Variant::Tahoe(_) => CongestionAlgorithmKind::Tahoe,
            Variant::Reno(_) => CongestionAlgorithmKind::Reno,
            Variant::NewReno(_) => CongestionAlgorithmKind::NewReno,
            Variant::Vegas(_) => CongestionAlgorithmKind::Vegas,
            Variant::Westwood(_) => CongestionAlgorithmKind::Westwood,
        }
    }

    /// Shared state (congestion window, RTT estimate, timers).
    pub fn base(&self) -> &BaseAlgorithm {
        &self.base
    }

    /// Mutable access to the shared state.
    pub fn base_mut(&mut self) -> &mut BaseAlgorithm {
        &mut self.base
    }

    /// Congestion window in bytes.
    pub fn cwnd(&self) -> u32 {
        self.base.cwnd
    }

    /// Slow start threshold in bytes.
    pub fn ssthresh(&self) -> u32 {
        self.base.ssthresh
    }

    /// Smoothed round-trip time.
    pub fn srtt(&self) -> Duration {
        self.base.srtt()
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.base.rto()
    }

    /// The connection reached ESTABLISHED. `active` connections complete the
    /// handshake with an ACK, piggybacked on data if any is queued.
    pub fn established(&mut self, tcb: &mut Tcb, host: &mut dyn Host, active: bool) {
        self.base.established(tcb, host, active);

        if let Variant::Vegas(v) = &mut self.variant {
            v.established(tcb);
        }
    }

    /// The connection entered CLOSED.
    pub fn connection_closed(&mut self, host: &mut dyn Host) {
        self.base.connection_closed(host);
    }

    /// Handles an expiry of one of the algorithm's timers. Returns
    /// [`Event::ABORT`] when the connection must be given up.
    pub fn process_timer(
        &mut self,
        kind: TimerKind,
        handle: TimerHandle,
        tcb: &mut Tcb,
        host: &mut dyn Host,
    ) -> Option<Event> {
        match kind {
            TimerKind::Rexmit => {
                if !self.base.rexmit_timer.fire(handle) {
                    return None;
                }

                if !self.base.process_rexmit_timer(tcb, host) {
                    return Some(Event::ABORT);
                }

                let base = &mut self.base;
                match &mut self.variant {
                    Variant::Tahoe(v) => v.process_rexmit_timer(base, tcb, host),
                    Variant::Reno(v) => v.process_rexmit_timer(base, tcb, host),
                    Variant::NewReno(v) => v.process_rexmit_timer(base, tcb, host),
                    Variant::Vegas(v) => v.process_rexmit_timer(base, tcb, host),
                    Variant::Westwood(v) => v.process_rexmit_timer(base, tcb, host),
                }
            }
            TimerKind::Persist => {
                if self.base.persist_timer.fire(handle) {
                    self.base.process_persist_timer(tcb, host);
                }
            }
            TimerKind::DelayedAck => {
                if self.base.delayed_ack_timer.fire(handle) {
                    self.base.process_delayed_ack_timer(tcb, host);
                }
            }
            TimerKind::KeepAlive => {
                self.base.keepalive_timer.fire(handle);
            }
            TimerKind::ConnEstab | TimerKind::FinWait2 | TimerKind::TwoMsl | TimerKind::SynRexmit => {
            }
        }

        None
    }

    /// Tries to send queued data.
    pub fn send_data(&mut self, tcb: &mut Tcb, host: &mut dyn Host) -> bool {
        self.base.send_data(tcb, host)
    }

    /// The application queued data with SEND.
    pub fn send_command_invoked(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.send_data(tcb, host);
    }

    /// An out-of-order segment arrived.
    pub fn received_out_of_order_segment(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.received_out_of_order_segment(tcb, host);
    }

    /// RCV.NXT advanced.
    pub fn receive_seq_changed(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.receive_seq_changed(tcb, host);
    }

    /// An ACK advanced SND.UNA from `first_seq_acked`.
    pub fn received_data_ack(&mut self, tcb: &mut Tcb, host: &mut dyn Host, first_seq_acked: u32) {
        let sample = self.base.received_data_ack(tcb, host);

        let base = &mut self.base;
        match &mut self.variant {
            Variant::Tahoe(v) => v.received_data_ack(base, tcb, host),
            Variant::Reno(v) => v.received_data_ack(base, tcb, host),
            Variant::NewReno(v) => v.received_data_ack(base, tcb, host, first_seq_acked),
            Variant::Vegas(v) => v.received_data_ack(base, tcb, host, sample),
            Variant::Westwood(v) => v.received_data_ack(base, tcb, host, first_seq_acked),
        }
    }

    /// A duplicate ACK arrived; `tcb.dupacks` already counts it.
    pub fn received_duplicate_ack(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.received_duplicate_ack(tcb, host);

        let base = &mut self.base;
        match &mut self.variant {
            Variant::Tahoe(v) => v.received_duplicate_ack(base, tcb, host),
            Variant::Reno(v) => v.received_duplicate_ack(base, tcb, host),
            Variant::NewReno(v) => v.received_duplicate_ack(base, tcb, host),
            Variant::Vegas(v) => v.received_duplicate_ack(base, tcb, host),
            Variant::Westwood(v) => v.received_duplicate_ack(base, tcb, host),
        }
    }

    /// The peer changed its window without acknowledging new data.
    pub fn window_updated(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.window_updated(tcb, host);
    }

    /// An ACK acknowledged data beyond SND.MAX.
    pub fn received_ack_for_data_not_yet_sent(
        &mut self,
        tcb: &mut Tcb,
        host: &mut dyn Host,
        seq: u32,
    ) {
        self.base.received_ack_for_data_not_yet_sent(tcb, host, seq);
    }

    /// Sends an ACK and records it.
    pub fn send_ack(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.send_ack(tcb, host);
    }

    /// Sends a FIN and records the piggybacked ACK.
    pub fn send_fin(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.send_fin(tcb, host);
    }

    /// Restarts the retransmission timer.
    pub fn restart_rexmit_timer(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.restart_rexmit_timer(tcb, host);
    }

    /// Completes an RTT measurement from an echoed timestamp (RFC 1323).
    pub fn rtt_measurement_complete_using_ts(
        &mut self,
        tcb: &mut Tcb,
        host: &mut dyn Host,
        echoed: u32,
    ) {
        self.base.rtt_measurement_complete_using_ts(tcb, host, echoed);
    }

    /// Go-back-N retransmission of everything outstanding.
    pub fn retransmit_data(&mut self, tcb: &mut Tcb, host: &mut dyn Host) {
        self.base.retransmit_data(tcb, host);
    }
}
