//! A single TCP connection: application commands, timers, and the state
//! machine glue around the [`Tcb`] and its congestion control algorithm.
//!
//! Segment arrival is handled in the `input` submodule.

mod input;

use std::time::Duration;

use super::congestion::{CongestionAlgorithmKind, CongestionControl};
use super::fsm::{ConnectionState, Event, transition};
use super::host::{AppId, ConnId, Host, Indication, StatusInfo};
use super::seq::seq_gt;
use super::socket::{Socket, SocketAddr};
use super::tcb::Tcb;
use super::timer::{TimerHandle, TimerKind};
use crate::{CommandError, TcpConfig, debug, info, warn};

/// RFC 1122 (4.2.3.5): give up on an unanswered connection attempt after at
/// least 3 minutes; SYN retransmissions stop after this many tries.
pub const MAX_SYN_REXMIT_COUNT: u32 = 12;

const INITIAL_SYN_REXMIT_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_SYN_REXMIT_TIMEOUT: Duration = Duration::from_secs(240);
const CONN_ESTAB_TIMEOUT: Duration = Duration::from_secs(75);
const FIN_WAIT_2_TIMEOUT: Duration = Duration::from_secs(600);

/// Request from the application to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Actively open a connection to `remote`. A local port of 0 selects an
    /// ephemeral port.
    OpenActive {
        /// Local address; the address part may be unspecified.
        local: SocketAddr,
        /// Peer to connect to.
        remote: SocketAddr,
        /// Overrides the configured congestion control algorithm.
        algorithm: Option<CongestionAlgorithmKind>,
    },
    /// Listen for connections on `local`.
    OpenPassive {
        /// Local address; the address part may be unspecified.
        local: SocketAddr,
        /// Keep listening after a SYN arrives, serving it from a new
        /// connection.
        fork: bool,
        /// Overrides the configured congestion control algorithm.
        algorithm: Option<CongestionAlgorithmKind>,
    },
    /// Queue data for transmission.
    Send(Vec<u8>),
    /// Close the sending direction once queued data is sent.
    Close,
    /// Reset the connection.
    Abort,
    /// Request a [`StatusInfo`] snapshot.
    Status,
}

/// State of one connection.
#[derive(Debug)]
pub struct Connection {
    tcb: Tcb,
    alg: CongestionControl,
    /// Socket a passive open listens on, restored when a failed handshake
    /// returns the connection to LISTEN.
    listen_socket: Option<Socket>,
    /// Created by a forking listener; such a connection never listens itself.
    forked: bool,
    /// A terminal indication was already delivered to the application.
    closure_indicated: bool,
}

impl Connection {
    /// Creates a connection in the INIT state.
    pub fn new(app: AppId, conn: ConnId, config: TcpConfig) -> Self {
        let alg = CongestionControl::new(config.algorithm);

        Self {
            tcb: Tcb::new(app, conn, config),
            alg,
            listen_socket: None,
            forked: false,
            closure_indicated: false,
        }
    }

    /// Copy of this listening connection that serves one incoming SYN.
    pub fn fork_listening(&self, conn: ConnId) -> Self {
        let mut tcb = self.tcb.clone_listening(conn);
        tcb.fork = false;

        Self {
            tcb,
            alg: CongestionControl::new(self.alg.kind()),
            listen_socket: self.listen_socket,
            forked: true,
            closure_indicated: false,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        self.tcb.state
    }

    /// Current socket pair.
    pub fn socket(&self) -> Socket {
        self.tcb.socket
    }

    /// Owning application.
    pub fn app(&self) -> AppId {
        self.tcb.app
    }

    /// Identifier of the connection.
    pub fn conn_id(&self) -> ConnId {
        self.tcb.conn
    }

    /// Whether a SYN arriving in LISTEN is served by a forked copy.
    pub fn forks(&self) -> bool {
        self.tcb.fork
    }

    /// Transmission control block.
    pub fn tcb(&self) -> &Tcb {
        &self.tcb
    }

    /// Congestion control state.
    pub fn algorithm(&self) -> &CongestionControl {
        &self.alg
    }

    /// Executes an application command. Returns `Ok(false)` once the
    /// connection reached CLOSED and must be deleted.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] if the command is not valid in the current
    /// state.
    pub fn process_command(
        &mut self,
        host: &mut dyn Host,
        command: Command,
    ) -> Result<bool, CommandError> {
        let event = match command {
            Command::OpenActive {
                local,
                remote,
                algorithm,
            } => self.open_active(host, local, remote, algorithm)?,
            Command::OpenPassive {
                local,
                fork,
                algorithm,
            } => self.open_passive(local, fork, algorithm)?,
            Command::Send(data) => self.send(host, &data)?,
            Command::Close => self.close(host)?,
            Command::Abort => self.abort(host)?,
            Command::Status => self.status(host)?,
        };

        Ok(match event {
            Some(event) => self.perform_state_transition(host, event),
            None => true,
        })
    }

    fn open_active(
        &mut self,
        host: &mut dyn Host,
        local: SocketAddr,
        remote: SocketAddr,
        algorithm: Option<CongestionAlgorithmKind>,
    ) -> Result<Option<Event>, CommandError> {
        match self.tcb.state {
            ConnectionState::INIT | ConnectionState::LISTEN => {}
            _ => return Err(CommandError::AlreadyOpen),
        }

        if remote.is_unspecified_addr() || remote.port == 0 {
            return Err(CommandError::MissingRemote);
        }

        if let Some(kind) = algorithm {
            self.alg = CongestionControl::new(kind);
        }

        self.tcb.active = true;
        self.tcb.socket = Socket::new(local, remote);
        self.tcb.select_initial_seq_num(host.now());

        info!("[{}] ({}) active open", self.tcb.socket, self.tcb.state);

        self.tcb.send_syn(host);
        self.start_syn_rexmit_timer(host);

        let (app, conn) = (self.tcb.app, self.tcb.conn);
        self.tcb
            .timers
            .conn_estab
            .schedule(host, app, conn, CONN_ESTAB_TIMEOUT);

        Ok(Some(Event::OPEN_ACTIVE))
    }

    fn open_passive(
        &mut self,
        local: SocketAddr,
        fork: bool,
        algorithm: Option<CongestionAlgorithmKind>,
    ) -> Result<Option<Event>, CommandError> {
        if self.tcb.state != ConnectionState::INIT {
            return Err(CommandError::AlreadyOpen);
        }

        if local.port == 0 {
            return Err(CommandError::MissingLocalPort);
        }

        if let Some(kind) = algorithm {
            self.alg = CongestionControl::new(kind);
        }

        self.tcb.active = false;
        self.tcb.fork = fork;
        self.tcb.socket = Socket::new(local, SocketAddr::default());
        self.listen_socket = Some(self.tcb.socket);

        info!(
            "[{}] ({}) passive open{}",
            self.tcb.socket,
            self.tcb.state,
            if fork { " (forking)" } else { "" }
        );

        Ok(Some(Event::OPEN_PASSIVE))
    }

    fn send(&mut self, host: &mut dyn Host, data: &[u8]) -> Result<Option<Event>, CommandError> {
        match self.tcb.state {
            ConnectionState::INIT => Err(CommandError::NotOpen),
            ConnectionState::LISTEN => Err(CommandError::SendOnListen),
            _ if self.tcb.fin.send_fin => Err(CommandError::ConnectionClosing),
            ConnectionState::SYN_SENT | ConnectionState::SYN_RCVD => {
                self.tcb.send_queue.enqueue_app_data(data)?;
                debug!(
                    "[{}] ({}) queued {} bytes until the connection is established",
                    self.tcb.socket,
                    self.tcb.state,
                    data.len()
                );
                Ok(None)
            }
            ConnectionState::ESTABLISHED | ConnectionState::CLOSE_WAIT => {
                self.tcb.send_queue.enqueue_app_data(data)?;
                self.alg.send_command_invoked(&mut self.tcb, host);
                Ok(None)
            }
            _ => Err(CommandError::ConnectionClosing),
        }
    }

    fn close(&mut self, host: &mut dyn Host) -> Result<Option<Event>, CommandError> {
        match self.tcb.state {
            ConnectionState::INIT => Err(CommandError::NotOpen),
            ConnectionState::LISTEN | ConnectionState::SYN_SENT => Ok(Some(Event::CLOSE)),
            ConnectionState::SYN_RCVD
            | ConnectionState::ESTABLISHED
            | ConnectionState::CLOSE_WAIT => {
                if self.tcb.fin.send_fin {
                    return Err(CommandError::DuplicateClose);
                }

                let end = self.tcb.send_queue.buffer_end_seq();
                self.tcb.fin.send_fin = true;
                self.tcb.fin.snd_fin_seq = end;

                if self.tcb.snd.max == end {
                    // RFC 793 (3.9): CLOSE with nothing left to send.
                    self.tcb.snd.nxt = self.tcb.snd.max;
                    self.alg.send_fin(&mut self.tcb, host);
                    self.alg.restart_rexmit_timer(&mut self.tcb, host);
                    self.tcb.snd.nxt = self.tcb.snd.nxt.wrapping_add(1);
                    self.tcb.snd.max = self.tcb.snd.nxt;

                    Ok(Some(Event::CLOSE))
                } else {
                    debug!(
                        "[{}] ({}) FIN deferred until {} queued bytes are sent",
                        self.tcb.socket,
                        self.tcb.state,
                        end.wrapping_sub(self.tcb.snd.max)
                    );
                    Ok(None)
                }
            }
            _ => Err(CommandError::DuplicateClose),
        }
    }

    fn abort(&mut self, host: &mut dyn Host) -> Result<Option<Event>, CommandError> {
        match self.tcb.state {
            ConnectionState::INIT => return Err(CommandError::NotOpen),
            ConnectionState::SYN_RCVD
            | ConnectionState::ESTABLISHED
            | ConnectionState::FIN_WAIT_1
            | ConnectionState::FIN_WAIT_2
            | ConnectionState::CLOSE_WAIT => {
                // RFC 793 (3.9): send a reset, <SEQ=SND.NXT><CTL=RST>.
                let seq = self.tcb.snd.nxt;
                self.tcb.send_rst(host, seq);
            }
            _ => {}
        }

        Ok(Some(Event::ABORT))
    }

    fn status(&mut self, host: &mut dyn Host) -> Result<Option<Event>, CommandError> {
        if self.tcb.state == ConnectionState::INIT {
            return Err(CommandError::NotOpen);
        }

        let info = self.status_info();
        host.indicate(
            self.tcb.app,
            self.tcb.conn,
            Indication::StatusReply(Box::new(info)),
        );

        Ok(None)
    }

    /// Snapshot of the connection's state variables.
    pub fn status_info(&self) -> StatusInfo {
        let t = &self.tcb;

        StatusInfo {
            state: t.state,
            socket: t.socket,
            active: t.active,
            snd_mss: t.snd.mss,
            snd_una: t.snd.una,
            snd_nxt: t.snd.nxt,
            snd_max: t.snd.max,
            snd_wnd: t.snd.wnd,
            snd_up: t.snd.up,
            snd_wl1: t.snd.wl1,
            snd_wl2: t.snd.wl2,
            iss: t.snd.iss,
            rcv_nxt: t.rcv.nxt,
            rcv_wnd: t.rcv.wnd,
            rcv_up: t.rcv.up,
            irs: t.rcv.irs,
            rcv_adv: t.rcv.adv,
            fin_ack_rcvd: t.fin.fin_ack_rcvd,
            ws_enabled: t.opts.ws_enabled,
            snd_wnd_scale: t.opts.snd_wnd_scale,
            rcv_wnd_scale: t.opts.rcv_wnd_scale,
            ts_enabled: t.opts.ts_enabled,
            sack_enabled: t.opts.sack_enabled,
            cwnd: self.alg.cwnd(),
            ssthresh: self.alg.ssthresh(),
            srtt: self.alg.srtt(),
            rto: self.alg.rto(),
            rcv_out_of_order_segments: t.stats.rcv_out_of_order_segments,
            rcv_queue_drops: t.stats.rcv_queue_drops,
            sack_blocks_sent: t.stats.sack_blocks_sent,
            sack_blocks_received: t.stats.sack_blocks_received,
            rto_count: self.alg.base().num_rtos,
        }
    }

    /// Handles the expiry of one of this connection's timers. Returns `false`
    /// once the connection reached CLOSED.
    pub fn process_timer(&mut self, host: &mut dyn Host, kind: TimerKind, handle: TimerHandle) -> bool {
        let event = match kind {
            TimerKind::ConnEstab => {
                if !self.tcb.timers.conn_estab.fire(handle) {
                    return true;
                }
                self.process_timeout_conn_estab(host)
            }
            TimerKind::FinWait2 => {
                if !self.tcb.timers.fin_wait2.fire(handle) {
                    return true;
                }
                debug!("[{}] ({}) FIN-WAIT-2 timeout", self.tcb.socket, self.tcb.state);
                Some(Event::TIMEOUT_FIN_WAIT_2)
            }
            TimerKind::TwoMsl => {
                if !self.tcb.timers.two_msl.fire(handle) {
                    return true;
                }
                Some(Event::TIMEOUT_2MSL)
            }
            TimerKind::SynRexmit => {
                if !self.tcb.timers.syn_rexmit.fire(handle) {
                    return true;
                }
                self.process_timeout_syn_rexmit(host)
            }
            TimerKind::Rexmit
            | TimerKind::Persist
            | TimerKind::DelayedAck
            | TimerKind::KeepAlive => {
                let event = self.alg.process_timer(kind, handle, &mut self.tcb, host);

                if event == Some(Event::ABORT) {
                    // Too many retransmissions: reset the peer and give up.
                    let seq = self.tcb.snd.nxt;
                    self.tcb.send_rst(host, seq);
                    self.indicate(host, Indication::TimedOut);
                }

                event
            }
        };

        let alive = match event {
            Some(event) => self.perform_state_transition(host, event),
            None => true,
        };

        alive && self.process_deferred_close(host)
    }

    fn process_timeout_conn_estab(&mut self, host: &mut dyn Host) -> Option<Event> {
        match self.tcb.state {
            ConnectionState::SYN_SENT | ConnectionState::SYN_RCVD => {
                warn!(
                    "[{}] ({}) connection establishment timed out",
                    self.tcb.socket, self.tcb.state
                );

                if self.tcb.active {
                    self.indicate(host, Indication::TimedOut);
                }

                Some(Event::TIMEOUT_CONN_ESTAB)
            }
            _ => None,
        }
    }

    fn process_timeout_syn_rexmit(&mut self, host: &mut dyn Host) -> Option<Event> {
        self.tcb.syn_rexmit_count += 1;

        if self.tcb.syn_rexmit_count > MAX_SYN_REXMIT_COUNT {
            warn!(
                "[{}] ({}) no answer after {} SYN retransmissions, giving up",
                self.tcb.socket, self.tcb.state, MAX_SYN_REXMIT_COUNT
            );
            self.indicate(host, Indication::TimedOut);
            return Some(Event::ABORT);
        }

        match self.tcb.state {
            ConnectionState::SYN_SENT => self.tcb.send_syn(host),
            ConnectionState::SYN_RCVD => self.tcb.send_syn_ack(host),
            state => {
                warn!("[{}] ({}) stale SYN retransmission timer", self.tcb.socket, state);
                return None;
            }
        }

        self.tcb.syn_rexmit_timeout =
            Duration::min(self.tcb.syn_rexmit_timeout * 2, MAX_SYN_REXMIT_TIMEOUT);

        let (app, conn, timeout) = (self.tcb.app, self.tcb.conn, self.tcb.syn_rexmit_timeout);
        self.tcb.timers.syn_rexmit.schedule(host, app, conn, timeout);

        debug!(
            "[{}] ({}) SYN retransmission #{}, next in {:?}",
            self.tcb.socket, self.tcb.state, self.tcb.syn_rexmit_count, timeout
        );

        None
    }

    fn start_syn_rexmit_timer(&mut self, host: &mut dyn Host) {
        self.tcb.syn_rexmit_count = 0;
        self.tcb.syn_rexmit_timeout = INITIAL_SYN_REXMIT_TIMEOUT;

        let (app, conn) = (self.tcb.app, self.tcb.conn);
        self.tcb
            .timers
            .syn_rexmit
            .schedule(host, app, conn, INITIAL_SYN_REXMIT_TIMEOUT);
    }

    /// Delivers an indication to the application, remembering terminal ones.
    fn indicate(&mut self, host: &mut dyn Host, indication: Indication) {
        if matches!(
            indication,
            Indication::Closed
                | Indication::ConnectionRefused
                | Indication::ConnectionReset
                | Indication::TimedOut
        ) {
            self.closure_indicated = true;
        }

        host.indicate(self.tcb.app, self.tcb.conn, indication);
    }

    fn indicate_established(&mut self, host: &mut dyn Host) {
        let socket = self.tcb.socket;

        self.indicate(
            host,
            Indication::Established {
                local: socket.local,
                remote: socket.remote,
            },
        );
    }

    /// Applies `event` to the FSM. Returns `false` once the connection is
    /// CLOSED.
    fn perform_state_transition(&mut self, host: &mut dyn Host, event: Event) -> bool {
        let old = self.tcb.state;

        let Some(new) = transition(old, event, self.tcb.active) else {
            debug!(
                "[{}] ({}) event {} leaves state unchanged",
                self.tcb.socket, old, event
            );
            return old != ConnectionState::CLOSED;
        };

        if new == old {
            return true;
        }

        info!(
            "[{}] ({}) transitioning to {} on {}",
            self.tcb.socket, old, new, event
        );

        self.tcb.state = new;
        self.state_entered(host)
    }

    fn state_entered(&mut self, host: &mut dyn Host) -> bool {
        let (app, conn) = (self.tcb.app, self.tcb.conn);

        match self.tcb.state {
            ConnectionState::INIT | ConnectionState::SYN_SENT | ConnectionState::SYN_RCVD => {}
            ConnectionState::LISTEN => {
                // Back from SYN-RCVD: forget the failed handshake.
                self.tcb.timers.cancel_all(host);
                self.alg.connection_closed(host);

                if self.forked {
                    // A forked copy never listens; its parent still does.
                    self.closure_indicated = true;
                    self.tcb.state = ConnectionState::CLOSED;
                    return false;
                }

                let mut tcb = self.tcb.clone_listening(conn);
                if let Some(socket) = self.listen_socket {
                    tcb.socket = socket;
                }
                self.tcb = tcb;
                self.alg = CongestionControl::new(self.alg.kind());
            }
            ConnectionState::ESTABLISHED
            | ConnectionState::CLOSE_WAIT
            | ConnectionState::LAST_ACK
            | ConnectionState::FIN_WAIT_1
            | ConnectionState::CLOSING => {
                self.tcb.timers.conn_estab.cancel(host);
                self.tcb.timers.syn_rexmit.cancel(host);

                if self.tcb.state == ConnectionState::CLOSE_WAIT {
                    self.indicate(host, Indication::PeerClosed);
                }
            }
            ConnectionState::FIN_WAIT_2 => {
                self.tcb.timers.conn_estab.cancel(host);
                self.tcb.timers.syn_rexmit.cancel(host);
                self.tcb
                    .timers
                    .fin_wait2
                    .schedule(host, app, conn, FIN_WAIT_2_TIMEOUT);
            }
            ConnectionState::TIME_WAIT => {
                self.tcb.timers.conn_estab.cancel(host);
                self.tcb.timers.syn_rexmit.cancel(host);
                self.tcb.timers.fin_wait2.cancel(host);

                let two_msl = self.tcb.config.msl * 2;
                self.tcb.timers.two_msl.schedule(host, app, conn, two_msl);

                self.indicate(host, Indication::Closed);
            }
            ConnectionState::CLOSED => {
                self.tcb.timers.cancel_all(host);
                self.alg.connection_closed(host);

                if !self.closure_indicated {
                    self.indicate(host, Indication::Closed);
                }

                return false;
            }
        }

        true
    }

    /// A CLOSE deferred behind queued data completes once the FIN went out
    /// with the last segment.
    fn process_deferred_close(&mut self, host: &mut dyn Host) -> bool {
        let pending = matches!(
            self.tcb.state,
            ConnectionState::SYN_RCVD | ConnectionState::ESTABLISHED | ConnectionState::CLOSE_WAIT
        );

        if !pending || !self.tcb.fin.send_fin || !seq_gt(self.tcb.snd.max, self.tcb.fin.snd_fin_seq) {
            return true;
        }

        if !self.perform_state_transition(host, Event::CLOSE) {
            return false;
        }

        let fin_acked = self.tcb.fin.fin_ack_rcvd
            && matches!(
                self.tcb.state,
                ConnectionState::FIN_WAIT_1 | ConnectionState::LAST_ACK
            );

        if fin_acked {
            return self.perform_state_transition(host, Event::RCV_ACK);
        }

        true
    }
}
