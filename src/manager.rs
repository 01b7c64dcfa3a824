//! Demultiplexing of segments, commands and timer expiries to connections.

use std::collections::{HashMap, hash_map::Entry};

use crate::protocol::{
    AppId, Command, ConnId, Connection, ConnectionState, Host, Socket, SocketAddr, Tcb,
    TcpSegment, Timer, TimerHandle,
};
use crate::{CommandError, Result, TcpConfig, debug, info};

/// Lowest port handed out for active opens without a local port.
pub const EPHEMERAL_PORT_LOW: u16 = 1024;

/// One past the highest ephemeral port.
pub const EPHEMERAL_PORT_HIGH: u16 = 5000;

type Key = (AppId, ConnId);

/// Owns every connection of one TCP instance.
///
/// Connections are reachable by socket pair, for segments arriving from the
/// network, and by `(application, connection id)`, for commands and timers.
/// A connection is dropped as soon as it reaches CLOSED.
#[derive(Debug)]
pub struct ConnectionManager {
    config: TcpConfig,
    connections: HashMap<Key, Connection>,
    sockets: HashMap<Socket, Key>,
    next_ephemeral_port: u16,
    next_conn_id: u32,
}

impl ConnectionManager {
    /// Creates a manager whose connections use `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TcpConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            connections: HashMap::new(),
            sockets: HashMap::new(),
            next_ephemeral_port: EPHEMERAL_PORT_LOW,
            next_conn_id: 1,
        })
    }

    /// Configuration applied to new connections.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Number of live connections, listeners included.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Looks up a connection by its identifiers.
    pub fn connection(&self, app: AppId, conn: ConnId) -> Option<&Connection> {
        self.connections.get(&(app, conn))
    }

    /// Connections owned by `app`, including those forked by its listeners.
    pub fn connections_of(&self, app: AppId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |((a, _), _)| *a == app)
            .map(|(_, c)| c)
    }

    /// Connection id not yet used by `app`.
    pub fn allocate_conn_id(&mut self, app: AppId) -> ConnId {
        loop {
            let id = ConnId(self.next_conn_id);
            self.next_conn_id = self.next_conn_id.wrapping_add(1).max(1);

            if !self.connections.contains_key(&(app, id)) {
                return id;
            }
        }
    }

    /// Executes an application command on connection `conn` of `app`. OPEN
    /// commands create the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unknown, no ephemeral port is
    /// left, the socket pair is taken, or the connection rejects the command
    /// in its current state.
    pub fn process_command(
        &mut self,
        host: &mut dyn Host,
        app: AppId,
        conn: ConnId,
        command: Command,
    ) -> Result<()> {
        let key = (app, conn);

        let command = match command {
            Command::OpenActive {
                mut local,
                remote,
                algorithm,
            } => {
                if !self.connections.contains_key(&key) {
                    if local.port == 0 {
                        local.port = self.allocate_ephemeral_port()?;
                    }

                    let socket = Socket::new(local, remote);
                    if self.sockets.contains_key(&socket) {
                        return Err(CommandError::SocketInUse(socket).into());
                    }
                }

                Command::OpenActive {
                    local,
                    remote,
                    algorithm,
                }
            }
            Command::OpenPassive { local, .. } => {
                let socket = Socket::new(local, SocketAddr::default());
                if !self.connections.contains_key(&key) && self.sockets.contains_key(&socket) {
                    return Err(CommandError::SocketInUse(socket).into());
                }

                command
            }
            command => command,
        };

        let opening = matches!(
            command,
            Command::OpenActive { .. } | Command::OpenPassive { .. }
        );

        let connection = match self.connections.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) if opening => {
                debug!("[{}] ({}) creating connection", app, conn);
                entry.insert(Connection::new(app, conn, self.config.clone()))
            }
            Entry::Vacant(_) => {
                return Err(CommandError::UnknownConnection {
                    app: app.0,
                    conn: conn.0,
                }
                .into());
            }
        };

        let old_socket = connection.socket();
        let result = connection.process_command(host, command);

        match result {
            Ok(alive) => {
                self.after_event(key, old_socket, alive);
                Ok(())
            }
            Err(err) => {
                // A failed OPEN leaves nothing behind.
                if connection.state() == ConnectionState::INIT {
                    self.connections.remove(&key);
                }

                Err(err.into())
            }
        }
    }

    /// Processes a segment received from `src` for `dst`.
    pub fn process_segment(
        &mut self,
        host: &mut dyn Host,
        seg: &TcpSegment,
        src: [u8; 4],
        dst: [u8; 4],
    ) {
        let socket = Socket::new(
            SocketAddr::new(dst, seg.header.dst_port()),
            SocketAddr::new(src, seg.header.src_port()),
        );

        let Some(key) = self.find(socket) else {
            self.segment_arrives_on_closed(host, seg, socket);
            return;
        };

        let Some(listener) = self.connections.get(&key) else {
            return;
        };

        let h = &seg.header;
        if listener.state() == ConnectionState::LISTEN
            && listener.forks()
            && h.syn()
            && !h.ack()
            && !h.rst()
        {
            let (app, _) = key;
            let id = self.allocate_conn_id(app);

            let Some(listener) = self.connections.get(&key) else {
                return;
            };
            let mut child = listener.fork_listening(id);

            info!(
                "[{}] ({}) forking {} for incoming SYN from {}",
                listener.socket(),
                listener.state(),
                id,
                socket.remote
            );

            if child.process_segment(host, seg, src, dst) {
                self.sockets.insert(child.socket(), (app, id));
                self.connections.insert((app, id), child);
            }
            return;
        }

        let Some(connection) = self.connections.get_mut(&key) else {
            return;
        };

        let old_socket = connection.socket();
        let alive = connection.process_segment(host, seg, src, dst);

        self.after_event(key, old_socket, alive);
    }

    /// Processes the expiry of a timer previously scheduled through
    /// [`Host::schedule_at`].
    pub fn process_timer(&mut self, host: &mut dyn Host, handle: TimerHandle, timer: Timer) {
        let key = (timer.app, timer.conn);

        let Some(connection) = self.connections.get_mut(&key) else {
            debug!(
                "[{}] ({}) {} timer for unknown connection",
                timer.app, timer.conn, timer.kind
            );
            return;
        };

        let old_socket = connection.socket();
        let alive = connection.process_timer(host, timer.kind, handle);

        self.after_event(key, old_socket, alive);
    }

    /// Exact socket pair first, then a listener bound to any local address,
    /// then listeners waiting for any peer.
    fn find(&self, socket: Socket) -> Option<Key> {
        [
            socket,
            socket.with_any_local_addr(),
            socket.with_any_remote(),
            socket.with_any_local_addr().with_any_remote(),
        ]
        .iter()
        .find_map(|s| self.sockets.get(s).copied())
    }

    /// Keeps the socket index in step with the connection after an event and
    /// drops connections that reached CLOSED.
    fn after_event(&mut self, key: Key, old_socket: Socket, alive: bool) {
        if self.sockets.get(&old_socket) == Some(&key) {
            self.sockets.remove(&old_socket);
        }

        if !alive {
            if let Some(c) = self.connections.remove(&key) {
                info!("[{}] ({}) connection removed", c.socket(), c.state());
            }
            return;
        }

        if let Some(c) = self.connections.get(&key) {
            if c.state() != ConnectionState::INIT {
                self.sockets.insert(c.socket(), key);
            }
        }
    }

    /// RFC 793 (3.9) SEGMENT ARRIVES, if the state is CLOSED.
    ///
    /// An incoming segment containing a RST is discarded. An incoming segment
    /// not containing a RST causes a RST to be sent in response.
    ///
    /// If the ACK bit is off, sequence number zero is used,
    ///
    ///   <SEQ=0><ACK=SEG.SEQ+SEG.LEN><CTL=RST,ACK>
    ///
    /// If the ACK bit is on,
    ///
    ///   <SEQ=SEG.ACK><CTL=RST>
    fn segment_arrives_on_closed(&mut self, host: &mut dyn Host, seg: &TcpSegment, socket: Socket) {
        debug!("[{}] no connection for {}", socket, seg);

        if seg.header.rst() {
            return;
        }

        if seg.header.ack() {
            Tcb::send_rst_to(host, seg.ack(), socket);
        } else {
            let ack = seg.seq().wrapping_add(seg.seg_len());
            Tcb::send_rst_ack_to(host, 0, ack, socket);
        }
    }

    /// Next ephemeral port no connection uses locally, scanning the range
    /// with wraparound.
    fn allocate_ephemeral_port(&mut self) -> Result<u16> {
        let range = EPHEMERAL_PORT_HIGH - EPHEMERAL_PORT_LOW;

        for _ in 0..range {
            let port = self.next_ephemeral_port;

            self.next_ephemeral_port += 1;
            if self.next_ephemeral_port == EPHEMERAL_PORT_HIGH {
                self.next_ephemeral_port = EPHEMERAL_PORT_LOW;
            }

            if !self.sockets.keys().any(|s| s.local.port == port) {
                return Ok(port);
            }
        }

        Err(CommandError::EphemeralPortsExhausted {
            low: EPHEMERAL_PORT_LOW,
            high: EPHEMERAL_PORT_HIGH,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::protocol::testing::RecordingHost;
    use crate::protocol::{Indication, TcpHeader, TimerKind};
    use crate::Error;

    const LOCAL: [u8; 4] = [10, 0, 0, 1];
    const REMOTE: [u8; 4] = [10, 0, 0, 2];
    const APP: AppId = AppId(7);

    fn syn_from(port: u16, seq: u32) -> TcpSegment {
        let mut h = TcpHeader::new(port, 80, seq, 8000);
        h.set_syn();
        TcpSegment::new(h, &[])
    }

    fn ack_from(port: u16, seq: u32, ack: u32) -> TcpSegment {
        let mut h = TcpHeader::new(port, 80, seq, 8000);
        h.set_ack();
        h.set_ack_number(ack);
        TcpSegment::new(h, &[])
    }

    fn listen(mgr: &mut ConnectionManager, host: &mut RecordingHost, fork: bool) {
        mgr.process_command(
            host,
            APP,
            ConnId(100),
            Command::OpenPassive {
                local: SocketAddr::new(SocketAddr::UNSPECIFIED, 80),
                fork,
                algorithm: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn manager_passive_open_accepts_connection() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();
        listen(&mut mgr, &mut host, false);

        mgr.process_segment(&mut host, &syn_from(4000, 100), REMOTE, LOCAL);

        let c = mgr.connection(APP, ConnId(100)).unwrap();
        assert_eq!(c.state(), ConnectionState::SYN_RCVD);
        assert_eq!(c.socket().remote, SocketAddr::new(REMOTE, 4000));

        let syn_ack = host.last_sent();
        assert_eq!(syn_ack.ack(), 101);
        let iss = syn_ack.seq();

        mgr.process_segment(&mut host, &ack_from(4000, 101, iss + 1), REMOTE, LOCAL);
        assert_eq!(
            mgr.connection(APP, ConnId(100)).unwrap().state(),
            ConnectionState::ESTABLISHED
        );
    }

    #[test]
    fn manager_forking_listener_keeps_listening() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();
        listen(&mut mgr, &mut host, true);

        mgr.process_segment(&mut host, &syn_from(4000, 100), REMOTE, LOCAL);
        mgr.process_segment(&mut host, &syn_from(4001, 900), REMOTE, LOCAL);

        assert_eq!(mgr.len(), 3);
        assert_eq!(
            mgr.connection(APP, ConnId(100)).unwrap().state(),
            ConnectionState::LISTEN
        );

        let children: Vec<_> = mgr
            .connections_of(APP)
            .filter(|c| c.conn_id() != ConnId(100))
            .collect();
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.state() == ConnectionState::SYN_RCVD));

        // The handshake completes on the child owning the socket pair.
        let syn_ack = &host.sent[1].0;
        assert_eq!(syn_ack.ack(), 901);
        let seg = ack_from(4001, 901, syn_ack.seq() + 1);
        mgr.process_segment(&mut host, &seg, REMOTE, LOCAL);

        let established = mgr
            .connections_of(APP)
            .filter(|c| c.state() == ConnectionState::ESTABLISHED)
            .count();
        assert_eq!(established, 1);
    }

    #[test]
    fn manager_closed_port_answers_with_reset() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();

        mgr.process_segment(&mut host, &syn_from(4000, 100), REMOTE, LOCAL);
        let (rst, src, dst) = host.sent.last().unwrap();
        assert!(rst.header.rst() && rst.header.ack());
        assert_eq!((rst.seq(), rst.ack()), (0, 101));
        assert_eq!((*src, *dst), (LOCAL, REMOTE));

        mgr.process_segment(&mut host, &ack_from(4000, 100, 555), REMOTE, LOCAL);
        let rst = host.last_sent();
        assert!(rst.header.rst() && !rst.header.ack());
        assert_eq!(rst.seq(), 555);

        let mut h = TcpHeader::new(4000, 80, 100, 0);
        h.set_rst();
        mgr.process_segment(&mut host, &TcpSegment::new(h, &[]), REMOTE, LOCAL);
        assert_eq!(host.sent.len(), 2);
    }

    #[test]
    fn manager_assigns_ephemeral_ports() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();

        for conn in 1..=2 {
            mgr.process_command(
                &mut host,
                APP,
                ConnId(conn),
                Command::OpenActive {
                    local: SocketAddr::default(),
                    remote: SocketAddr::new(REMOTE, 80),
                    algorithm: None,
                },
            )
            .unwrap();
        }

        assert_eq!(mgr.connection(APP, ConnId(1)).unwrap().socket().local.port, 1024);
        assert_eq!(mgr.connection(APP, ConnId(2)).unwrap().socket().local.port, 1025);

        // The SYN-ACK reaches the connection through the wildcard local
        // address, which is then filled in.
        let syn = &host.sent[0].0;
        let mut h = TcpHeader::new(80, 1024, 5000, 8000);
        h.set_syn();
        h.set_ack();
        h.set_ack_number(syn.seq() + 1);
        mgr.process_segment(&mut host, &TcpSegment::new(h, &[]), REMOTE, LOCAL);

        let c = mgr.connection(APP, ConnId(1)).unwrap();
        assert_eq!(c.state(), ConnectionState::ESTABLISHED);
        assert_eq!(c.socket().local, SocketAddr::new(LOCAL, 1024));
    }

    #[test]
    fn manager_reports_exhausted_ephemeral_ports() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();

        let open = |port| Command::OpenActive {
            local: SocketAddr::default(),
            remote: SocketAddr::new(REMOTE, port),
            algorithm: None,
        };

        for conn in 0..(EPHEMERAL_PORT_HIGH - EPHEMERAL_PORT_LOW) as u32 {
            mgr.process_command(&mut host, APP, ConnId(conn + 1), open(80))
                .unwrap();
        }

        let err = mgr
            .process_command(&mut host, APP, ConnId(99_999), open(80))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::EphemeralPortsExhausted { .. })
        ));
        assert!(mgr.connection(APP, ConnId(99_999)).is_none());
    }

    #[test]
    fn manager_rejects_unknown_connection_and_socket_reuse() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();

        let err = mgr
            .process_command(&mut host, APP, ConnId(1), Command::Send(vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::UnknownConnection { app: 7, conn: 1 })
        ));

        listen(&mut mgr, &mut host, false);
        let err = mgr
            .process_command(
                &mut host,
                APP,
                ConnId(2),
                Command::OpenPassive {
                    local: SocketAddr::new(SocketAddr::UNSPECIFIED, 80),
                    fork: false,
                    algorithm: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::SocketInUse(_))));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn manager_removes_closed_connections() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();
        listen(&mut mgr, &mut host, false);

        mgr.process_command(&mut host, APP, ConnId(100), Command::Close)
            .unwrap();

        assert!(mgr.is_empty());
        assert_eq!(host.indications.last().unwrap().2, Indication::Closed);

        // The port is closed again.
        mgr.process_segment(&mut host, &syn_from(4000, 100), REMOTE, LOCAL);
        assert!(host.last_sent().header.rst());
    }

    #[test]
    fn manager_routes_timers() {
        let mut host = RecordingHost::default();
        let mut mgr = ConnectionManager::new(TcpConfig::default()).unwrap();

        mgr.process_command(
            &mut host,
            APP,
            ConnId(1),
            Command::OpenActive {
                local: SocketAddr::new(LOCAL, 2000),
                remote: SocketAddr::new(REMOTE, 80),
                algorithm: None,
            },
        )
        .unwrap();

        let handle = host.expire(TimerKind::SynRexmit).unwrap();
        let timer = Timer {
            app: APP,
            conn: ConnId(1),
            kind: TimerKind::SynRexmit,
        };
        mgr.process_timer(&mut host, handle, timer);

        assert_eq!(host.sent.len(), 2);
        assert!(host.last_sent().header.syn());
        assert_eq!(host.now, Duration::from_secs(3));

        // Expiries for unknown connections are ignored.
        mgr.process_timer(
            &mut host,
            handle,
            Timer {
                conn: ConnId(2),
                ..timer
            },
        );
        assert_eq!(host.sent.len(), 2);
    }

    #[test]
    fn manager_rejects_invalid_config() {
        assert!(matches!(
            ConnectionManager::new(TcpConfig::default().with_mss(0)),
            Err(Error::Config(_))
        ));
    }
}
