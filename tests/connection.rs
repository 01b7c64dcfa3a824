mod common;

use std::time::Duration;

use common::{A_ADDR, B_ADDR, CLIENT, Net, SERVER, Side, pattern};
use tcp::{Command, ConnId, ConnectionState, Indication, SocketAddr, TcpConfig, TimerKind};

fn config() -> TcpConfig {
    TcpConfig::default()
        .with_mss(500)
        .with_increased_iw(true)
}

fn client_state(net: &Net) -> Option<ConnectionState> {
    net.a.connection(CLIENT, ConnId(1)).map(|c| c.state())
}

fn server_state(net: &Net) -> Option<ConnectionState> {
    net.b.connection(SERVER, ConnId(1)).map(|c| c.state())
}

#[test]
fn handshake_establishes_both_ends() {
    let mut net = Net::new(config(), config());
    net.connect();

    assert_eq!(client_state(&net), Some(ConnectionState::ESTABLISHED));
    assert_eq!(server_state(&net), Some(ConnectionState::ESTABLISHED));

    let client = net.a.connection(CLIENT, ConnId(1)).unwrap().tcb();
    let server = net.b.connection(SERVER, ConnId(1)).unwrap().tcb();

    assert_eq!(client.rcv.irs, server.snd.iss);
    assert_eq!(server.rcv.irs, client.snd.iss);
    assert_eq!(client.snd.mss, 500);
    assert_eq!(server.snd.mss, 500);

    assert!(net.ha.indicated(
        ConnId(1),
        &Indication::Established {
            local: SocketAddr::new(A_ADDR, 2000),
            remote: SocketAddr::new(B_ADDR, 80),
        }
    ));
    assert!(net.hb.indicated(
        ConnId(1),
        &Indication::Established {
            local: SocketAddr::new(B_ADDR, 80),
            remote: SocketAddr::new(A_ADDR, 2000),
        }
    ));

    // SYN, SYN+ACK, ACK
    assert_eq!(net.log.len(), 3);
    assert!(net.log[0].2.header.syn() && !net.log[0].2.header.ack());
    assert!(net.log[1].2.header.syn() && net.log[1].2.header.ack());
    assert_eq!(net.log[1].2.ack(), client.snd.iss.wrapping_add(1));
    assert_eq!(net.log[2].2.ack(), server.snd.iss.wrapping_add(1));
}

#[test]
fn send_is_split_into_mss_sized_segments() {
    let mut net = Net::new(config(), config());
    net.connect();

    let iss = net.a.connection(CLIENT, ConnId(1)).unwrap().tcb().snd.iss;
    let data = pattern(1000);

    net.command(Side::A, CLIENT, ConnId(1), Command::Send(data.clone()))
        .unwrap();

    let sent = net.data_sent_by(Side::A);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].seq(), iss.wrapping_add(1));
    assert_eq!(sent[0].payload_len(), 500);
    assert_eq!(sent[1].seq(), iss.wrapping_add(501));
    assert_eq!(sent[1].payload_len(), 500);
    assert!(net.ha.timer(ConnId(1), TimerKind::Rexmit).is_some());

    net.run_for(Duration::from_millis(100));

    let client = net.a.connection(CLIENT, ConnId(1)).unwrap().tcb();
    assert_eq!(client.snd.una, iss.wrapping_add(1001));
    assert!(net.ha.timer(ConnId(1), TimerKind::Rexmit).is_none());
    assert_eq!(net.hb.received(ConnId(1)), data);
}

#[test]
fn data_flows_both_ways() {
    let mut net = Net::new(config(), config());
    net.connect();

    let request = pattern(300);
    let response = pattern(4000);

    net.command(Side::A, CLIENT, ConnId(1), Command::Send(request.clone()))
        .unwrap();
    net.command(Side::B, SERVER, ConnId(1), Command::Send(response.clone()))
        .unwrap();

    assert!(net.run_until(Duration::from_secs(5), |net| {
        net.ha.received(ConnId(1)).len() == response.len()
            && net.hb.received(ConnId(1)).len() == request.len()
    }));

    assert_eq!(net.hb.received(ConnId(1)), request);
    assert_eq!(net.ha.received(ConnId(1)), response);
}

#[test]
fn graceful_close_passes_through_time_wait() {
    let msl = Duration::from_secs(30);
    let mut net = Net::new(config().with_msl(msl), config().with_msl(msl));
    net.connect();

    net.command(Side::A, CLIENT, ConnId(1), Command::Close).unwrap();

    assert_eq!(client_state(&net), Some(ConnectionState::FIN_WAIT_1));
    assert!(net.log.last().unwrap().2.header.fin());

    net.run_for(Duration::from_millis(100));

    assert_eq!(client_state(&net), Some(ConnectionState::FIN_WAIT_2));
    assert_eq!(server_state(&net), Some(ConnectionState::CLOSE_WAIT));
    assert!(net.hb.indicated(ConnId(1), &Indication::PeerClosed));

    // The half-open direction still carries data.
    net.command(Side::B, SERVER, ConnId(1), Command::Send(pattern(200)))
        .unwrap();
    net.command(Side::B, SERVER, ConnId(1), Command::Close).unwrap();
    assert_eq!(server_state(&net), Some(ConnectionState::LAST_ACK));

    net.run_for(Duration::from_millis(100));

    assert_eq!(net.ha.received(ConnId(1)), pattern(200));
    assert_eq!(client_state(&net), Some(ConnectionState::TIME_WAIT));
    assert!(net.ha.indicated(ConnId(1), &Indication::Closed));
    assert_eq!(server_state(&net), None);
    assert!(net.hb.indicated(ConnId(1), &Indication::Closed));

    let deadline = net.ha.timer(ConnId(1), TimerKind::TwoMsl).unwrap();
    assert!(deadline >= net.now() + 2 * msl - Duration::from_millis(200));

    net.run_for(2 * msl);

    assert_eq!(client_state(&net), None);
    assert!(net.a.is_empty());
    let closed = net
        .ha
        .indications
        .iter()
        .filter(|(_, _, i)| *i == Indication::Closed)
        .count();
    assert_eq!(closed, 1);
}

#[test]
fn simultaneous_close_meets_in_closing() {
    let msl = Duration::from_secs(10);
    let mut net = Net::new(config().with_msl(msl), config().with_msl(msl));
    net.connect();

    net.command(Side::A, CLIENT, ConnId(1), Command::Close).unwrap();
    net.command(Side::B, SERVER, ConnId(1), Command::Close).unwrap();

    assert_eq!(client_state(&net), Some(ConnectionState::FIN_WAIT_1));
    assert_eq!(server_state(&net), Some(ConnectionState::FIN_WAIT_1));

    net.run_for(Duration::from_millis(100));

    assert_eq!(client_state(&net), Some(ConnectionState::TIME_WAIT));
    assert_eq!(server_state(&net), Some(ConnectionState::TIME_WAIT));

    net.run_for(2 * msl);

    assert!(net.a.is_empty());
    assert!(net.b.is_empty());
}

#[test]
fn repeated_timeouts_abort_the_connection() {
    let mut net = Net::new(config(), config());
    net.connect();

    // The link dies after the handshake.
    net.set_drop_rule(|_, _| true);
    net.command(Side::A, CLIENT, ConnId(1), Command::Send(pattern(100)))
        .unwrap();

    assert!(net.run_until(Duration::from_secs(3600), |net| net.a.is_empty()));

    assert!(net.ha.indicated(ConnId(1), &Indication::TimedOut));
    assert!(!net.ha.indicated(ConnId(1), &Indication::Closed));

    // The original transmission and one retransmission per timeout but the
    // last.
    let copies = net.data_sent_by(Side::A).len();
    assert_eq!(copies, 12);

    // Successive timeouts back off.
    let times: Vec<Duration> = net
        .log
        .iter()
        .filter(|(_, side, seg)| *side == Side::A && seg.payload_len() > 0)
        .map(|(t, _, _)| *t)
        .collect();
    assert!(times.windows(3).all(|w| w[2] - w[1] >= w[1] - w[0]));
}

#[test]
fn connect_to_closed_port_is_reset() {
    let mut net = Net::new(config(), config());

    net.command(
        Side::A,
        CLIENT,
        ConnId(1),
        Command::OpenActive {
            local: SocketAddr::new(A_ADDR, 0),
            remote: SocketAddr::new(B_ADDR, 81),
            algorithm: None,
        },
    )
    .unwrap();

    net.run_for(Duration::from_millis(100));

    assert!(net.ha.indicated(ConnId(1), &Indication::ConnectionReset));
    assert!(net.a.is_empty());
    assert!(net.b.is_empty());
}

#[test]
fn abort_resets_the_peer() {
    let mut net = Net::new(config(), config());
    net.connect();

    net.command(Side::A, CLIENT, ConnId(1), Command::Abort).unwrap();
    assert!(net.a.is_empty());
    assert!(net.log.last().unwrap().2.header.rst());

    net.run_for(Duration::from_millis(100));

    assert!(net.hb.indicated(ConnId(1), &Indication::ConnectionReset));
    assert!(net.b.is_empty());
}

#[test]
fn lost_syn_is_retransmitted() {
    let mut net = Net::new(config(), config());

    let mut syns = 0;
    net.set_drop_rule(move |side, seg| {
        if side == Side::A && seg.header.syn() {
            syns += 1;
            return syns == 1;
        }
        false
    });

    net.connect();
    assert_eq!(client_state(&net), Some(ConnectionState::SYN_SENT));

    assert!(net.run_until(Duration::from_secs(10), |net| {
        client_state(net) == Some(ConnectionState::ESTABLISHED)
    }));
    assert!(net.run_until(Duration::from_secs(1), |net| {
        server_state(net) == Some(ConnectionState::ESTABLISHED)
    }));
}
