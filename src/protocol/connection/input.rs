//! RFC 793 (3.9) SEGMENT ARRIVES.

use std::time::Duration;

use super::{CONN_ESTAB_TIMEOUT, Connection};
use crate::protocol::fsm::{ConnectionState, Event};
use crate::protocol::host::{Host, Indication};
use crate::protocol::segment::TcpSegment;
use crate::protocol::seq::{seq_ge, seq_gt, seq_le, seq_lt};
use crate::protocol::socket::{Socket, SocketAddr};
use crate::protocol::tcb::Tcb;
use crate::{debug, info, warn};

/// Socket pair seen from our side for a segment sent from `src` to `dst`.
fn reply_socket(seg: &TcpSegment, src: [u8; 4], dst: [u8; 4]) -> Socket {
    Socket::new(
        SocketAddr::new(dst, seg.header.dst_port()),
        SocketAddr::new(src, seg.header.src_port()),
    )
}

impl Connection {
    /// Processes a segment sent from `src` to `dst` and demultiplexed to this
    /// connection. Returns `false` once the connection reached CLOSED and
    /// must be deleted.
    pub fn process_segment(
        &mut self,
        host: &mut dyn Host,
        seg: &TcpSegment,
        src: [u8; 4],
        dst: [u8; 4],
    ) -> bool {
        debug!("[{}] ({}) received {}", self.tcb.socket, self.tcb.state, seg);

        let event = match self.tcb.state {
            ConnectionState::LISTEN => self.process_segment_in_listen(host, seg, src, dst),
            ConnectionState::SYN_SENT => self.process_segment_in_syn_sent(host, seg, src, dst),
            ConnectionState::INIT | ConnectionState::CLOSED => {
                warn!(
                    "[{}] ({}) segment for a connection that is not open, dropping",
                    self.tcb.socket, self.tcb.state
                );
                None
            }
            _ => self.process_segment_1st_thru_8th(host, seg),
        };

        let alive = match event {
            Some(event) => self.perform_state_transition(host, event),
            None => true,
        };

        alive && self.process_deferred_close(host)
    }

    fn process_segment_in_listen(
        &mut self,
        host: &mut dyn Host,
        seg: &TcpSegment,
        src: [u8; 4],
        dst: [u8; 4],
    ) -> Option<Event> {
        let h = &seg.header;

        // RFC 793 (3.9)
        //
        // first check for an RST
        //   An incoming RST should be ignored.  Return.
        if h.rst() {
            debug!("[{}] ({}) RST in LISTEN, dropping", self.tcb.socket, self.tcb.state);
            return None;
        }

        // second check for an ACK
        //   Any acknowledgment is bad if it arrives on a connection still in
        //   the LISTEN state.  An acceptable reset segment should be formed
        //   for any arriving ACK-bearing segment.  The RST should be
        //   formatted as follows:
        //
        //     <SEQ=SEG.ACK><CTL=RST>
        if h.ack() {
            Tcb::send_rst_to(host, seg.ack(), reply_socket(seg, src, dst));
            return None;
        }

        // third check for a SYN
        if !h.syn() {
            debug!(
                "[{}] ({}) segment without SYN in LISTEN, dropping",
                self.tcb.socket, self.tcb.state
            );
            return None;
        }

        if h.fin() {
            debug!("[{}] ({}) ignoring FIN in SYN", self.tcb.socket, self.tcb.state);
        }

        self.tcb.socket = reply_socket(seg, src, dst);
        self.process_syn_in_listen(host, seg)
    }

    /// Fills in the peer from its SYN and answers with a SYN+ACK.
    fn process_syn_in_listen(&mut self, host: &mut dyn Host, seg: &TcpSegment) -> Option<Event> {
        let now = host.now();

        self.tcb.init_receive_side(seg.seq());
        self.tcb.select_initial_seq_num(now);

        self.tcb.snd.wnd = self.tcb.segment_window(seg);
        self.tcb.snd.wl1 = seg.seq();
        self.tcb.snd.wl2 = self.tcb.snd.iss;

        self.tcb.read_header_options(seg, now);
        self.tcb.ack_now = true;

        self.tcb.send_syn_ack(host);
        self.tcb.negotiate_options();
        self.start_syn_rexmit_timer(host);

        if !self.tcb.timers.conn_estab.is_scheduled() {
            let (app, conn) = (self.tcb.app, self.tcb.conn);
            self.tcb
                .timers
                .conn_estab
                .schedule(host, app, conn, CONN_ESTAB_TIMEOUT);
        }

        // Data carried by the SYN is kept until the handshake completes.
        self.buffer_handshake_payload(seg);

        Some(Event::RCV_SYN)
    }

    fn process_segment_in_syn_sent(
        &mut self,
        host: &mut dyn Host,
        seg: &TcpSegment,
        src: [u8; 4],
        dst: [u8; 4],
    ) -> Option<Event> {
        let h = &seg.header;
        let ack = seg.ack();

        // first check the ACK bit
        //   If SEG.ACK =< ISS, or SEG.ACK > SND.NXT, send a reset (unless the
        //   RST bit is set, if so drop the segment and return)
        //
        //     <SEQ=SEG.ACK><CTL=RST>
        if h.ack() && (seq_le(ack, self.tcb.snd.iss) || seq_gt(ack, self.tcb.snd.nxt)) {
            if !h.rst() {
                Tcb::send_rst_to(host, ack, reply_socket(seg, src, dst));
            }
            return None;
        }

        // second check the RST bit
        if h.rst() {
            if h.ack() {
                info!(
                    "[{}] ({}) connection reset by peer",
                    self.tcb.socket, self.tcb.state
                );
                self.indicate(host, Indication::ConnectionReset);
                return Some(Event::RCV_RST);
            }

            return None;
        }

        // fourth check the SYN bit
        if !h.syn() {
            return None;
        }

        let now = host.now();

        self.tcb.init_receive_side(seg.seq());

        if h.ack() {
            self.tcb.snd.una = ack;
            self.tcb.send_queue.discard_up_to(ack);
            self.tcb.snd.wnd = self.tcb.segment_window(seg);
            self.tcb.snd.wl1 = seg.seq();
            self.tcb.snd.wl2 = ack;
        }

        if self.tcb.socket.local.is_unspecified_addr() {
            self.tcb.socket.local.addr = dst;
        }

        if seq_gt(self.tcb.snd.una, self.tcb.snd.iss) {
            // Our SYN has been ACKed: enter ESTABLISHED.
            if h.fin() {
                debug!("[{}] ({}) ignoring FIN in SYN+ACK", self.tcb.socket, self.tcb.state);
            }

            self.tcb.read_header_options(seg, now);
            self.tcb.negotiate_options();

            if seg.payload_len() > 0 {
                if self.has_room_for(seg) {
                    self.tcb.rcv.nxt = self.tcb.receive_queue.insert_bytes_from_segment(seg);
                } else {
                    self.tcb.stats.rcv_queue_drops += 1;
                }
            }

            self.tcb.ack_now = true;
            self.indicate_established(host);
            self.alg.established(&mut self.tcb, host, true);
            self.deliver_in_order_data(host);

            return Some(Event::RCV_SYN_ACK);
        }

        // Simultaneous open: <SEQ=ISS><ACK=RCV.NXT><CTL=SYN,ACK>
        info!("[{}] ({}) simultaneous open", self.tcb.socket, self.tcb.state);

        self.tcb.read_header_options(seg, now);
        self.tcb.snd.nxt = self.tcb.snd.iss;
        self.tcb.snd.max = self.tcb.snd.iss;
        self.tcb.send_syn_ack(host);
        self.tcb.negotiate_options();
        self.start_syn_rexmit_timer(host);

        self.buffer_handshake_payload(seg);

        Some(Event::RCV_SYN)
    }

    fn process_segment_1st_thru_8th(&mut self, host: &mut dyn Host, seg: &TcpSegment) -> Option<Event> {
        let now = host.now();
        let h = &seg.header;
        let state = self.tcb.state;
        let payload_len = seg.payload_len();

        // first check sequence number
        if !self.tcb.is_segment_acceptable(seg, now) {
            // If an incoming segment is not acceptable, an acknowledgment
            // should be sent in reply (unless the RST bit is set, if so drop
            // the segment and return)
            if h.rst() {
                debug!(
                    "[{}] ({}) RST with unacceptable sequence number, dropping",
                    self.tcb.socket, state
                );
            } else {
                let end = seg.seq().wrapping_add(payload_len);

                if !h.syn() && payload_len > 0 && self.tcb.opts.sack_enabled && seq_lt(end, self.tcb.rcv.nxt) {
                    // RFC 2883: report the duplicate.
                    self.tcb.sack_report.trigger = Some((seg.seq(), end));
                    self.tcb.sack_report.snd_dsack = true;
                }

                debug!(
                    "[{}] ({}) segment {} not acceptable (RCV.NXT={} RCV.WND={}), acknowledging",
                    self.tcb.socket,
                    state,
                    seg.seq(),
                    self.tcb.rcv.nxt,
                    self.tcb.rcv.wnd
                );
                self.alg.send_ack(&mut self.tcb, host);
            }

            self.tcb.stats.rcv_unacceptable_segments += 1;
            return None;
        }

        self.tcb.read_header_options(seg, now);

        // second check the RST bit
        if h.rst() {
            return Some(self.process_rst(host));
        }

        // fourth check the SYN bit
        //   If the SYN is in the window it is an error, send a reset, any
        //   outstanding RECEIVEs and SEND should receive "reset" responses,
        //   all segment queues should be flushed, the user should also
        //   receive an unsolicited general "connection reset" signal, enter
        //   the CLOSED state, delete the TCB, and return.
        //
        // A SYN+ACK in SYN-RCVD completes a simultaneous open.
        if h.syn() && !(state == ConnectionState::SYN_RCVD && h.ack()) {
            warn!(
                "[{}] ({}) SYN {} inside the window, resetting connection",
                self.tcb.socket,
                state,
                seg.seq()
            );

            let seq = self.tcb.snd.nxt;
            self.tcb.send_rst(host, seq);
            self.indicate(host, Indication::ConnectionReset);

            return Some(Event::RCV_UNEXP_SYN);
        }

        // fifth check the ACK field
        //   if the ACK bit is off drop the segment and return
        if !h.ack() {
            return None;
        }

        let old_snd_una = self.tcb.snd.una;
        let mut event = None;

        if state == ConnectionState::SYN_RCVD {
            // If SND.UNA =< SEG.ACK =< SND.NXT then enter ESTABLISHED state
            // and continue processing.
            //
            //   If the segment acknowledgment is not acceptable, form a
            //   reset segment,
            //
            //     <SEQ=SEG.ACK><CTL=RST>
            //
            //   and send it.
            let ack = seg.ack();

            if !seq_le(self.tcb.snd.una, ack) || !seq_le(ack, self.tcb.snd.nxt) {
                let seq = ack;
                self.tcb.send_rst(host, seq);
                return None;
            }

            self.alg.established(&mut self.tcb, host, false);
            self.indicate_established(host);

            event = Some(Event::RCV_ACK);
        }

        if !matches!(state, ConnectionState::TIME_WAIT) && !self.process_ack(host, seg) {
            // Acknowledges something not yet sent.
            return None;
        }

        if state == ConnectionState::SYN_RCVD {
            // Data queued before the handshake completed.
            self.alg.send_data(&mut self.tcb, host);
        }

        match state {
            ConnectionState::FIN_WAIT_1 if self.tcb.fin.fin_ack_rcvd => {
                // if our FIN is now acknowledged then enter FIN-WAIT-2 and
                // continue processing in that state.
                event = Some(Event::RCV_ACK);
            }
            ConnectionState::CLOSING | ConnectionState::LAST_ACK => {
                // CLOSING: if the ACK acknowledges our FIN then enter the
                // TIME-WAIT state, otherwise ignore the segment.
                //
                // LAST-ACK: the only thing that can arrive in this state is
                // an acknowledgment of our FIN.
                return self.tcb.fin.fin_ack_rcvd.then_some(Event::RCV_ACK);
            }
            ConnectionState::TIME_WAIT => {
                // The only thing that can arrive in this state is a
                // retransmission of the remote FIN.  Acknowledge it, and
                // restart the 2 MSL timeout.
                self.alg.send_ack(&mut self.tcb, host);
                self.restart_2msl_timer(host);
                return None;
            }
            _ => {}
        }

        // sixth check the URG bit: urgent data is not supported.

        // seventh, process the segment text
        let old_rcv_nxt = self.tcb.rcv.nxt;
        let receiving = matches!(
            state,
            ConnectionState::SYN_RCVD
                | ConnectionState::ESTABLISHED
                | ConnectionState::FIN_WAIT_1
                | ConnectionState::FIN_WAIT_2
        );

        if receiving && payload_len > 0 && !self.process_segment_text(host, seg, old_snd_una, &mut event) {
            return event;
        }

        // eighth, check the FIN bit
        if receiving && h.fin() {
            self.tcb.ack_now = true;

            // A FIN above RCV.NXT is remembered until the gap is filled.
            let fin_seq = seg.seq().wrapping_add(payload_len);

            if self.tcb.rcv.nxt == fin_seq {
                debug!(
                    "[{}] ({}) FIN arrived, advancing RCV.NXT over it",
                    self.tcb.socket, state
                );
                self.tcb.rcv.nxt = fin_seq.wrapping_add(1);
                event = Some(self.fin_event());
            } else if seq_gt(fin_seq, self.tcb.rcv.nxt) {
                debug!(
                    "[{}] ({}) FIN at {} above RCV.NXT {}, storing it",
                    self.tcb.socket, state, fin_seq, self.tcb.rcv.nxt
                );
                self.tcb.fin.fin_rcvd = true;
                self.tcb.fin.rcv_fin_seq = fin_seq;
            }
        }

        if self.tcb.rcv.nxt != old_rcv_nxt {
            if self.tcb.opts.sack_enabled && self.tcb.has_out_of_order_data() {
                // RFC 2018 (4): ACKs that leave data queued above RCV.NXT
                // carry SACK options.
                self.tcb.sack_report.trigger = Some((seg.seq(), seg.seq().wrapping_add(payload_len)));
                self.tcb.sack_report.snd_sack = true;
                self.tcb.ack_now = true;
            }

            self.alg.receive_seq_changed(&mut self.tcb, host);
        }

        event
    }

    /// RST in a synchronized state or SYN-RCVD.
    fn process_rst(&mut self, host: &mut dyn Host) -> Event {
        let state = self.tcb.state;

        match state {
            ConnectionState::SYN_RCVD => {
                // Flush the send queue. Only an active open tells the user;
                // a passive one returns to LISTEN.
                let end = self.tcb.send_queue.buffer_end_seq();
                self.tcb.send_queue.discard_up_to(end);

                if self.tcb.active {
                    info!("[{}] ({}) connection refused", self.tcb.socket, state);
                    self.indicate(host, Indication::ConnectionRefused);
                }
            }
            ConnectionState::ESTABLISHED
            | ConnectionState::FIN_WAIT_1
            | ConnectionState::FIN_WAIT_2
            | ConnectionState::CLOSE_WAIT => {
                info!("[{}] ({}) connection reset by peer", self.tcb.socket, state);
                self.indicate(host, Indication::ConnectionReset);
            }
            _ => {
                debug!("[{}] ({}) RST, closing", self.tcb.socket, state);
            }
        }

        Event::RCV_RST
    }

    /// RFC 793 (3.9) ESTABLISHED processing of the acknowledgment field,
    /// shared by every state that has sent a SYN. Returns `false` if the
    /// segment acknowledges data not yet sent and must be dropped.
    fn process_ack(&mut self, host: &mut dyn Host, seg: &TcpSegment) -> bool {
        let ack = seg.ack();
        let payload_len = seg.payload_len();
        let tcb = &mut self.tcb;

        if seq_ge(tcb.snd.una, ack) {
            let old_wnd = tcb.snd.wnd;
            tcb.update_wnd_info(seg);
            let window_changed = tcb.snd.wnd != old_wnd;

            // RFC 5681 (2): a duplicate ACK acknowledges SND.UNA, carries no
            // data, leaves the window unchanged, and arrives while data is
            // outstanding.
            if tcb.snd.una == ack && payload_len == 0 && tcb.snd.una != tcb.snd.max && !window_changed {
                tcb.dupacks += 1;

                debug!(
                    "[{}] ({}) duplicate ACK #{} for {}",
                    tcb.socket, tcb.state, tcb.dupacks, ack
                );

                self.alg.received_duplicate_ack(&mut self.tcb, host);
            } else {
                if window_changed {
                    self.alg.window_updated(&mut self.tcb, host);
                }

                self.tcb.dupacks = 0;
            }
        } else if seq_le(ack, tcb.snd.max) {
            // SND.UNA < SEG.ACK =< SND.MAX
            let old_snd_una = tcb.snd.una;
            tcb.snd.una = ack;

            // After a timeout the ACK may cover data beyond SND.NXT.
            if seq_lt(tcb.snd.nxt, tcb.snd.una) {
                tcb.snd.nxt = tcb.snd.una;
            }

            if tcb.opts.ts_enabled {
                if let Some((_, echoed)) = seg.header.timestamp().filter(|(_, ecr)| *ecr != 0) {
                    self.alg
                        .rtt_measurement_complete_using_ts(&mut self.tcb, host, echoed);
                }
            }

            let tcb = &mut self.tcb;
            let mut discard_up_to = tcb.snd.una;

            if tcb.fin.send_fin && ack == tcb.fin.snd_fin_seq.wrapping_add(1) {
                debug!("[{}] ({}) our FIN is acknowledged", tcb.socket, tcb.state);
                tcb.fin.fin_ack_rcvd = true;
                // The FIN occupies no byte of the send queue.
                discard_up_to = discard_up_to.wrapping_sub(1);
            }

            tcb.send_queue.discard_up_to(discard_up_to);
            if tcb.opts.sack_enabled {
                tcb.rexmit_queue.discard_up_to(discard_up_to);
            }

            tcb.update_wnd_info(seg);

            // Segments carrying data are acknowledged after the text is
            // processed so the ACK covers it.
            if payload_len == 0 && tcb.state != ConnectionState::SYN_RCVD {
                self.alg.received_data_ack(&mut self.tcb, host, old_snd_una);
                self.tcb.dupacks = 0;
            }
        } else {
            // If the ACK acks something not yet sent (SEG.ACK > SND.NXT)
            // then send an ACK, drop the segment, and return.
            self.alg
                .received_ack_for_data_not_yet_sent(&mut self.tcb, host, ack);
            self.tcb.dupacks = 0;

            return false;
        }

        true
    }

    /// Inserts the segment text into the receive queue and delivers what is
    /// in order. Returns `false` if the receive buffer had no room for it.
    fn process_segment_text(
        &mut self,
        host: &mut dyn Host,
        seg: &TcpSegment,
        old_snd_una: u32,
        event: &mut Option<Event>,
    ) -> bool {
        let payload_len = seg.payload_len();
        let old_rcv_nxt = self.tcb.rcv.nxt;
        let mss = self.tcb.snd.mss;

        if payload_len == mss || payload_len + seg.header.options_len() as u32 == mss {
            self.tcb.full_sized_segment_counter += 1;
        }

        // Most likely a zero window probe.
        if payload_len == 1 {
            self.tcb.ack_now = true;
        }

        if !self.has_room_for(seg) {
            self.tcb.stats.rcv_queue_drops += 1;
            warn!(
                "[{}] ({}) receive buffer full, dropping {} bytes at {}",
                self.tcb.socket,
                self.tcb.state,
                payload_len,
                seg.seq()
            );
            return false;
        }

        let old_buffered = self.tcb.receive_queue.buffered_bytes();
        self.tcb.rcv.nxt = self.tcb.receive_queue.insert_bytes_from_segment(seg);

        if seq_gt(self.tcb.snd.una, old_snd_una) {
            self.alg
                .received_data_ack(&mut self.tcb, host, old_snd_una);
            self.tcb.dupacks = 0;
        }

        if self.tcb.rcv.nxt == old_rcv_nxt {
            self.tcb.stats.rcv_out_of_order_segments += 1;

            debug!(
                "[{}] ({}) out-of-order segment {} (RCV.NXT={})",
                self.tcb.socket,
                self.tcb.state,
                seg.seq(),
                self.tcb.rcv.nxt
            );

            if self.tcb.opts.sack_enabled {
                let report = &mut self.tcb.sack_report;
                report.trigger = Some((seg.seq(), seg.seq().wrapping_add(payload_len)));

                if old_buffered == self.tcb.receive_queue.buffered_bytes() {
                    report.snd_dsack = true;
                } else {
                    report.snd_sack = true;
                }
            }

            self.alg
                .received_out_of_order_segment(&mut self.tcb, host);
        } else {
            self.deliver_in_order_data(host);

            // The segment filled the gap below a FIN that arrived earlier.
            if self.tcb.fin.fin_rcvd && self.tcb.rcv.nxt == self.tcb.fin.rcv_fin_seq {
                debug!(
                    "[{}] ({}) gap before FIN filled, advancing RCV.NXT over it",
                    self.tcb.socket, self.tcb.state
                );
                self.tcb.ack_now = true;
                self.tcb.rcv.nxt = self.tcb.fin.rcv_fin_seq.wrapping_add(1);
                *event = Some(self.fin_event());
            }
        }

        true
    }

    /// Event for a FIN that RCV.NXT has reached.
    fn fin_event(&self) -> Event {
        if self.tcb.state == ConnectionState::FIN_WAIT_1 && self.tcb.fin.fin_ack_rcvd {
            Event::RCV_FIN_ACK
        } else {
            Event::RCV_FIN
        }
    }

    /// Whether the segment text fits in the receive buffer.
    fn has_room_for(&self, seg: &TcpSegment) -> bool {
        let first = self.tcb.receive_queue.first_seq();
        let mut seq = seg.seq().wrapping_add(seg.header.syn() as u32);
        let mut len = seg.payload_len();

        if seq_lt(seq, first) {
            len = len.saturating_sub(first.wrapping_sub(seq));
            seq = first;
        }

        seq_le(
            seq.wrapping_add(len),
            first.wrapping_add(self.tcb.max_rcv_buffer),
        )
    }

    /// Keeps data carried by a SYN without acknowledging it yet.
    fn buffer_handshake_payload(&mut self, seg: &TcpSegment) {
        if seg.payload_len() == 0 {
            return;
        }

        if self.has_room_for(seg) {
            self.tcb.receive_queue.insert_bytes_from_segment(seg);
        } else {
            self.tcb.stats.rcv_queue_drops += 1;
        }
    }

    /// Hands in-order data to the application.
    fn deliver_in_order_data(&mut self, host: &mut dyn Host) {
        let data = self.tcb.receive_queue.extract_bytes_up_to(self.tcb.rcv.nxt);

        if !data.is_empty() {
            self.indicate(host, Indication::Data(data));
        }
    }

    fn restart_2msl_timer(&mut self, host: &mut dyn Host) {
        let (app, conn) = (self.tcb.app, self.tcb.conn);
        let two_msl: Duration = self.tcb.config.msl * 2;

        self.tcb.timers.two_msl.schedule(host, app, conn, two_msl);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::Command;
    use super::*;
    use crate::TcpConfig;
    use crate::protocol::headers::{TcpHeader, TcpOption};
    use crate::protocol::host::{AppId, ConnId};
    use crate::protocol::testing::RecordingHost;
    use crate::protocol::timer::TimerKind;

    const LOCAL: [u8; 4] = [10, 0, 0, 1];
    const REMOTE: [u8; 4] = [10, 0, 0, 2];

    fn segment(seq: u32, ack: Option<u32>, payload: &[u8]) -> TcpSegment {
        let mut h = TcpHeader::new(80, 1000, seq, 8000);
        if let Some(ack) = ack {
            h.set_ack();
            h.set_ack_number(ack);
        }
        TcpSegment::new(h, payload)
    }

    fn syn(seq: u32, ack: Option<u32>) -> TcpSegment {
        let mut s = segment(seq, ack, &[]);
        s.header.set_syn();
        s.header.push_option(TcpOption::Mss(500)).unwrap();
        s
    }

    fn fin(seq: u32, ack: u32, payload: &[u8]) -> TcpSegment {
        let mut s = segment(seq, Some(ack), payload);
        s.header.set_fin();
        s
    }

    fn rst(seq: u32) -> TcpSegment {
        let mut s = segment(seq, None, &[]);
        s.header.set_rst();
        s
    }

    fn deliver(c: &mut Connection, host: &mut RecordingHost, seg: TcpSegment) -> bool {
        c.process_segment(host, &seg, REMOTE, LOCAL)
    }

    /// ISS 1000, peer IRS 5000.
    fn open_active(host: &mut RecordingHost) -> Connection {
        host.now = Duration::from_millis(4);

        let mut c = Connection::new(AppId(1), ConnId(1), TcpConfig::default());
        c.process_command(
            host,
            Command::OpenActive {
                local: SocketAddr::new(LOCAL, 1000),
                remote: SocketAddr::new(REMOTE, 80),
                algorithm: None,
            },
        )
        .unwrap();
        c
    }

    fn established(host: &mut RecordingHost) -> Connection {
        let mut c = open_active(host);
        assert!(deliver(&mut c, host, syn(5000, Some(1001))));
        c
    }

    fn open_passive(host: &mut RecordingHost) -> Connection {
        host.now = Duration::from_millis(4);

        let mut c = Connection::new(AppId(1), ConnId(1), TcpConfig::default());
        c.process_command(
            host,
            Command::OpenPassive {
                local: SocketAddr::new(LOCAL, 1000),
                fork: false,
                algorithm: None,
            },
        )
        .unwrap();
        c
    }

    fn data_indications(host: &RecordingHost) -> Vec<u8> {
        host.indications
            .iter()
            .filter_map(|(_, _, i)| match i {
                Indication::Data(d) => Some(d.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn input_active_handshake() {
        let mut host = RecordingHost::default();
        let c = established(&mut host);

        assert_eq!(c.state(), ConnectionState::ESTABLISHED);
        assert_eq!(c.tcb().snd.mss, 500);
        assert_eq!(c.tcb().rcv.nxt, 5001);

        let ack = host.last_sent();
        assert!(ack.header.ack() && !ack.header.syn());
        assert_eq!(ack.seq(), 1001);
        assert_eq!(ack.ack(), 5001);

        assert_eq!(
            host.indications[0].2,
            Indication::Established {
                local: SocketAddr::new(LOCAL, 1000),
                remote: SocketAddr::new(REMOTE, 80),
            }
        );
        assert!(host.timer(TimerKind::SynRexmit).is_none());
        assert!(host.timer(TimerKind::ConnEstab).is_none());
    }

    #[test]
    fn input_passive_handshake() {
        let mut host = RecordingHost::default();
        let mut c = open_passive(&mut host);

        assert!(deliver(&mut c, &mut host, syn(5000, None)));
        assert_eq!(c.state(), ConnectionState::SYN_RCVD);
        assert_eq!(c.socket().remote, SocketAddr::new(REMOTE, 80));

        let syn_ack = host.last_sent();
        assert!(syn_ack.header.syn() && syn_ack.header.ack());
        assert_eq!(syn_ack.seq(), 1000);
        assert_eq!(syn_ack.ack(), 5001);
        assert_eq!(host.sent.last().unwrap().2, REMOTE);

        assert!(deliver(&mut c, &mut host, segment(5001, Some(1001), &[])));
        assert_eq!(c.state(), ConnectionState::ESTABLISHED);
        assert!(matches!(
            host.indications.last().unwrap().2,
            Indication::Established { .. }
        ));
    }

    #[test]
    fn input_ack_in_listen_is_reset() {
        let mut host = RecordingHost::default();
        let mut c = open_passive(&mut host);

        assert!(deliver(&mut c, &mut host, segment(5000, Some(777), &[])));
        assert_eq!(c.state(), ConnectionState::LISTEN);

        let (rst, src, dst) = host.sent.last().unwrap();
        assert!(rst.header.rst());
        assert_eq!(rst.seq(), 777);
        assert_eq!((*src, *dst), (LOCAL, REMOTE));
    }

    #[test]
    fn input_in_order_data_is_delivered_and_acked() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        assert!(deliver(&mut c, &mut host, segment(5001, Some(1001), b"hello")));

        assert_eq!(data_indications(&host), b"hello");
        assert_eq!(host.last_sent().ack(), 5006);
    }

    #[test]
    fn input_out_of_order_data_waits_for_gap() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        deliver(&mut c, &mut host, segment(5006, Some(1001), b"world"));

        assert!(data_indications(&host).is_empty());
        assert_eq!(host.last_sent().ack(), 5001);
        assert_eq!(c.tcb().stats.rcv_out_of_order_segments, 1);

        deliver(&mut c, &mut host, segment(5001, Some(1001), b"hello"));

        assert_eq!(data_indications(&host), b"helloworld");
        assert_eq!(host.last_sent().ack(), 5011);
    }

    #[test]
    fn input_fin_above_gap_waits_for_data() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        deliver(&mut c, &mut host, fin(5006, 1001, b"world"));
        assert_eq!(c.state(), ConnectionState::ESTABLISHED);

        deliver(&mut c, &mut host, segment(5001, Some(1001), b"hello"));

        assert_eq!(data_indications(&host), b"helloworld");
        assert_eq!(c.state(), ConnectionState::CLOSE_WAIT);
        assert_eq!(host.last_sent().ack(), 5012);
        assert_eq!(host.indications.last().unwrap().2, Indication::PeerClosed);
    }

    #[test]
    fn input_active_close_through_time_wait() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        assert!(c.process_command(&mut host, Command::Close).unwrap());
        assert_eq!(c.state(), ConnectionState::FIN_WAIT_1);
        assert!(host.last_sent().header.fin());
        assert_eq!(host.last_sent().seq(), 1001);

        deliver(&mut c, &mut host, segment(5001, Some(1002), &[]));
        assert_eq!(c.state(), ConnectionState::FIN_WAIT_2);
        assert!(host.timer(TimerKind::FinWait2).is_some());

        deliver(&mut c, &mut host, fin(5001, 1002, &[]));
        assert_eq!(c.state(), ConnectionState::TIME_WAIT);
        assert_eq!(host.last_sent().ack(), 5002);
        assert_eq!(
            host.timer(TimerKind::TwoMsl).map(|(_, d)| d),
            Some(host.now + Duration::from_secs(240))
        );

        let handle = host.expire(TimerKind::TwoMsl).unwrap();
        assert!(!c.process_timer(&mut host, TimerKind::TwoMsl, handle));
        assert_eq!(c.state(), ConnectionState::CLOSED);

        let closed = host
            .indications
            .iter()
            .filter(|(_, _, i)| *i == Indication::Closed)
            .count();
        assert_eq!(closed, 1);
    }

    #[test]
    fn input_passive_close_through_last_ack() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        deliver(&mut c, &mut host, fin(5001, 1001, &[]));
        assert_eq!(c.state(), ConnectionState::CLOSE_WAIT);
        assert_eq!(host.indications.last().unwrap().2, Indication::PeerClosed);
        assert_eq!(host.last_sent().ack(), 5002);

        c.process_command(&mut host, Command::Close).unwrap();
        assert_eq!(c.state(), ConnectionState::LAST_ACK);
        assert!(host.last_sent().header.fin());

        assert!(!deliver(&mut c, &mut host, segment(5002, Some(1002), &[])));
        assert_eq!(c.state(), ConnectionState::CLOSED);
        assert_eq!(host.indications.last().unwrap().2, Indication::Closed);
        assert!(host.timers.is_empty());
    }

    #[test]
    fn input_rst_resets_established_connection() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        assert!(!deliver(&mut c, &mut host, rst(5001)));
        assert_eq!(c.state(), ConnectionState::CLOSED);
        assert_eq!(host.indications.last().unwrap().2, Indication::ConnectionReset);
        assert!(!host.indications.iter().any(|(_, _, i)| *i == Indication::Closed));
    }

    #[test]
    fn input_rst_outside_window_is_ignored() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);
        let sent = host.sent.len();

        assert!(deliver(&mut c, &mut host, rst(90_000)));
        assert_eq!(c.state(), ConnectionState::ESTABLISHED);
        assert_eq!(host.sent.len(), sent);
        assert_eq!(c.tcb().stats.rcv_unacceptable_segments, 1);
    }

    #[test]
    fn input_syn_in_window_resets_connection() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        assert!(!deliver(&mut c, &mut host, syn(5001, None)));
        assert_eq!(c.state(), ConnectionState::CLOSED);

        let reset = host.last_sent();
        assert!(reset.header.rst());
        assert_eq!(reset.seq(), 1001);
        assert_eq!(host.indications.last().unwrap().2, Indication::ConnectionReset);
    }

    #[test]
    fn input_bad_ack_in_syn_sent_is_reset() {
        let mut host = RecordingHost::default();
        let mut c = open_active(&mut host);

        assert!(deliver(&mut c, &mut host, segment(5000, Some(5555), &[])));
        assert_eq!(c.state(), ConnectionState::SYN_SENT);

        let (reset, src, dst) = host.sent.last().unwrap();
        assert!(reset.header.rst());
        assert_eq!(reset.seq(), 5555);
        assert_eq!((*src, *dst), (LOCAL, REMOTE));
    }

    #[test]
    fn input_rst_ack_in_syn_sent_is_refusal() {
        let mut host = RecordingHost::default();
        let mut c = open_active(&mut host);

        let mut refusal = segment(0, Some(1001), &[]);
        refusal.header.set_rst();

        assert!(!deliver(&mut c, &mut host, refusal));
        assert_eq!(c.state(), ConnectionState::CLOSED);
        assert_eq!(host.indications.last().unwrap().2, Indication::ConnectionReset);
    }

    #[test]
    fn input_rst_in_passive_syn_rcvd_returns_to_listen() {
        let mut host = RecordingHost::default();
        let mut c = open_passive(&mut host);

        deliver(&mut c, &mut host, syn(5000, None));
        assert_eq!(c.state(), ConnectionState::SYN_RCVD);

        assert!(deliver(&mut c, &mut host, rst(5001)));
        assert_eq!(c.state(), ConnectionState::LISTEN);
        assert_eq!(c.socket().local, SocketAddr::new(LOCAL, 1000));
        assert!(c.socket().remote.is_unspecified());
        assert!(host.indications.is_empty());
        assert!(host.timers.is_empty());
    }

    #[test]
    fn input_window_update_is_not_a_duplicate_ack() {
        let mut host = RecordingHost::default();
        let mut c = established(&mut host);

        c.process_command(&mut host, Command::Send(vec![7; 100])).unwrap();
        assert_eq!(host.last_sent().payload_len(), 100);

        let mut update = segment(5001, Some(1001), &[]);
        update.header.set_window(9000);
        deliver(&mut c, &mut host, update.clone());
        assert_eq!(c.tcb().dupacks, 0);
        assert_eq!(c.tcb().snd.wnd, 9000);

        for _ in 0..3 {
            deliver(&mut c, &mut host, update.clone());
        }
        assert_eq!(c.tcb().dupacks, 3);

        // Reno fast retransmit.
        let copies = host
            .sent
            .iter()
            .filter(|(s, _, _)| s.seq() == 1001 && s.payload_len() == 100)
            .count();
        assert_eq!(copies, 2);
    }
}
