//! The per-router message dispatcher, timer scheduler and TCP listener.
//! `Router` is the single-inbox actor every router runs as: one `mpsc`
//! channel feeds one event loop that drains it message by message. All
//! mutable router state (FSM table, RIB, trust table, counters) is only
//! ever touched from inside that loop.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Buf, BytesMut};
use ipnet::Ipv4Net;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use bgp_packet::{
    BgpPacket, BgpParseError, KeepalivePacket, NotificationPacket, NotifyCode, NotifySubCode,
    OpenPacket, TrustRatePacket, UpdatePacket, VoteKind, VotingPacket,
};

use crate::config::Topology;
use crate::context::Timer;
use crate::fsm::{self, Effect, Event, State};
use crate::peer::PeerSession;
use crate::rib::Rib;
use crate::scheduler::{offsets, DelayScheduler};
use crate::trust::TrustTable;
use crate::{sim_debug, sim_error, sim_info, sim_warn, SimError};

/// A decoded (or decode-failed) frame, tagged with the sender AS read off
/// the simulator's own framing prefix: every message body is prefixed with
/// the sender's AS number ahead of the wire-format bytes.
pub enum Message {
    Accept(TcpStream),
    Inbound(u32, Result<BgpPacket, BgpParseError>),
    Event(u32, Event),
    PeriodicKeepalive(u32),
    PeriodicTrustRate(u32),
}

pub struct Router {
    pub as_number: u32,
    pub bgp_identifier: Ipv4Addr,
    bgp_listen_port: u16,
    peers: BTreeMap<u32, PeerSession>,
    rib: Rib,
    trust: TrustTable,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
    scheduler: DelayScheduler<Message>,
    serial: u64,
}

impl Router {
    pub fn new(topology: &Topology) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (bgp_port, _, _, _) = topology.ports();
        let peers = topology
            .peers
            .iter()
            .map(|&peer_as| {
                let addr = Ipv4Addr::new(10, 0, 0, peer_as as u8);
                let peer_port = 2000 + 4 * peer_as as u16;
                (peer_as, PeerSession::new(peer_as, addr, peer_port))
            })
            .collect();
        let mut rib = Rib::with_advertised(topology.advertised.clone());
        for prefix in &topology.advertised {
            rib.originate(topology.as_number, topology.bgp_identifier, *prefix);
        }
        Self {
            as_number: topology.as_number,
            bgp_identifier: topology.bgp_identifier,
            bgp_listen_port: bgp_port,
            peers,
            rib,
            trust: TrustTable::new(),
            scheduler: DelayScheduler::new(tx.clone()),
            tx,
            rx,
            serial: 0,
        }
    }

    pub fn sender(&self) -> UnboundedSender<Message> {
        self.tx.clone()
    }

    fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    /// Binds the BGP listen port and feeds accepted connections into the
    /// router's own inbox, polling a 0.5s accept timeout so the listen loop
    /// can observe a future shutdown signal.
    pub async fn listen(as_number: u32, port: u16, tx: UnboundedSender<Message>) {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                sim_error!(as_number, "failed to bind {addr}: {e}");
                return;
            }
        };
        sim_info!(as_number, "listening on {addr}");
        loop {
            match tokio::time::timeout(std::time::Duration::from_millis(500), listener.accept())
                .await
            {
                Ok(Ok((stream, _peer_addr))) => {
                    if tx.send(Message::Accept(stream)).is_err() {
                        break;
                    }
                }
                Ok(Err(e)) => sim_warn!(as_number, "accept failed: {e}"),
                Err(_timeout) => continue,
            }
        }
    }

    /// Runs the actor loop to completion (never, absent a shutdown signal —
    /// the simulation's `main` aborts router tasks on exit instead).
    pub async fn event_loop(mut self) {
        while self.process_one().await {}
    }

    /// Drains and handles exactly one message from the router's own inbox,
    /// returning `false` once the channel is closed. `event_loop` is just
    /// this in a bare loop; exposing it separately lets a test harness drive
    /// the dispatcher/FSM directly off hand-built [`Message`]s without
    /// spawning the loop task or touching a real socket.
    pub async fn process_one(&mut self) -> bool {
        match self.rx.recv().await {
            Some(msg) => {
                self.process_msg(msg).await;
                true
            }
            None => false,
        }
    }

    /// Current FSM state of a configured peer.
    pub fn peer_state(&self, peer_as: u32) -> Option<State> {
        self.peers.get(&peer_as).map(|p| p.state)
    }

    /// This router's RIB, for an out-of-scope routing-table pretty-printer
    /// and for tests.
    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    /// This router's trust table, for the out-of-scope collaborators and
    /// for tests.
    pub fn trust(&self) -> &TrustTable {
        &self.trust
    }

    /// Messages received from a configured peer so far.
    pub fn messages_exchanged(&self, peer_as: u32) -> u64 {
        self.peers.get(&peer_as).map(|p| p.messages_exchanged).unwrap_or(0)
    }

    async fn process_msg(&mut self, msg: Message) {
        self.next_serial();
        match msg {
            Message::Accept(stream) => self.spawn_reader(stream),
            Message::Inbound(peer_as, Ok(packet)) => self.dispatch(peer_as, packet).await,
            Message::Inbound(peer_as, Err(e)) => self.handle_decode_error(peer_as, e).await,
            Message::Event(peer_as, event) => self.apply_event(peer_as, event).await,
            Message::PeriodicKeepalive(peer_as) => {
                self.fire_periodic_keepalive(peer_as).await;
            }
            Message::PeriodicTrustRate(peer_as) => {
                self.fire_periodic_trustrate(peer_as).await;
            }
        }
    }

    fn spawn_reader(&self, mut stream: TcpStream) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut buf = BytesMut::with_capacity(bgp_packet::BGP_MAX_LEN + 4);
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(_) => return,
                }
            }
            if buf.len() < 4 {
                return;
            }
            let peer_as = buf.get_u32();
            let result = BgpPacket::parse_packet(&buf).map(|(_, packet)| packet);
            let _ = tx.send(Message::Inbound(peer_as, result));
        });
    }

    /// Opens a fresh connection, writes the sender-AS-prefixed frame, and
    /// closes: one short-lived TCP connection per outbound message.
    async fn send_packet(&self, peer_as: u32, body: BytesMut) {
        let Some(peer) = self.peers.get(&peer_as) else {
            sim_warn!(self.as_number, "{}", SimError::UnknownPeer(peer_as));
            return;
        };
        let addr = SocketAddr::V4(SocketAddrV4::new(peer.addr, peer.bgp_port));
        let own_as = self.as_number;
        tokio::spawn(async move {
            let mut frame = BytesMut::with_capacity(body.len() + 4);
            frame.extend_from_slice(&(own_as as u32).to_be_bytes());
            frame.extend_from_slice(&body);
            match TcpStream::connect(addr).await {
                Ok(mut stream) => {
                    if let Err(e) = stream.write_all(&frame).await {
                        sim_warn!(own_as, "send to {addr} failed: {e}");
                    }
                }
                Err(e) => sim_debug!(own_as, "connect to {addr} failed: {e}"),
            }
        });
    }

    async fn send_open(&self, peer_as: u32) {
        let open = OpenPacket::new(self.as_number as u16, 90, self.bgp_identifier);
        self.send_packet(peer_as, open.into()).await;
    }

    async fn send_keepalive(&self, peer_as: u32) {
        self.send_packet(peer_as, KeepalivePacket::new().into()).await;
    }

    async fn send_notification(&self, peer_as: u32, code: NotifyCode, sub_code: NotifySubCode) {
        self.send_packet(peer_as, NotificationPacket::new(code, sub_code).into())
            .await;
    }

    /// Applies one FSM event to a configured peer, executing every effect
    /// the transition table demands, then layers on the periodic sends
    /// that kick off on entry to OpenConfirm/Established.
    async fn apply_event(&mut self, peer_as: u32, event: Event) {
        let Some(from) = self.peers.get(&peer_as).map(|p| p.state) else {
            sim_warn!(self.as_number, "{}", SimError::UnknownPeer(peer_as));
            return;
        };
        let transition = fsm::transition(from, event);
        let to = transition.to;
        sim_debug!(
            self.as_number,
            "peer AS{peer_as}: {} --{:?}--> {}",
            from.as_str(),
            event,
            to.as_str()
        );

        for effect in &transition.effects {
            match effect {
                Effect::ResetRetryCounter => {
                    if let Some(p) = self.peers.get_mut(&peer_as) {
                        p.connect_retry_counter = 0;
                    }
                }
                Effect::IncrementRetryCounter => {
                    if let Some(p) = self.peers.get_mut(&peer_as) {
                        p.connect_retry_counter += 1;
                    }
                }
                Effect::StartRetryTimer => self.start_retry_timer(peer_as),
                Effect::ClearRetryTimer => {
                    if let Some(p) = self.peers.get_mut(&peer_as) {
                        p.retry_timer = None;
                    }
                }
                Effect::StartHoldTimer(secs) => self.start_hold_timer(peer_as, *secs),
                Effect::ClearHoldTimer => {
                    if let Some(p) = self.peers.get_mut(&peer_as) {
                        p.hold_timer = None;
                    }
                }
                Effect::StartKeepaliveTimer(secs) => self.start_keepalive_timer(peer_as, *secs),
                Effect::ClearKeepaliveTimer => {
                    if let Some(p) = self.peers.get_mut(&peer_as) {
                        p.keepalive_timer = None;
                    }
                }
                Effect::SendOpen => self.send_open(peer_as).await,
                Effect::SendKeepalive => self.send_keepalive(peer_as).await,
                Effect::SendNotificationFsmError => {
                    self.send_notification(peer_as, NotifyCode::FsmError, NotifySubCode::UnexpectedMessage)
                        .await;
                }
                Effect::SendNotificationForError => {
                    // The triggering protocol error's own (code, subcode) is
                    // sent by `handle_decode_error` directly; by the time a
                    // BGPHeaderErr/BGPOpenMsgErr event reaches here the
                    // NOTIFICATION has already gone out.
                }
                Effect::DropConnection => {}
            }
        }

        if let Some(p) = self.peers.get_mut(&peer_as) {
            p.state = to;
            if to == State::Idle {
                p.clear_timers();
                self.rib.withdraw_peer(peer_as);
            }
        }

        if to == State::OpenConfirm {
            self.scheduler
                .schedule(offsets::OPENCONFIRM_KEEPALIVE_MS, Message::PeriodicKeepalive(peer_as));
        }
        if to == State::Established && from != State::Established {
            sim_info!(self.as_number, "peer AS{peer_as} Established");
            self.trust.seed(peer_as);
            self.scheduler
                .schedule(offsets::ESTABLISHED_KEEPALIVE_MS, Message::PeriodicKeepalive(peer_as));
            self.scheduler
                .schedule(offsets::TRUSTRATE_CADENCE_MS, Message::PeriodicTrustRate(peer_as));
        }
    }

    fn start_retry_timer(&mut self, peer_as: u32) {
        let tx = self.tx.clone();
        let timer = Timer::once(fsm::CONNECT_RETRY_TIME, move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(Message::Event(peer_as, Event::ConnectRetryTimerExpires));
            }
        });
        if let Some(p) = self.peers.get_mut(&peer_as) {
            p.retry_timer = Some(timer);
        }
    }

    fn start_hold_timer(&mut self, peer_as: u32, secs: u64) {
        let tx = self.tx.clone();
        let timer = Timer::once(secs, move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(Message::Event(peer_as, Event::HoldTimerExpires));
            }
        });
        if let Some(p) = self.peers.get_mut(&peer_as) {
            p.hold_timer = Some(timer);
        }
    }

    fn start_keepalive_timer(&mut self, peer_as: u32, secs: u64) {
        let tx = self.tx.clone();
        let timer = Timer::repeat(secs, move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(Message::Event(peer_as, Event::KeepaliveTimerExpires));
            }
        });
        if let Some(p) = self.peers.get_mut(&peer_as) {
            p.keepalive_timer = Some(timer);
        }
    }

    /// Directly forces a peer to Idle without going through the FSM's own
    /// catchall (which would send a second NOTIFICATION back at the sender
    /// of the one we just received).
    fn force_idle(&mut self, peer_as: u32) {
        if let Some(p) = self.peers.get_mut(&peer_as) {
            p.state = State::Idle;
            p.connect_retry_counter += 1;
            p.clear_timers();
        }
        self.rib.withdraw_peer(peer_as);
    }

    async fn handle_decode_error(&mut self, peer_as: u32, err: BgpParseError) {
        if err.is_incomplete() {
            return;
        }
        let sim_err = SimError::from(err.clone());
        sim_warn!(self.as_number, "decode error from AS{peer_as}: {sim_err}");
        if sim_err.is_protocol_error() && self.peers.contains_key(&peer_as) {
            let (code, sub_code) = err.notify_code();
            self.send_notification(peer_as, code, sub_code).await;
            self.force_idle(peer_as);
        }
    }

    /// The per-state dispatcher table, keyed on (current state, message).
    async fn dispatch(&mut self, peer_as: u32, packet: BgpPacket) {
        let Some(mut state) = self.peers.get(&peer_as).map(|p| p.state) else {
            sim_warn!(self.as_number, "{}", SimError::UnknownPeer(peer_as));
            return;
        };

        if let Some(p) = self.peers.get_mut(&peer_as) {
            p.messages_exchanged += 1;
        }

        // Idle + any inbound message is this simulator's "peer-hello"
        // sentinel: a fresh TCP connection from a configured-but-unseen
        // peer implicitly starts the session.
        if state == State::Idle {
            self.apply_event(peer_as, Event::ManualStart).await;
            self.apply_event(peer_as, Event::TcpConnectionConfirmed).await;
            state = self.peers.get(&peer_as).map(|p| p.state).unwrap_or(state);
        }

        match (&state, &packet) {
            (State::Active, BgpPacket::Open(open)) => {
                if let Err(e) = open.verify() {
                    self.handle_decode_error(peer_as, e).await;
                    return;
                }
                self.send_open(peer_as).await;
                self.apply_event(peer_as, Event::TcpConnectionConfirmed).await;
            }
            (State::OpenSent, BgpPacket::Open(open)) => {
                if let Err(e) = open.verify() {
                    self.apply_event(peer_as, Event::BgpOpenMsgErr).await;
                    let (code, sub) = e.notify_code();
                    self.send_notification(peer_as, code, sub).await;
                    return;
                }
                self.apply_event(peer_as, Event::BgpOpen).await;
            }
            (State::OpenConfirm, BgpPacket::Keepalive(_)) => {
                self.apply_event(peer_as, Event::KeepAliveMsg).await;
            }
            (State::Established, BgpPacket::Keepalive(_)) => {
                if let Some(p) = self.peers.get_mut(&peer_as) {
                    if let Some(timer) = &p.hold_timer {
                        timer.refresh();
                    }
                }
            }
            (State::Established, BgpPacket::Update(update)) => {
                self.handle_update(peer_as, update).await;
            }
            (_, BgpPacket::Notification(_)) => {
                if let Some(entry) = self.trust.get_mut(peer_as) {
                    entry.on_notification();
                }
                sim_info!(self.as_number, "NOTIFICATION from AS{peer_as}, trust lowered");
                self.force_idle(peer_as);
            }
            (_, BgpPacket::Voting(voting)) => {
                self.handle_voting(peer_as, voting).await;
            }
            (_, BgpPacket::TrustRate(trustrate)) => {
                self.handle_trustrate(peer_as, trustrate).await;
            }
            _ => {
                sim_debug!(
                    self.as_number,
                    "{}",
                    SimError::UnexpectedMessage { peer: peer_as, state: state.as_str() }
                );
                self.apply_event(peer_as, Event::Other).await;
            }
        }
    }

    async fn handle_update(&mut self, peer_as: u32, update: &UpdatePacket) {
        if !update.withdrawn.is_empty() {
            self.rib.withdraw(peer_as, &update.withdrawn);
        }
        if update.nlri.is_empty() {
            return;
        }
        let ingested = self
            .rib
            .ingest(self.as_number, peer_as, &update.attrs, &update.nlri, &self.trust);
        if ingested.new_rows.is_empty() {
            return;
        }
        let peers: Vec<u32> = self.peers.keys().copied().filter(|&p| p != peer_as).collect();
        for row in &ingested.new_rows {
            let attrs = row.propagate(self.as_number, self.bgp_identifier, row.trust_rate);
            let nlri: Vec<Ipv4Net> = vec![row.network];
            for &other in &peers {
                let pkt = UpdatePacket::new(attrs.clone(), nlri.clone());
                self.scheduler
                    .schedule_with(offsets::LINK_DELAY_MS, move || async move {
                        Message::Inbound(other, Ok(BgpPacket::Update(Box::new(pkt))))
                    });
            }
        }
    }

    /// Re-fires every `OPENCONFIRM_KEEPALIVE_MS`/`ESTABLISHED_KEEPALIVE_MS`
    /// while the peer remains in the state that started the cadence,
    /// distinct from (and faster than) the FSM's own keepalive_timer
    /// effect. Stops once the peer has moved on, so a dropped session
    /// doesn't keep rescheduling itself forever.
    async fn fire_periodic_keepalive(&mut self, peer_as: u32) {
        match self.peers.get(&peer_as).map(|p| p.state) {
            Some(State::OpenConfirm) => {
                self.send_keepalive(peer_as).await;
                self.scheduler
                    .schedule(offsets::OPENCONFIRM_KEEPALIVE_MS, Message::PeriodicKeepalive(peer_as));
            }
            Some(State::Established) => {
                self.send_keepalive(peer_as).await;
                self.scheduler
                    .schedule(offsets::ESTABLISHED_KEEPALIVE_MS, Message::PeriodicKeepalive(peer_as));
            }
            _ => {}
        }
    }

    /// Re-fires every `TRUSTRATE_CADENCE_MS` while the peer stays
    /// Established.
    async fn fire_periodic_trustrate(&mut self, peer_as: u32) {
        if self.peers.get(&peer_as).map(|p| p.state) != Some(State::Established) {
            return;
        }
        let trust = self.trust.t_eff(peer_as);
        self.send_packet(peer_as, TrustRatePacket::new(self.as_number as u16, trust).into())
            .await;
        self.scheduler
            .schedule(offsets::TRUSTRATE_CADENCE_MS, Message::PeriodicTrustRate(peer_as));
    }

    async fn handle_trustrate(&mut self, peer_as: u32, trustrate: &TrustRatePacket) {
        let _ = trustrate;
        self.trust.seed(peer_as);
        if let Some(entry) = self.trust.get_mut(peer_as) {
            if entry.on_trustrate() {
                sim_info!(self.as_number, "AS{peer_as} trust bumped by TRUSTRATE cadence");
            }
        }
    }

    /// Two-hop voting: queries are relayed to every second-hop neighbour;
    /// answers are relayed back to the originator.
    async fn handle_voting(&mut self, peer_as: u32, voting: &VotingPacket) {
        if let Err(e) = voting.verify() {
            self.handle_decode_error(peer_as, e).await;
            return;
        }
        match (voting.ttl, voting.kind) {
            (2, VoteKind::Query) => {
                let second_hops: Vec<u32> = self
                    .peers
                    .keys()
                    .copied()
                    .filter(|&p| p != voting.origin_as as u32)
                    .collect();
                if second_hops.is_empty() {
                    let vote = self.trust.t_inherent(voting.origin_as as u32);
                    let answer = voting.answer(vote);
                    self.send_packet(voting.origin_as as u32, answer.into()).await;
                } else {
                    let relay = voting.relay(second_hops.len() as u16);
                    for q in second_hops {
                        self.send_packet(q, relay.clone().into()).await;
                    }
                }
            }
            (1, VoteKind::Query) => {
                let vote = self.trust.t_inherent(peer_as);
                let answer = voting.answer(vote);
                self.send_packet(peer_as, answer.into()).await;
            }
            (0, VoteKind::Answer) => {
                if voting.origin_as as u32 == self.as_number {
                    if let Some(entry) = self.trust.get_mut(voting.peer_in_question as u32) {
                        entry.set_expected(voting.num_of_2nd_neighbours);
                        entry.record_vote(voting.vote());
                    }
                } else {
                    // In transit back through the relay: forward to origin.
                    self.send_packet(voting.origin_as as u32, voting.clone().into()).await;
                }
            }
            _ => {}
        }
    }

    /// Kicks off a voting query for `target`, harvesting second-hop
    /// opinions through every other configured peer. The expected vote
    /// count is not knowable here — it's `target`'s own second-hop count,
    /// reported back in the answer's `num_of_2nd_neighbours` — so this only
    /// resets the entry for a fresh round rather than guessing it.
    pub async fn start_voting(&mut self, target: u32) {
        self.trust.seed(target);
        if let Some(entry) = self.trust.get_mut(target) {
            entry.votes.clear();
            entry.vote_complete = false;
            entry.expected_votes = None;
        }
        let query = VotingPacket::query(self.as_number as u16, target as u16);
        self.send_packet(target, query.into()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn solo_topology() -> Topology {
        Topology {
            as_number: 1,
            bgp_identifier: Ipv4Addr::new(10, 0, 0, 1),
            base_port: 2004,
            peers: BTreeSet::from([2]),
            advertised: vec!["100.1.1.0/24".parse().unwrap()],
        }
    }

    #[test]
    fn new_router_originates_its_advertised_prefix() {
        let topo = solo_topology();
        let router = Router::new(&topo);
        assert_eq!(router.rib.rows().len(), 1);
        assert_eq!(router.peers.len(), 1);
    }
}
