//! The protocol engine: the heart of the lockstep core. Ties the ring, outbound
//! queue, determinism guard, and chat/selection sidecars to a concrete
//! [`DatagramEndpoint`], driven once per simulation cycle by [`Engine::tick`] and
//! once per readable event by [`Engine::on_receive`].

use crate::chat::ChatReassembler;
use crate::command::{CommandRecord, Kind, Payload, StatusFlag};
use crate::config::EngineConfig;
use crate::determinism::DeterminismGuard;
use crate::error::Error;
use crate::outbound::OutboundQueue;
use crate::peer::{PeerId, Roster};
use crate::ring::ScheduledRing;
use crate::selection::SelectionState;
use crate::sim::SimulationSink;
use crate::socket::DatagramEndpoint;
use crate::wire::{self, Packet, SelectionMode};
use hashbrown::HashSet;
use support::logging::{debug, error, info, trace, warn, Logger};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    Active,
    Exiting,
    Closed,
}

/// Observable happenings the surrounding game loop drains each tick.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    OutOfSync(u32),
    InSyncRestored,
    DesyncDetected(u32),
    PeerQuit(PeerId),
    PeerTimedOut(PeerId),
    InvalidCommand { peer: PeerId },
    BadPacket,
    UnknownPeer,
    PoolExhausted,
    Chat { peer: PeerId, message: String },
    SelectionChanged(PeerId),
}

pub struct Engine<E: DatagramEndpoint> {
    config: EngineConfig,
    roster: Roster,
    ring: ScheduledRing,
    outbound: OutboundQueue,
    determinism: DeterminismGuard,
    chat: ChatReassembler,
    selection: SelectionState,
    socket: E,
    log: Logger,

    state: State,
    in_sync: bool,
    current_cycle: u32,
    resend_deadline: Option<u64>,
    timed_out: HashSet<PeerId>,
    sent_packets: Vec<Option<(u32, Vec<u8>)>>,
    pending_selection: Option<(SelectionMode, Vec<u16>)>,
    events: Vec<EngineEvent>,
}

impl<E: DatagramEndpoint> Engine<E> {
    /// Constructs the engine over an already-bound endpoint and an already-resolved
    /// roster (phases one and two of initialization, both external). Primes the ring
    /// across `[0, L]` so the first `L/U + 1` steps are ready without network input.
    /// Priming marks each slot *received* (via [`ScheduledRing::prime`]) rather than
    /// writing a placeholder command: cycle `L` is exactly the target of the engine's
    /// own first composed packet, so a written placeholder there would sit alongside
    /// the real record instead of being replaced by it.
    pub fn new(config: EngineConfig, roster: Roster, socket: E, log: Logger) -> Engine<E> {
        let max_peers = config.max_peers().max(roster.len());
        let mut ring = ScheduledRing::new(max_peers);
        let determinism = DeterminismGuard::new();

        let lag = config.lag();
        let active_ids: Vec<PeerId> = roster.active().map(|p| p.id).collect();
        for cycle in 0..=lag {
            ring.prime(cycle, active_ids.iter().copied());
        }

        info!(log, "engine primed"; "lag" => lag, "peers" => active_ids.len());

        Engine {
            config,
            roster,
            ring,
            outbound: OutboundQueue::default(),
            determinism,
            chat: ChatReassembler::new(),
            selection: SelectionState::new(),
            socket,
            log,
            state: State::Active,
            in_sync: true,
            current_cycle: 0,
            resend_deadline: None,
            timed_out: HashSet::new(),
            sent_packets: vec![None; 256],
            pending_selection: None,
            events: Vec::new(),
        }
    }

    #[inline]
    pub fn in_sync(&self) -> bool {
        self.in_sync
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Drains every event observed since the last call.
    pub fn events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.drain(..)
    }

    pub fn submit_command(&mut self, kind: u8, unit_slot: u16, x: u16, y: u16, dest_or_type: u16, flush: bool) {
        let status = if flush { StatusFlag::Flush } else { StatusFlag::Append };
        let payload = Payload::Gameplay { unit_slot, x, y, dest_or_type };
        let dropped = self
            .outbound
            .push_gameplay(CommandRecord::new(Kind::Gameplay(kind), status, payload, 0));
        if dropped {
            self.report_pool_exhausted();
        }
    }

    pub fn submit_extended(&mut self, subkind: u8, arg1: u8, arg2: u16, arg3: u16, arg4: u16, flush: bool) {
        let status = if flush { StatusFlag::Flush } else { StatusFlag::Append };
        let payload = Payload::Extended { subkind, arg1, arg2, arg3, arg4 };
        let dropped = self
            .outbound
            .push_gameplay(CommandRecord::new(Kind::Extended, status, payload, 0));
        if dropped {
            self.report_pool_exhausted();
        }
    }

    fn report_pool_exhausted(&mut self) {
        warn!(self.log, "outbound queue full; oldest submission dropped");
        self.events.push(EngineEvent::PoolExhausted);
    }

    /// Splits `text` into 7-byte `CHAT` fragments, terminated by one `CHAT_TERMINAL`
    /// fragment, queued on the side lane alongside selection traffic.
    pub fn submit_chat(&mut self, text: &str) {
        let local = self.roster.local();
        let bytes = text.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(7).collect();
        let chunks: Vec<&[u8]> = if chunks.is_empty() { vec![&[]] } else { chunks };

        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut fixed = [0u8; 7];
            fixed[..chunk.len()].copy_from_slice(chunk);
            let kind = if i == last { Kind::ChatTerminal } else { Kind::Chat };
            let payload = Payload::Chat { sender: local, chunk: fixed };
            let dropped = self
                .outbound
                .push_side(CommandRecord::new(kind, StatusFlag::Append, payload, 0));
            if dropped {
                self.report_pool_exhausted();
            }
        }
    }

    /// Queues a selection update for immediate (next-tick) broadcast. Selection
    /// bypasses the scheduled ring entirely, per the protocol's sidecar framing.
    pub fn submit_selection(&mut self, mode: SelectionMode, units: &[u16]) {
        self.pending_selection = Some((mode, units.to_vec()));
    }

    /// Schedules a local QUIT at the next `U`-aligned cycle (offset by `L`, like any
    /// other command) and sends it immediately rather than waiting for the next
    /// scheduled emission.
    pub fn quit(&mut self) {
        let u = self.config.updates();
        let rounded = (self.current_cycle / u + 1) * u;
        let target = rounded + self.config.lag();
        let local = self.roster.local();

        let record = CommandRecord::quit(local, target);
        let _ = self.ring.write(local, record);
        self.state = State::Exiting;

        info!(self.log, "local quit scheduled"; "target_cycle" => target);

        let packet = Packet::Commands {
            cycle_low: (target & 0xFF) as u8,
            commands: vec![(Kind::Quit, StatusFlag::Append, Payload::Quit { peer: local })],
        };
        let bytes = packet.encode();
        self.broadcast(&bytes);
    }

    /// The once-per-simulation-cycle driver. Dispatch and the readiness check only
    /// run on `U`-boundary cycles: every composed target is itself a multiple of `U`,
    /// so a non-boundary readiness check would query a ring slot nothing ever
    /// legitimately writes. Timeouts are checked every cycle regardless.
    pub fn tick<S: SimulationSink>(&mut self, cycle: u32, sim: &mut S) {
        self.current_cycle = cycle;
        let u = self.config.updates();

        if cycle % u == 0 {
            self.compose_and_broadcast(cycle, sim);
            self.flush_pending_selection();
            self.execute_cycle(cycle, sim);
            self.check_readiness(cycle, u, sim);
        }

        self.check_timeouts(cycle, sim);

        if self.state == State::Exiting && self.roster.all_remote_quit() {
            self.state = State::Closed;
        }
    }

    /// Drains every pending datagram, processing each in turn. Non-blocking: stops
    /// as soon as the endpoint reports nothing further is available. The receive
    /// buffer is stack-allocated per call, sized to the largest packet the codec
    /// ever produces.
    pub fn on_receive<S: SimulationSink>(&mut self, sim: &mut S) {
        loop {
            let mut buf = [0u8; wire::MAX_PACKET_SIZE];
            match self.socket.recv_from(&mut buf) {
                Ok(Some((n, from))) => {
                    let datagram = buf[..n].to_vec();
                    self.handle_datagram(&datagram, from, sim);
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(self.log, "datagram receive failed"; "error" => ?err);
                    break;
                }
            }
        }
    }

    fn compose_and_broadcast<S: SimulationSink>(&mut self, cycle: u32, sim: &mut S) {
        let target = cycle.wrapping_add(self.config.lag());
        let drained = self.outbound.drain(wire::MAX_COMMANDS);

        let commands: Vec<(Kind, StatusFlag, Payload)> = if drained.is_empty() {
            let sync = CommandRecord::sync(sim.current_hash(), sim.current_seed(), target);
            vec![(sync.kind, sync.status, sync.payload)]
        } else {
            drained.into_iter().map(|r| (r.kind, r.status, r.payload)).collect()
        };

        let local = self.roster.local();
        for (kind, status, payload) in &commands {
            let record = CommandRecord::new(*kind, *status, payload.clone(), target);
            let _ = self.ring.write(local, record);
        }

        self.determinism.record_local(target, sim.current_hash(), sim.current_seed());

        let packet = Packet::Commands {
            cycle_low: (target & 0xFF) as u8,
            commands,
        };
        let bytes = packet.encode();
        self.sent_packets[(target & 0xFF) as usize] = Some((target, bytes.clone()));
        trace!(self.log, "packet composed"; "target_cycle" => target, "bytes" => bytes.len());
        self.broadcast(&bytes);
    }

    fn flush_pending_selection(&mut self) {
        if let Some((mode, units)) = self.pending_selection.take() {
            let local = self.roster.local();
            let packet = Packet::selection(local, mode, &units);
            let bytes = packet.encode();
            self.broadcast(&bytes);
        }
    }

    fn execute_cycle<S: SimulationSink>(&mut self, cycle: u32, sim: &mut S) {
        let peers: Vec<PeerId> = self.roster.active().map(|p| p.id).collect();

        for peer in peers {
            let records = self.ring.take(cycle, peer);
            for record in records {
                match record.kind {
                    Kind::Sync => {
                        if let Payload::Sync { hash_low, seed_high, seed_low } = record.payload {
                            let seed = ((seed_high as u32) << 16) | seed_low as u32;
                            if let Err(Error::DesyncDetected(c)) =
                                self.determinism.check_remote(cycle, hash_low as u32, seed)
                            {
                                warn!(self.log, "desync detected"; "cycle" => c, "peer" => peer);
                                self.events.push(EngineEvent::DesyncDetected(c));
                            }
                        }
                    }
                    Kind::Chat | Kind::ChatTerminal => {
                        if let Some((sender, message)) = self.chat.feed(record.kind, &record.payload) {
                            self.events.push(EngineEvent::Chat { peer: sender, message });
                        }
                    }
                    Kind::Quit => {
                        if let Payload::Quit { peer: quitting } = record.payload {
                            info!(self.log, "peer quit"; "peer" => quitting);
                            self.roster.mark_quit(quitting);
                            self.ring.remove_peer(quitting);
                            self.chat.drop_pending(quitting);
                            self.selection.remove_peer(quitting);
                            self.events.push(EngineEvent::PeerQuit(quitting));
                        }
                    }
                    Kind::None | Kind::QuitAck | Kind::Resend | Kind::Selection => {}
                    Kind::Extended | Kind::Gameplay(_) => {
                        sim.execute_command(peer, &record.payload, record.status);
                    }
                }
            }
        }
    }

    fn check_readiness<S: SimulationSink>(&mut self, cycle: u32, u: u32, sim: &mut S) {
        let next_needed = cycle.wrapping_add(u);
        let ready = self.is_ready(next_needed);

        if !ready {
            if self.in_sync {
                self.in_sync = false;
                debug!(self.log, "out of sync"; "cycle" => next_needed);
                self.events.push(EngineEvent::OutOfSync(next_needed));
            }
            match self.resend_deadline {
                None => self.resend_deadline = Some(sim.frame_counter() + u as u64),
                Some(deadline) if sim.frame_counter() >= deadline => {
                    self.send_resend(cycle, u);
                    self.resend_deadline = Some(sim.frame_counter() + u as u64);
                }
                Some(_) => {}
            }
        } else if !self.in_sync {
            self.in_sync = true;
            self.resend_deadline = None;
            info!(self.log, "in sync restored"; "cycle" => cycle);
            self.events.push(EngineEvent::InSyncRestored);
        }
    }

    fn is_ready(&self, cycle: u32) -> bool {
        self.ring.is_ready(cycle, self.roster.active().map(|p| p.id))
    }

    fn send_resend(&mut self, cycle: u32, u: u32) {
        let requested_low = (((cycle / u) + 1) * u & 0xFF) as u8;
        debug!(self.log, "resend requested"; "cycle_low" => requested_low);
        let bytes = Packet::resend(requested_low).encode();
        self.broadcast(&bytes);
    }

    fn check_timeouts<S: SimulationSink>(&mut self, cycle: u32, sim: &mut S) {
        let timeout_frames = self.config.timeout_seconds() as u64 * sim.frames_per_second().max(1) as u64;
        let now = sim.frame_counter();
        let u = self.config.updates();
        let local = self.roster.local();

        let stale: Vec<PeerId> = self
            .roster
            .remote_active()
            .filter(|p| now.saturating_sub(p.last_seen_frame) >= timeout_frames)
            .map(|p| p.id)
            .filter(|id| !self.timed_out.contains(id))
            .collect();

        for peer in stale {
            self.timed_out.insert(peer);
            let target = cycle.wrapping_add(u);
            let _ = self.ring.write(peer, CommandRecord::quit(peer, target));

            error!(self.log, "peer timed out"; "peer" => peer, "target_cycle" => target);
            self.events.push(EngineEvent::PeerTimedOut(peer));

            let packet = Packet::Commands {
                cycle_low: (target & 0xFF) as u8,
                commands: vec![(Kind::Quit, StatusFlag::Append, Payload::Quit { peer })],
            };
            let bytes = packet.encode();
            self.broadcast_except(&bytes, local);
        }
    }

    fn handle_datagram<S: SimulationSink>(&mut self, bytes: &[u8], from: std::net::SocketAddr, sim: &mut S) {
        let sender = match self.roster.by_address(&from) {
            Some(id) => id,
            None => {
                self.events.push(EngineEvent::UnknownPeer);
                return;
            }
        };

        if self.roster.get(sender).map(|p| p.quit).unwrap_or(true) {
            return;
        }

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(_) => {
                warn!(self.log, "bad packet"; "peer" => sender);
                self.events.push(EngineEvent::BadPacket);
                return;
            }
        };

        match packet {
            Packet::Selection { mode, units, .. } => {
                // The wire-carried sender byte is not trusted; the roster-resolved
                // address owns the identity. Selection sharing is team-restricted
                // (§4.G): a non-teammate's update is received but not applied.
                let local = self.roster.local();
                if self.roster.are_teammates(local, sender) {
                    self.selection.apply(sender, mode, &units);
                    self.events.push(EngineEvent::SelectionChanged(sender));
                }
            }
            Packet::Resend { cycle_low } => self.handle_resend(cycle_low),
            Packet::Commands { cycle_low, commands } => self.handle_commands(sender, cycle_low, commands, sim),
        }

        if let Some(peer) = self.roster.get_mut(sender) {
            peer.last_seen_frame = sim.frame_counter();
        }
        self.timed_out.remove(&sender);
    }

    fn handle_resend(&mut self, cycle_low: u8) {
        let decoded = wire::decode_cycle(self.current_cycle, cycle_low);
        if let Some((stored_cycle, bytes)) = self.sent_packets[cycle_low as usize].clone() {
            if stored_cycle == decoded {
                debug!(self.log, "resend fulfilled"; "cycle" => stored_cycle);
                self.broadcast(&bytes);
            }
        }
    }

    fn handle_commands<S: SimulationSink>(
        &mut self,
        sender: PeerId,
        cycle_low: u8,
        commands: Vec<(Kind, StatusFlag, Payload)>,
        sim: &mut S,
    ) {
        let target = wire::decode_cycle(self.current_cycle, cycle_low);

        for (kind, status, payload) in commands {
            if let (Kind::Gameplay(_), Payload::Gameplay { unit_slot, .. }) = (kind, &payload) {
                let owned_by_sender_or_teammate = match sim.unit_owner(*unit_slot) {
                    Some(owner) => owner == sender || self.roster.are_teammates(owner, sender),
                    None => false,
                };
                if !owned_by_sender_or_teammate {
                    warn!(self.log, "invalid command"; "peer" => sender, "unit_slot" => *unit_slot);
                    self.events.push(EngineEvent::InvalidCommand { peer: sender });
                    continue;
                }
            }

            let record = CommandRecord::new(kind, status, payload, target);
            if self.ring.write(sender, record).is_err() {
                self.events.push(EngineEvent::PoolExhausted);
            }
        }

        if !self.in_sync {
            let next_needed = self.current_cycle.wrapping_add(self.config.updates());
            if self.is_ready(next_needed) {
                self.in_sync = true;
                self.resend_deadline = None;
                self.events.push(EngineEvent::InSyncRestored);
            }
        }
    }

    fn broadcast(&mut self, bytes: &[u8]) {
        let targets: Vec<std::net::SocketAddr> = self.roster.remote_active().map(|p| p.address).collect();
        for addr in targets {
            let _ = self.socket.send_to(bytes, addr);
        }
    }

    fn broadcast_except(&mut self, bytes: &[u8], exclude: PeerId) {
        let targets: Vec<std::net::SocketAddr> = self
            .roster
            .remote_active()
            .filter(|p| p.id != exclude)
            .map(|p| p.address)
            .collect();
        for addr in targets {
            let _ = self.socket.send_to(bytes, addr);
        }
    }
}
