//! Host Session Manager
//!
//! Owns the client table, answers the three-step join handshake, turns client
//! intents into world calls and, every `broadcast_period` ticks, sends position
//! ticks plus the coalesced health and stat changes to every playing client.
//!
//! Connection lifecycle per peer:
//!
//! ```text
//! ConnectionRequested --approve--> Connected --BlockSpriteInfoReq--> Playing
//!         |                            |                               |
//!       reject                    Disconnected <-----------------------+
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use super::transport::{DisconnectReason, HostTransport, ShutdownFlush, TransportEvent};
use super::{PeerId, SessionError};
use crate::config::HostConfig;
use crate::game::entity::{Cell, EntityIndex, GameMode, Health, ItemKind, Position, Team};
use crate::game::index::IndexAllocator;
use crate::game::stats::{NetStats, PeerStats};
use crate::game::world::{MapControl, MatchEvents, TankControl, TankSpawn, World, WorldEvent};
use crate::protocol::{
    decode, encode, BlockHealth, BlockHealthGroup, Message, StatEntry, TankHealth, TankSpawnEntry,
};
use crate::util::rate_limit::PeerRateLimiter;

pub const REJECT_ALREADY_CONNECTED: &str = "Already connected";
pub const REJECT_SERVER_FULL: &str = "Maximum number of players reached";

/// Most entries one HealthAnn or StatAnn list carries; counts travel in a byte
const MAX_LIST_ENTRIES: usize = u8::MAX as usize;

/// One row of the client table
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub client_index: u8,
    /// Tank announced for this peer, once one exists
    pub tank: Option<EntityIndex>,
    pub team: Team,
    /// Finished the handshake and receives broadcasts
    pub is_playing: bool,
    limiter: PeerRateLimiter,
}

impl ClientRecord {
    fn new(client_index: u8, team: Team) -> Self {
        Self {
            client_index,
            tank: None,
            team,
            is_playing: false,
            limiter: PeerRateLimiter::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub peer: PeerId,
    pub client_index: u8,
    pub team: Team,
    pub tank: Option<EntityIndex>,
    pub playing: bool,
    pub kills: Option<i16>,
    pub deaths: Option<i16>,
}

/// Snapshot of a running host, published for the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostStatus {
    pub running: bool,
    pub mode: Option<GameMode>,
    pub map: String,
    pub tick: u64,
    pub tanks: usize,
    pub team_score: [i16; 2],
    pub clients: Vec<ClientStatus>,
}

pub struct HostSession<T, W, S = NetStats> {
    config: HostConfig,
    transport: T,
    world: W,
    stats: S,
    client_ids: IndexAllocator,
    clients: BTreeMap<PeerId, ClientRecord>,
    /// Approved but not connected yet; counts toward capacity
    pending: BTreeSet<PeerId>,
    countdown: u32,
    tick: u64,

    // Coalesced until the next broadcast
    tank_health: BTreeMap<EntityIndex, u8>,
    block_health: BTreeMap<Cell, i16>,
    killers: Vec<PeerId>,
    victims: Vec<PeerId>,
}

impl<T, W, S> HostSession<T, W, S>
where
    T: HostTransport,
    W: World,
    S: PeerStats,
{
    pub fn new(config: HostConfig, transport: T, world: W, stats: S) -> Self {
        Self::with_allocator(config, transport, world, stats, IndexAllocator::new())
    }

    /// Like [`HostSession::new`] with a caller-supplied client index allocator.
    pub fn with_allocator(
        config: HostConfig,
        transport: T,
        mut world: W,
        mut stats: S,
        client_ids: IndexAllocator,
    ) -> Self {
        if !world.load_map(config.mode, &config.map_name) {
            warn!(map = %config.map_name, "Host map could not be loaded");
        }

        // The host's own player occupies index 0 and is never sent to
        let mut local = ClientRecord::new(0, 0);
        local.is_playing = true;
        stats.add_peer(PeerId::local(), &config.player_name, local.team);

        let mut clients = BTreeMap::new();
        clients.insert(PeerId::local(), local);

        info!(
            mode = ?config.mode,
            map = %config.map_name,
            max_clients = config.max_clients,
            "Host session started"
        );

        Self {
            countdown: config.broadcast_period.max(1),
            config,
            transport,
            world,
            stats,
            client_ids,
            clients,
            pending: BTreeSet::new(),
            tick: 0,
            tank_health: BTreeMap::new(),
            block_health: BTreeMap::new(),
            killers: Vec::new(),
            victims: Vec::new(),
        }
    }

    /// One simulation tick: drain the network, step the world, announce what
    /// happened, and broadcast when the period is up.
    pub fn update(&mut self, elapsed_ms: u32) {
        self.tick += 1;

        while let Some(event) = self.transport.poll_event() {
            self.handle_transport_event(event);
        }

        self.world.advance(elapsed_ms);
        for event in self.world.drain_events() {
            self.apply_world_event(event);
        }
        self.release_dead_tanks();

        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            self.broadcast();
            self.countdown = self.config.broadcast_period.max(1);
        }
        self.transport.flush();
    }

    /// Say goodbye to every client and release the transport.
    pub fn shutdown(&mut self, reason: &str) -> ShutdownFlush {
        info!(reason, clients = self.clients.len() - 1, "Host session stopping");
        self.pending.clear();
        self.clients.retain(|peer, _| peer.is_local());
        self.transport.shutdown(reason)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn clients(&self) -> &BTreeMap<PeerId, ClientRecord> {
        &self.clients
    }

    pub fn client(&self, peer: PeerId) -> Option<&ClientRecord> {
        self.clients.get(&peer)
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn status(&self) -> HostStatus {
        let score = self.stats.team_score();
        HostStatus {
            running: true,
            mode: Some(self.config.mode),
            map: self.world.map_name().to_string(),
            tick: self.tick,
            tanks: self.world.tank_positions().len(),
            team_score: [score.first, score.second],
            clients: self
                .clients
                .iter()
                .map(|(peer, record)| ClientStatus {
                    peer: *peer,
                    client_index: record.client_index,
                    team: record.team,
                    tank: record.tank,
                    playing: record.is_playing,
                    kills: self.stats.kills(*peer),
                    deaths: self.stats.deaths(*peer),
                })
                .collect(),
        }
    }

    // ========================================================================
    // Announcements
    // ========================================================================

    /// Tell every playing client that `tank` fired from `position`.
    pub fn ack_fire(&mut self, tank: EntityIndex, position: Position) -> Result<(), SessionError> {
        self.broadcast_message(&Message::FireAck { tank, position })
    }

    /// Announce freshly created tanks and remember which peer drives which.
    pub fn announce_tanks_created(
        &mut self,
        new_round: bool,
        spawns: &[TankSpawn],
    ) -> Result<(), SessionError> {
        let mut tanks = Vec::with_capacity(spawns.len());
        for spawn in spawns {
            if !self.clients.contains_key(&spawn.peer) {
                warn!(peer = %spawn.peer, tank = %spawn.tank, "Tank created for unknown peer");
                continue;
            }
            // A reused index no longer belongs to whoever drove it before
            for (peer, record) in self.clients.iter_mut() {
                if *peer != spawn.peer && record.tank == Some(spawn.tank) {
                    debug!(peer = %peer, tank = %spawn.tank, "Tank index handed to another peer");
                    record.tank = None;
                }
            }
            let Some(record) = self.clients.get_mut(&spawn.peer) else {
                continue;
            };
            record.tank = Some(spawn.tank);
            tanks.push(TankSpawnEntry {
                client_index: record.client_index,
                tank: spawn.tank,
                position: spawn.position,
                team: record.team,
            });
        }

        let new_round = new_round.then(|| self.stats.team_score());
        debug!(count = tanks.len(), new_round = new_round.is_some(), "Announcing tanks");
        self.broadcast_message(&Message::CreateTank { new_round, tanks })
    }

    pub fn announce_tank_freeze(
        &mut self,
        tank: EntityIndex,
        freeze_ms: i16,
    ) -> Result<(), SessionError> {
        self.broadcast_message(&Message::TankFreezeAnn { tank, freeze_ms })
    }

    pub fn announce_item_created(
        &mut self,
        kind: ItemKind,
        item: EntityIndex,
        position: Position,
    ) -> Result<(), SessionError> {
        self.broadcast_message(&Message::CreateItem {
            kind,
            item,
            position,
        })
    }

    pub fn announce_item_activated(
        &mut self,
        item: EntityIndex,
        tank: EntityIndex,
    ) -> Result<(), SessionError> {
        self.broadcast_message(&Message::ActiveItem { item, tank })
    }

    /// Queue a tank health change for the next HealthAnn. Later values for the
    /// same tank replace earlier ones.
    pub fn record_tank_health(&mut self, tank: EntityIndex, health: u8) {
        self.tank_health.insert(tank, health);
    }

    pub fn record_block_health(&mut self, cell: Cell, health: i16) {
        self.block_health.insert(cell, health);
    }

    /// Credit a kill and queue both peers for the next StatAnn.
    pub fn record_kill(&mut self, killer: EntityIndex, victim: EntityIndex) -> Result<(), SessionError> {
        let killer_peer = self.peer_of_tank(killer).ok_or(SessionError::UnknownTank(killer))?;
        let victim_peer = self.peer_of_tank(victim).ok_or(SessionError::UnknownTank(victim))?;

        self.stats.record_kill(killer_peer, victim_peer);
        if !self.killers.contains(&killer_peer) {
            self.killers.push(killer_peer);
        }
        if !self.victims.contains(&victim_peer) {
            self.victims.push(victim_peer);
        }
        info!(killer = %killer_peer, victim = %victim_peer, "Kill recorded");
        Ok(())
    }

    /// The score travels with the next new-round CreateTank.
    pub fn record_round_loss(&mut self, team: Team) {
        self.stats.record_round_loss(team);
        let score = self.stats.team_score();
        info!(team, first = score.first, second = score.second, "Round lost");
    }

    /// Route one gameplay outcome to the matching announcement.
    pub fn apply_world_event(&mut self, event: WorldEvent) {
        let result = match event {
            WorldEvent::TanksCreated { new_round, spawns } => {
                self.announce_tanks_created(new_round, &spawns)
            }
            WorldEvent::TankFired { tank, position } => self.ack_fire(tank, position),
            WorldEvent::TankFrozen { tank, freeze_ms } => self.announce_tank_freeze(tank, freeze_ms),
            WorldEvent::ItemCreated {
                kind,
                item,
                position,
            } => self.announce_item_created(kind, item, position),
            WorldEvent::ItemActivated { item, tank } => self.announce_item_activated(item, tank),
            WorldEvent::TankHealthChanged { tank, health } => {
                self.record_tank_health(tank, health);
                Ok(())
            }
            WorldEvent::BlockHealthChanged { cell, health } => {
                self.record_block_health(cell, health);
                Ok(())
            }
            WorldEvent::Kill { killer, victim } => self.record_kill(killer, victim),
            WorldEvent::RoundLost { team } => {
                self.record_round_loss(team);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "World event not announced");
        }
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionRequested { peer } => self.approve_or_reject(peer),
            TransportEvent::Connected { peer } => self.register_client(peer),
            TransportEvent::Disconnected { peer, reason } => self.handle_disconnect(peer, &reason),
            TransportEvent::Data { peer, payload } => {
                if let Err(e) = self.handle_data(peer, &payload) {
                    warn!(peer = %peer, error = %e, "Dropped client message");
                }
            }
            other => debug!(event = ?other, "Ignoring transport event"),
        }
    }

    fn approve_or_reject(&mut self, peer: PeerId) {
        if self.clients.contains_key(&peer) || self.pending.contains(&peer) {
            info!(peer = %peer, "Rejecting duplicate connection");
            self.transport.reject(peer, REJECT_ALREADY_CONNECTED);
            return;
        }
        if self.clients.len() + self.pending.len() >= self.config.max_clients {
            info!(peer = %peer, max = self.config.max_clients, "Rejecting connection, host is full");
            self.transport.reject(peer, REJECT_SERVER_FULL);
            return;
        }

        debug!(peer = %peer, "Approving connection");
        self.pending.insert(peer);
        self.transport.approve(peer);
    }

    fn register_client(&mut self, peer: PeerId) {
        self.pending.remove(&peer);
        if self.clients.contains_key(&peer) {
            return;
        }

        let clients = &self.clients;
        let client_index = match self
            .client_ids
            .allocate_client_index(|i| clients.values().any(|r| r.client_index == i))
        {
            Ok(index) => index,
            Err(e) => {
                error!(peer = %peer, error = %e, "No client index left");
                return;
            }
        };

        // In deathmatch every player is its own team
        let team = match self.config.mode {
            GameMode::Deathmatch => client_index,
            GameMode::TeamRounds => 0,
        };
        self.clients.insert(peer, ClientRecord::new(client_index, team));
        info!(peer = %peer, client_index, "Client connected");
    }

    fn handle_disconnect(&mut self, peer: PeerId, reason: &DisconnectReason) {
        self.pending.remove(&peer);
        let Some(record) = self.clients.get(&peer) else {
            return;
        };
        let (tank, team) = (record.tank, record.team);

        // Zeroed health sends the tank down the normal death path
        if let Some(tank) = tank {
            self.world.set_tank_health(tank, 0);
            self.record_tank_health(tank, 0);
        }
        self.world.player_left(peer, team);
        self.clients.remove(&peer);
        self.stats.remove_peer(peer);

        info!(peer = %peer, reason = %reason, "Client disconnected");
    }

    // ========================================================================
    // Client messages
    // ========================================================================

    fn handle_data(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), SessionError> {
        let message = decode(payload)?;
        if !self.clients.contains_key(&peer) {
            return Err(SessionError::UnknownPeer(peer));
        }
        debug!(peer = %peer, tag = ?message.tag(), "Client message");

        match message {
            Message::MoveReq { tank, direction } => {
                self.authorize_intent(peer, tank)?;
                if !self.world.set_destined_direction(tank, direction) {
                    return Err(SessionError::UnknownTank(tank));
                }
                Ok(())
            }
            Message::FireReq { tank } => {
                self.authorize_intent(peer, tank)?;
                let motion = self
                    .world
                    .tank_motion(tank)
                    .ok_or(SessionError::UnknownTank(tank))?;
                if !self.world.can_fire(tank) {
                    trace!(peer = %peer, tank = %tank, "Fire request while reloading");
                    return Ok(());
                }
                self.ack_fire(tank, motion.position)?;
                self.world.fire(tank, None);
                Ok(())
            }
            Message::ClientInfoReq { team, name } => {
                let mode = self.config.mode;
                let record = self
                    .clients
                    .get_mut(&peer)
                    .ok_or(SessionError::UnknownPeer(peer))?;
                if mode == GameMode::TeamRounds {
                    record.team = team;
                }
                let (client_index, team) = (record.client_index, record.team);

                self.stats.add_peer(peer, &name, team);
                info!(peer = %peer, client_index, name = %name, team, "Client identified");

                let reply = Message::ClientInfoAnn {
                    client_index,
                    mode,
                    map_name: self.world.map_name().to_string(),
                };
                self.send_to(peer, &reply)
            }
            Message::MapInfoReq { client_index } => {
                if self.clients.get(&peer).map(|r| r.client_index) != Some(client_index) {
                    debug!(peer = %peer, client_index, "Map request with a stale client index");
                }
                let reply = Message::MapInfoAnn {
                    tanks: self.world.tanks(),
                    items: self.world.items(),
                    stats: self.stats.snapshot(),
                };
                self.send_to(peer, &reply)
            }
            Message::BlockSpriteInfoReq => {
                let reply = Message::BlockSpriteInfoAnn {
                    groups: group_blocks(&self.world.block_cells()),
                };
                self.send_to(peer, &reply)?;

                let record = self
                    .clients
                    .get_mut(&peer)
                    .ok_or(SessionError::UnknownPeer(peer))?;
                if record.is_playing {
                    return Ok(());
                }
                record.is_playing = true;
                let team = record.team;

                self.world.player_joined(peer, team);
                info!(peer = %peer, team, "Client joined the match");
                Ok(())
            }
            other => Err(SessionError::UnexpectedMessage(other.tag())),
        }
    }

    /// Intents are rate limited and only honored for the sender's own tank.
    fn authorize_intent(&self, peer: PeerId, tank: EntityIndex) -> Result<(), SessionError> {
        let record = self.clients.get(&peer).ok_or(SessionError::UnknownPeer(peer))?;
        if !record.limiter.check_intent() {
            return Err(SessionError::RateLimited);
        }
        if record.tank != Some(tank) {
            return Err(SessionError::NotOwner { peer, tank });
        }
        Ok(())
    }

    /// Tanks gone from the world stop belonging to anyone, so a later tank
    /// reusing the index is not steered or credited through a stale record.
    fn release_dead_tanks(&mut self) {
        for (peer, record) in self.clients.iter_mut() {
            let Some(tank) = record.tank else {
                continue;
            };
            if self.world.tank_motion(tank).is_none() {
                debug!(peer = %peer, tank = %tank, "Tank released");
                record.tank = None;
            }
        }
    }

    fn peer_of_tank(&self, tank: EntityIndex) -> Option<PeerId> {
        self.clients
            .iter()
            .find(|(_, record)| record.tank == Some(tank))
            .map(|(peer, _)| *peer)
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn send_to(&mut self, peer: PeerId, message: &Message) -> Result<(), SessionError> {
        if peer.is_local() {
            return Ok(());
        }
        let payload = encode(message)?;
        self.transport.send(peer, payload, message.delivery());
        Ok(())
    }

    /// Send to every playing remote client.
    fn broadcast_message(&mut self, message: &Message) -> Result<(), SessionError> {
        let payload = encode(message)?;
        let delivery = message.delivery();
        for (peer, record) in &self.clients {
            if record.is_playing && !peer.is_local() {
                self.transport.send(*peer, payload.clone(), delivery);
            }
        }
        Ok(())
    }

    fn broadcast(&mut self) {
        let tanks = self.world.tank_positions();
        trace!(tick = self.tick, tanks = tanks.len(), "Broadcasting state");
        if let Err(e) = self.broadcast_message(&Message::StateUpdate { tanks }) {
            error!(error = %e, "State update not sent");
        }

        let tanks: Vec<TankHealth> = mem::take(&mut self.tank_health)
            .into_iter()
            .map(|(tank, health)| TankHealth { tank, health })
            .collect();
        let blocks: Vec<BlockHealth> = mem::take(&mut self.block_health)
            .into_iter()
            .map(|(cell, health)| BlockHealth { cell, health })
            .collect();
        for (tanks, blocks) in paired_chunks(tanks, blocks) {
            if let Err(e) = self.broadcast_message(&Message::HealthAnn { tanks, blocks }) {
                error!(error = %e, "Health announcement not sent");
            }
        }

        let killers: Vec<StatEntry> = mem::take(&mut self.killers)
            .into_iter()
            .filter_map(|peer| self.stats.kills(peer).map(|value| StatEntry { peer, value }))
            .collect();
        let victims: Vec<StatEntry> = mem::take(&mut self.victims)
            .into_iter()
            .filter_map(|peer| self.stats.deaths(peer).map(|value| StatEntry { peer, value }))
            .collect();
        for (killers, victims) in paired_chunks(killers, victims) {
            if let Err(e) = self.broadcast_message(&Message::StatAnn { killers, victims }) {
                error!(error = %e, "Stat announcement not sent");
            }
        }
    }
}

/// Pair up two lists into messages of at most [`MAX_LIST_ENTRIES`] entries
/// per list. Empty when both lists are.
fn paired_chunks<A, B>(first: Vec<A>, second: Vec<B>) -> Vec<(Vec<A>, Vec<B>)> {
    let mut first = first.into_iter().peekable();
    let mut second = second.into_iter().peekable();
    let mut chunks = Vec::new();
    while first.peek().is_some() || second.peek().is_some() {
        chunks.push((
            first.by_ref().take(MAX_LIST_ENTRIES).collect(),
            second.by_ref().take(MAX_LIST_ENTRIES).collect(),
        ));
    }
    chunks
}

/// Surviving destructible cells grouped by remaining health, lowest first.
pub fn group_blocks(cells: &[(Cell, Health)]) -> Vec<BlockHealthGroup> {
    let mut groups: BTreeMap<i16, Vec<Cell>> = BTreeMap::new();
    for (cell, health) in cells {
        if let Health::Alive(h) = health {
            if *h > 0 {
                groups.entry(*h).or_default().push(*cell);
            }
        }
    }
    groups
        .into_iter()
        .map(|(health, cells)| BlockHealthGroup { health, cells })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;

    use bytes::Bytes;

    use crate::game::entity::{Direction, Ownership, TankSyncState};
    use crate::game::headless::{Authority, HeadlessWorld};
    use crate::protocol::{Delivery, MessageTag, TeamScore};

    /// Host transport driven by hand
    #[derive(Default)]
    struct ScriptedHost {
        inbox: VecDeque<TransportEvent>,
        rejected: Vec<(PeerId, String)>,
        sent: Vec<(PeerId, Message, Delivery)>,
    }

    impl HostTransport for ScriptedHost {
        fn poll_event(&mut self) -> Option<TransportEvent> {
            self.inbox.pop_front()
        }

        fn approve(&mut self, peer: PeerId) {
            self.inbox.push_back(TransportEvent::Connected { peer });
        }

        fn reject(&mut self, peer: PeerId, reason: &str) {
            self.rejected.push((peer, reason.to_string()));
        }

        fn send(&mut self, peer: PeerId, payload: Bytes, delivery: Delivery) {
            self.sent.push((peer, decode(&payload).unwrap(), delivery));
        }

        fn shutdown(&mut self, _reason: &str) -> ShutdownFlush {
            ShutdownFlush::done()
        }
    }

    type TestHost = HostSession<ScriptedHost, HeadlessWorld>;

    fn peer(n: u8) -> PeerId {
        PeerId::new(Ipv4Addr::new(192, 168, 1, n), 40_000 + n as u16)
    }

    fn host_with(config: HostConfig) -> TestHost {
        HostSession::with_allocator(
            config,
            ScriptedHost::default(),
            HeadlessWorld::seeded(Authority::Host, 3),
            NetStats::new(),
            IndexAllocator::seeded(11),
        )
    }

    fn host() -> TestHost {
        host_with(HostConfig::default())
    }

    fn deliver(host: &mut TestHost, from: PeerId, message: Message) {
        host.transport.inbox.push_back(TransportEvent::Data {
            peer: from,
            payload: encode(&message).unwrap(),
        });
    }

    fn connect(host: &mut TestHost, who: PeerId) {
        host.transport
            .inbox
            .push_back(TransportEvent::ConnectionRequested { peer: who });
        host.update(0);
    }

    /// Connect and run the whole handshake.
    fn join(host: &mut TestHost, who: PeerId, name: &str) {
        connect(host, who);
        let client_index = host.client(who).unwrap().client_index;
        deliver(host, who, Message::ClientInfoReq { team: 0, name: name.to_string() });
        deliver(host, who, Message::MapInfoReq { client_index });
        deliver(host, who, Message::BlockSpriteInfoReq);
        host.update(0);
    }

    fn sent_to(host: &TestHost, who: PeerId, tag: MessageTag) -> Vec<Message> {
        host.transport
            .sent
            .iter()
            .filter(|(p, m, _)| *p == who && m.tag() == tag)
            .map(|(_, m, _)| m.clone())
            .collect()
    }

    #[test]
    fn host_registers_its_own_player() {
        let host = host_with(HostConfig {
            player_name: "captain".to_string(),
            ..HostConfig::default()
        });
        let local = host.client(PeerId::local()).unwrap();
        assert_eq!(local.client_index, 0);
        assert!(local.is_playing);
        assert_eq!(host.stats().get(PeerId::local()).unwrap().name, "captain");
        assert_eq!(host.world().map_name(), "arena");
    }

    #[test]
    fn duplicate_connection_is_rejected() {
        let mut host = host();
        connect(&mut host, peer(1));
        connect(&mut host, peer(1));

        assert_eq!(
            host.transport.rejected,
            vec![(peer(1), REJECT_ALREADY_CONNECTED.to_string())]
        );
        assert_eq!(host.clients().keys().filter(|p| **p == peer(1)).count(), 1);
        assert_eq!(host.clients().len(), 2);
    }

    #[test]
    fn capacity_counts_the_host_record() {
        let mut host = host_with(HostConfig {
            max_clients: 2,
            ..HostConfig::default()
        });
        connect(&mut host, peer(1));
        connect(&mut host, peer(2));

        assert!(host.client(peer(1)).is_some());
        assert!(host.client(peer(2)).is_none());
        assert_eq!(host.transport.rejected, vec![(peer(2), REJECT_SERVER_FULL.to_string())]);
    }

    #[test]
    fn client_indices_are_unique_and_never_zero() {
        let mut host = host();
        for n in 1..=8 {
            connect(&mut host, peer(n));
        }
        let indices: BTreeSet<u8> = host.clients().values().map(|r| r.client_index).collect();
        assert_eq!(indices.len(), 9);
        assert!(host.clients().iter().all(|(p, r)| p.is_local() == (r.client_index == 0)));
    }

    #[test]
    fn handshake_replies_then_marks_playing() {
        let mut host = host();
        connect(&mut host, peer(1));
        let record = host.client(peer(1)).unwrap().clone();
        assert!(!record.is_playing);
        assert_eq!(record.team, record.client_index);

        deliver(&mut host, peer(1), Message::ClientInfoReq { team: 1, name: "rook".to_string() });
        deliver(&mut host, peer(1), Message::MapInfoReq { client_index: record.client_index });
        deliver(&mut host, peer(1), Message::BlockSpriteInfoReq);
        host.update(0);

        let tags: Vec<MessageTag> = host.transport.sent.iter().map(|(_, m, _)| m.tag()).collect();
        assert_eq!(
            &tags[..4],
            &[
                MessageTag::ClientInfoAnn,
                MessageTag::MapInfoAnn,
                MessageTag::BlockSpriteInfoAnn,
                MessageTag::CreateTank,
            ]
        );
        assert_eq!(
            host.transport.sent[0].1,
            Message::ClientInfoAnn {
                client_index: record.client_index,
                mode: GameMode::Deathmatch,
                map_name: "arena".to_string(),
            }
        );

        match &host.transport.sent[2].1 {
            Message::BlockSpriteInfoAnn { groups } => {
                let healths: Vec<i16> = groups.iter().map(|g| g.health).collect();
                assert_eq!(healths, vec![60, 150]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let record = host.client(peer(1)).unwrap();
        assert!(record.is_playing);
        assert!(record.tank.is_some());
        assert_eq!(host.world().tank_count(), 1);
        assert_eq!(host.stats().get(peer(1)).unwrap().name, "rook");
    }

    #[test]
    fn team_mode_uses_requested_team() {
        let mut host = host_with(HostConfig {
            mode: GameMode::TeamRounds,
            ..HostConfig::default()
        });
        join(&mut host, peer(1), "blue");
        assert_eq!(host.client(peer(1)).unwrap().team, 0);

        connect(&mut host, peer(2));
        deliver(&mut host, peer(2), Message::ClientInfoReq { team: 1, name: "red".to_string() });
        host.update(0);
        assert_eq!(host.client(peer(2)).unwrap().team, 1);
    }

    #[test]
    fn state_update_every_period_to_playing_clients_only() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        connect(&mut host, peer(2));
        host.countdown = 3;
        host.transport.sent.clear();

        host.update(0);
        host.update(0);
        assert!(sent_to(&host, peer(1), MessageTag::StateUpdate).is_empty());
        host.update(0);

        let updates = sent_to(&host, peer(1), MessageTag::StateUpdate);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], Message::StateUpdate { tanks: host.world().tank_positions() });
        match &updates[0] {
            Message::StateUpdate { tanks } => {
                assert_eq!(tanks.len(), 1);
                assert_eq!(Some(tanks[0].index), host.client(peer(1)).unwrap().tank);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(sent_to(&host, peer(2), MessageTag::StateUpdate).is_empty());

        let (_, _, delivery) = host
            .transport
            .sent
            .iter()
            .find(|(_, m, _)| m.tag() == MessageTag::StateUpdate)
            .unwrap();
        assert_eq!(*delivery, Delivery::UnreliableSequenced);
    }

    #[test]
    fn health_buffer_flushes_once() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        host.record_tank_health(EntityIndex(5), 40);
        host.countdown = 1;
        host.transport.sent.clear();

        host.update(0);
        assert_eq!(
            sent_to(&host, peer(1), MessageTag::HealthAnn),
            vec![Message::HealthAnn {
                tanks: vec![TankHealth { tank: EntityIndex(5), health: 40 }],
                blocks: vec![],
            }]
        );
        assert!(host.tank_health.is_empty());

        host.transport.sent.clear();
        for _ in 0..3 {
            host.update(0);
        }
        assert!(sent_to(&host, peer(1), MessageTag::HealthAnn).is_empty());
        assert_eq!(sent_to(&host, peer(1), MessageTag::StateUpdate).len(), 1);
    }

    #[test]
    fn later_health_values_replace_earlier_ones() {
        let mut host = host();
        host.record_tank_health(EntityIndex(2), 90);
        host.record_tank_health(EntityIndex(2), 70);
        host.record_block_health(Cell::new(12, 10), 30);
        assert_eq!(host.tank_health.get(&EntityIndex(2)), Some(&70));
        assert_eq!(host.block_health.len(), 1);
    }

    #[test]
    fn move_requests_only_steer_the_senders_tank() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        join(&mut host, peer(2), "b");
        let tank = host.client(peer(1)).unwrap().tank.unwrap();

        deliver(&mut host, peer(2), Message::MoveReq { tank, direction: Direction::Left });
        host.update(0);
        assert_eq!(host.world().tank_motion(tank).unwrap().destined_direction, Direction::None);

        deliver(&mut host, peer(1), Message::MoveReq { tank, direction: Direction::Right });
        host.update(0);
        assert_eq!(host.world().tank_motion(tank).unwrap().destined_direction, Direction::Right);
    }

    #[test]
    fn fire_request_is_acked_with_host_position() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        join(&mut host, peer(2), "b");
        let tank = host.client(peer(1)).unwrap().tank.unwrap();
        let position = host.world().tank_motion(tank).unwrap().position;
        host.transport.sent.clear();

        deliver(&mut host, peer(1), Message::FireReq { tank });
        host.update(0);

        let expected = vec![Message::FireAck { tank, position }];
        assert_eq!(sent_to(&host, peer(1), MessageTag::FireAck), expected);
        assert_eq!(sent_to(&host, peer(2), MessageTag::FireAck), expected);
        assert!(host.world().shells_in_flight() <= 1);
    }

    #[test]
    fn intent_flood_is_rate_limited() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        let tank = host.client(peer(1)).unwrap().tank.unwrap();
        host.transport.sent.clear();

        for _ in 0..200 {
            deliver(&mut host, peer(1), Message::FireReq { tank });
        }
        host.update(0);
        let acks = sent_to(&host, peer(1), MessageTag::FireAck).len();
        assert!(acks < 200);
        assert!(acks > 0);
    }

    #[test]
    fn disconnect_kills_tank_and_forgets_peer() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        let tank = host.client(peer(1)).unwrap().tank.unwrap();
        assert!(host.world().has_player(peer(1)));
        host.countdown = 100;

        host.transport.inbox.push_back(TransportEvent::Disconnected {
            peer: peer(1),
            reason: DisconnectReason::Quit("Quit".to_string()),
        });
        host.update(0);

        assert!(host.client(peer(1)).is_none());
        assert!(host.stats().get(peer(1)).is_none());
        assert!(!host.world().has_player(peer(1)));
        assert_eq!(host.tank_health.get(&tank), Some(&0));
        assert!(host.world().tank(tank).is_none());
    }

    #[test]
    fn fire_requests_wait_for_the_reload() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        let tank = host.client(peer(1)).unwrap().tank.unwrap();
        assert_eq!(host.world().tank(tank).unwrap().state.time_between_fires, 1_000);
        host.transport.sent.clear();

        // One second of requests every quarter second
        for _ in 0..4 {
            deliver(&mut host, peer(1), Message::FireReq { tank });
            host.update(250);
        }
        assert_eq!(sent_to(&host, peer(1), MessageTag::FireAck).len(), 1);

        deliver(&mut host, peer(1), Message::FireReq { tank });
        host.update(0);
        assert_eq!(sent_to(&host, peer(1), MessageTag::FireAck).len(), 2);
    }

    #[test]
    fn reused_tank_index_belongs_to_the_newcomer() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        join(&mut host, peer(2), "b");
        let dead = host.client(peer(1)).unwrap().tank.unwrap();
        let killer = host.client(peer(2)).unwrap().tank.unwrap();

        host.world_mut().damage_tank(dead, u16::MAX, Some(killer));
        host.update(0);
        assert!(host.world().tank(dead).is_none());
        assert_eq!(host.client(peer(1)).unwrap().tank, None);
        assert_eq!(host.stats().kills(peer(2)), Some(1));
        assert_eq!(host.stats().deaths(peer(1)), Some(1));

        // Newcomer's tank gets the freed index
        connect(&mut host, peer(3));
        deliver(&mut host, peer(3), Message::ClientInfoReq { team: 0, name: "c".to_string() });
        host.update(0);
        let position = Position::new(40, 40);
        let team = host.client(peer(3)).unwrap().team;
        host.world_mut()
            .spawn_tank(Ownership::Local(dead), TankSyncState::spawned(dead, position, team))
            .unwrap();
        host.announce_tanks_created(false, &[TankSpawn { peer: peer(3), tank: dead, position }])
            .unwrap();

        deliver(&mut host, peer(1), Message::MoveReq { tank: dead, direction: Direction::Left });
        host.update(0);
        assert_eq!(host.world().tank_motion(dead).unwrap().destined_direction, Direction::None);

        deliver(&mut host, peer(3), Message::MoveReq { tank: dead, direction: Direction::Right });
        host.update(0);
        assert_eq!(host.world().tank_motion(dead).unwrap().destined_direction, Direction::Right);

        host.record_kill(killer, dead).unwrap();
        assert_eq!(host.stats().deaths(peer(3)), Some(1));
        assert_eq!(host.stats().deaths(peer(1)), Some(1));
        assert_eq!(host.stats().kills(peer(2)), Some(2));
    }

    #[test]
    fn announcing_a_tank_takes_it_from_its_previous_owner() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        connect(&mut host, peer(2));
        let tank = host.client(peer(1)).unwrap().tank.unwrap();
        let position = host.world().tank_motion(tank).unwrap().position;

        host.announce_tanks_created(false, &[TankSpawn { peer: peer(2), tank, position }])
            .unwrap();

        assert_eq!(host.client(peer(1)).unwrap().tank, None);
        assert_eq!(host.client(peer(2)).unwrap().tank, Some(tank));
    }

    #[test]
    fn large_health_buffers_are_split_across_announcements() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        for n in 0..300u16 {
            host.record_block_health(Cell::new((n % 100) as u8, (n / 100) as u8), 10);
        }
        host.record_tank_health(EntityIndex(5), 40);
        host.countdown = 1;
        host.transport.sent.clear();
        host.update(0);

        let announcements = sent_to(&host, peer(1), MessageTag::HealthAnn);
        assert_eq!(announcements.len(), 2);
        let mut blocks = 0;
        let mut tanks = 0;
        for message in &announcements {
            let Message::HealthAnn { tanks: t, blocks: b } = message else {
                panic!("unexpected {message:?}");
            };
            assert!(b.len() <= MAX_LIST_ENTRIES);
            blocks += b.len();
            tanks += t.len();
        }
        assert_eq!(blocks, 300);
        assert_eq!(tanks, 1);
        assert!(host.block_health.is_empty());
    }

    #[test]
    fn paired_chunks_cover_the_longer_list() {
        assert!(paired_chunks(Vec::<u8>::new(), Vec::<u8>::new()).is_empty());

        let chunks = paired_chunks(vec![0u8; 3], vec![0u16; 600]);
        let sizes: Vec<(usize, usize)> = chunks.iter().map(|(a, b)| (a.len(), b.len())).collect();
        assert_eq!(sizes, vec![(3, 255), (0, 255), (0, 90)]);
    }

    #[test]
    fn kill_stats_flush_once() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        join(&mut host, peer(2), "b");
        let killer = host.client(peer(1)).unwrap().tank.unwrap();
        let victim = host.client(peer(2)).unwrap().tank.unwrap();

        host.record_kill(killer, victim).unwrap();
        host.record_kill(killer, victim).unwrap();
        host.countdown = 1;
        host.transport.sent.clear();
        host.update(0);

        assert_eq!(
            sent_to(&host, peer(2), MessageTag::StatAnn),
            vec![Message::StatAnn {
                killers: vec![StatEntry { peer: peer(1), value: 2 }],
                victims: vec![StatEntry { peer: peer(2), value: 2 }],
            }]
        );

        host.transport.sent.clear();
        for _ in 0..3 {
            host.update(0);
        }
        assert!(sent_to(&host, peer(2), MessageTag::StatAnn).is_empty());
    }

    #[test]
    fn kill_with_unknown_tank_is_an_error() {
        let mut host = host();
        assert!(matches!(
            host.record_kill(EntityIndex(9), EntityIndex(10)),
            Err(SessionError::UnknownTank(EntityIndex(9)))
        ));
    }

    #[test]
    fn new_round_creation_carries_team_score() {
        let mut host = host_with(HostConfig {
            mode: GameMode::TeamRounds,
            ..HostConfig::default()
        });
        join(&mut host, peer(1), "a");
        host.record_round_loss(0);
        host.transport.sent.clear();

        let spawn = TankSpawn {
            peer: peer(1),
            tank: EntityIndex(42),
            position: Position::new(40, 40),
        };
        host.announce_tanks_created(true, &[spawn]).unwrap();

        match &sent_to(&host, peer(1), MessageTag::CreateTank)[0] {
            Message::CreateTank { new_round, tanks } => {
                assert_eq!(*new_round, Some(TeamScore { first: 0, second: 1 }));
                assert_eq!(tanks[0].tank, EntityIndex(42));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(host.client(peer(1)).unwrap().tank, Some(EntityIndex(42)));
    }

    #[test]
    fn garbage_and_unexpected_messages_are_dropped() {
        let mut host = host();
        join(&mut host, peer(1), "a");
        let before = host.clients().len();

        host.transport.inbox.push_back(TransportEvent::Data {
            peer: peer(1),
            payload: Bytes::from_static(&[200, 1, 2]),
        });
        deliver(&mut host, peer(1), Message::StateUpdate { tanks: vec![] });
        deliver(&mut host, peer(9), Message::BlockSpriteInfoReq);
        host.update(0);

        assert_eq!(host.clients().len(), before);
        assert!(host.client(peer(9)).is_none());
    }

    #[test]
    fn block_groups_skip_untracked_cells() {
        let groups = group_blocks(&[
            (Cell::new(0, 0), Health::NotTracked),
            (Cell::new(3, 3), Health::Alive(40)),
            (Cell::new(1, 1), Health::Alive(20)),
            (Cell::new(2, 2), Health::Alive(40)),
        ]);
        assert_eq!(
            groups,
            vec![
                BlockHealthGroup { health: 20, cells: vec![Cell::new(1, 1)] },
                BlockHealthGroup { health: 40, cells: vec![Cell::new(3, 3), Cell::new(2, 2)] },
            ]
        );
    }
}
