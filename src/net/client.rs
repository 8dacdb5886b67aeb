//! Client Session
//!
//! Connects to a host, walks the snapshot handshake and then keeps the local
//! world in step with host announcements. Gameplay traffic is ignored until
//! the terrain snapshot has been applied, so no delta ever lands on a world
//! that has not been fully materialized.
//!
//! ```text
//! Disconnected --connect--> Connecting --approved--> Connected --BlockSpriteInfoAnn--> Ready
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use super::transport::{ClientTransport, ShutdownFlush, TransportEvent};
use super::{PeerId, SessionError};
use crate::config::ClientConfig;
use crate::game::entity::{
    Direction, EntityIndex, GameMode, ItemSyncState, Ownership, TankPositionState, TankSyncState,
    Team,
};
use crate::game::reconcile::needs_correction;
use crate::game::stats::{NetStats, PeerStats};
use crate::game::world::{MapControl, TankControl, World};
use crate::protocol::{decode, encode, Message, TankSpawnEntry, TeamScore};

/// Extra waiting time granted to announced items to cover the trip from the host
const ITEM_LATENCY_MS: i16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected, handshake not finished
    Connected,
    /// Handshake finished; gameplay messages are applied
    Ready,
}

pub struct ClientSession<T, W, S = NetStats> {
    config: ClientConfig,
    transport: T,
    world: W,
    stats: S,
    state: ConnectionState,
    host: Option<PeerId>,
    client_index: Option<u8>,
    mode: Option<GameMode>,
    team: Team,
    local_tank: Option<EntityIndex>,
    /// Countdown to the first handshake request after connecting
    settle_ms: Option<u32>,
    fire_cooldown_ms: u32,
    /// Direction requested but not yet confirmed by a state update
    pending_move: Option<Direction>,
    discovered: Vec<PeerId>,
    last_rejection: Option<String>,
}

impl<T, W, S> ClientSession<T, W, S>
where
    T: ClientTransport,
    W: World,
    S: PeerStats,
{
    pub fn new(config: ClientConfig, transport: T, world: W, stats: S) -> Self {
        Self {
            team: config.team,
            config,
            transport,
            world,
            stats,
            state: ConnectionState::Disconnected,
            host: None,
            client_index: None,
            mode: None,
            local_tank: None,
            settle_ms: None,
            fire_cooldown_ms: 0,
            pending_move: None,
            discovered: Vec::new(),
            last_rejection: None,
        }
    }

    pub fn connect(&mut self, host: std::net::SocketAddr) {
        info!(host = %host, "Connecting to host");
        self.state = ConnectionState::Connecting;
        self.last_rejection = None;
        self.transport.connect(host);
    }

    /// Ask the local network for hosts listening on `port`.
    pub fn discover(&mut self, port: u16) {
        self.discovered.clear();
        self.transport.discover(port);
    }

    /// One simulation tick: run timers, drain the network, then predict.
    pub fn update(&mut self, elapsed_ms: u32) {
        self.fire_cooldown_ms = self.fire_cooldown_ms.saturating_sub(elapsed_ms);
        if let Some(remaining) = self.settle_ms {
            if remaining <= elapsed_ms {
                self.settle_ms = None;
                self.send_client_info();
            } else {
                self.settle_ms = Some(remaining - elapsed_ms);
            }
        }

        while let Some(event) = self.transport.poll_event() {
            self.handle_transport_event(event);
        }

        self.world.advance(elapsed_ms);
        // Outcomes are the host's to announce
        self.world.drain_events();
        self.transport.flush();
    }

    pub fn shutdown(&mut self, reason: &str) -> ShutdownFlush {
        info!(reason, "Client session stopping");
        self.reset();
        self.transport.shutdown(reason)
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Ask the host to steer the local tank. Returns whether a request went out.
    pub fn request_move(&mut self, direction: Direction) -> bool {
        let Some(tank) = self.playing_tank() else {
            return false;
        };
        let current = self.world.tank_motion(tank).map(|m| m.destined_direction);
        if current == Some(direction) || self.pending_move == Some(direction) {
            return false;
        }

        if let Err(e) = self.send(&Message::MoveReq { tank, direction }) {
            warn!(error = %e, "Move request not sent");
            return false;
        }
        self.pending_move = Some(direction);
        true
    }

    /// Ask the host to fire the local tank once it has reloaded, at most once
    /// per fire interval.
    pub fn request_fire(&mut self) -> bool {
        let Some(tank) = self.playing_tank() else {
            return false;
        };
        if self.fire_cooldown_ms > 0 || !self.world.can_fire(tank) {
            return false;
        }

        if let Err(e) = self.send(&Message::FireReq { tank }) {
            warn!(error = %e, "Fire request not sent");
            return false;
        }
        self.fire_cooldown_ms = duration_ms(self.config.fire_request_interval);
        // The ack restarts the timer from the host's shot
        self.world.start_reload(tank);
        true
    }

    /// Switch between the two teams. Only meaningful before joining.
    pub fn change_team(&mut self) -> Team {
        self.team = if self.team == 0 { 1 } else { 0 };
        self.team
    }

    /// The gameplay screen went away; stop applying gameplay messages.
    pub fn not_ready(&mut self) {
        if self.state == ConnectionState::Ready {
            self.state = ConnectionState::Connected;
        }
    }

    /// Second handshake step. Sent automatically once the map is loaded.
    pub fn request_map_info(&mut self) {
        let Some(client_index) = self.client_index else {
            debug!("Map info requested before the host assigned an index");
            return;
        };
        if let Err(e) = self.send(&Message::MapInfoReq { client_index }) {
            warn!(error = %e, "Map info request not sent");
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn host(&self) -> Option<PeerId> {
        self.host
    }

    pub fn client_index(&self) -> Option<u8> {
        self.client_index
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn local_tank(&self) -> Option<EntityIndex> {
        self.local_tank
    }

    pub fn discovered_hosts(&self) -> &[PeerId] {
        &self.discovered
    }

    pub fn last_rejection(&self) -> Option<&str> {
        self.last_rejection.as_deref()
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

    // ========================================================================
    // Transport events
    // ========================================================================

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { peer } => {
                info!(host = %peer, "Connected, waiting before handshake");
                self.host = Some(peer);
                self.state = ConnectionState::Connected;
                self.settle_ms = Some(duration_ms(self.config.settle_delay));
            }
            TransportEvent::Disconnected { peer, reason } => {
                info!(host = %peer, reason = %reason, "Disconnected from host");
                self.reset();
            }
            TransportEvent::Rejected { peer, reason } => {
                warn!(host = %peer, reason = %reason, "Connection rejected");
                self.reset();
                self.last_rejection = Some(reason);
            }
            TransportEvent::HostDiscovered { peer } => {
                if !self.discovered.contains(&peer) {
                    info!(host = %peer, "Host discovered");
                    self.discovered.push(peer);
                }
            }
            TransportEvent::Data { payload, .. } => {
                if let Err(e) = self.handle_data(&payload) {
                    warn!(error = %e, "Dropped host message");
                }
            }
            TransportEvent::ConnectionRequested { peer } => {
                debug!(peer = %peer, "Ignoring connection request on a client");
            }
        }
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.host = None;
        self.client_index = None;
        self.local_tank = None;
        self.settle_ms = None;
        self.pending_move = None;
    }

    // ========================================================================
    // Host messages
    // ========================================================================

    fn handle_data(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let message = decode(payload)?;
        let tag = message.tag();
        if !tag.is_handshake() && !self.is_ready() {
            debug!(?tag, "Ignoring gameplay message before ready");
            return Ok(());
        }
        debug!(?tag, "Host message");

        match message {
            Message::StateUpdate { tanks } => {
                self.apply_state_update(&tanks);
                Ok(())
            }
            Message::FireAck { tank, position } => {
                if !self.world.fire(tank, Some(position)) {
                    return Err(SessionError::UnknownTank(tank));
                }
                Ok(())
            }
            Message::CreateTank { new_round, tanks } => self.apply_created_tanks(new_round, &tanks),
            Message::TankFreezeAnn { tank, freeze_ms } => {
                if !self.world.freeze_tank(tank, freeze_ms) {
                    return Err(SessionError::UnknownTank(tank));
                }
                Ok(())
            }
            Message::CreateItem {
                kind,
                item,
                position,
            } => {
                let mut state = ItemSyncState::spawned(item, kind, position);
                state.waiting_ms = state.waiting_ms.saturating_add(ITEM_LATENCY_MS);
                self.world.spawn_item(Ownership::Remote(item), state)?;
                Ok(())
            }
            Message::ActiveItem { item, tank } => {
                if !self.world.activate_item(item, tank) {
                    return Err(SessionError::UnknownItem(item));
                }
                Ok(())
            }
            Message::HealthAnn { tanks, blocks } => {
                // Every entry carries a full value; apply what we can
                for entry in tanks {
                    if !self.world.set_tank_health(entry.tank, entry.health) {
                        debug!(tank = %entry.tank, "Health for unknown tank");
                    }
                }
                let mut unknown = None;
                for entry in blocks {
                    if !self.world.set_block_health(entry.cell, entry.health) {
                        unknown.get_or_insert(entry.cell);
                    }
                }
                match unknown {
                    Some(cell) => Err(SessionError::UnknownBlock(cell)),
                    None => Ok(()),
                }
            }
            Message::StatAnn { killers, victims } => {
                for entry in killers {
                    self.stats.set_kills(entry.peer, entry.value);
                }
                for entry in victims {
                    self.stats.set_deaths(entry.peer, entry.value);
                }
                Ok(())
            }
            Message::ClientInfoAnn {
                client_index,
                mode,
                map_name,
            } => {
                info!(client_index, ?mode, map = %map_name, "Host assigned client index");
                self.client_index = Some(client_index);
                self.mode = Some(mode);
                if mode == GameMode::Deathmatch {
                    self.team = client_index;
                }
                if self.world.load_map(mode, &map_name) {
                    self.request_map_info();
                }
                Ok(())
            }
            Message::MapInfoAnn {
                tanks,
                items,
                stats,
            } => {
                debug!(tanks = tanks.len(), items = items.len(), peers = stats.len(), "World snapshot");
                for tank in tanks {
                    let index = tank.index;
                    self.world.spawn_tank(Ownership::Remote(index), tank)?;
                }
                for item in items {
                    let index = item.index;
                    self.world.spawn_item(Ownership::Remote(index), item)?;
                }
                self.stats.load_snapshot(stats);
                self.send(&Message::BlockSpriteInfoReq)
            }
            Message::BlockSpriteInfoAnn { groups } => {
                let mut survivors = Vec::new();
                for group in groups {
                    for cell in group.cells {
                        if !self.world.set_block_health(cell, group.health) {
                            debug!(x = cell.x, y = cell.y, "Snapshot names an unknown block");
                        }
                        survivors.push(cell);
                    }
                }
                self.world.retain_blocks(&survivors);
                self.state = ConnectionState::Ready;
                info!(client_index = ?self.client_index, "Handshake complete, ready");
                Ok(())
            }
            other => Err(SessionError::UnexpectedMessage(other.tag())),
        }
    }

    /// Snap tanks that drifted, then drop every tank the host no longer lists.
    fn apply_state_update(&mut self, tanks: &[TankPositionState]) {
        for entry in tanks {
            let Some(motion) = self.world.tank_motion(entry.index) else {
                debug!(tank = %entry.index, "Position for unknown tank");
                continue;
            };
            if needs_correction(
                motion.position,
                entry.position,
                motion.destined_direction,
                entry.destined_direction,
                motion.speed,
            ) {
                self.world
                    .snap_tank(entry.index, entry.position, entry.destined_direction);
            }
        }

        let survivors: Vec<EntityIndex> = tanks.iter().map(|t| t.index).collect();
        self.world.retain_tanks(&survivors);
        if let Some(tank) = self.local_tank {
            if !survivors.contains(&tank) {
                self.local_tank = None;
            }
        }
        self.pending_move = None;
    }

    fn apply_created_tanks(
        &mut self,
        new_round: Option<TeamScore>,
        tanks: &[TankSpawnEntry],
    ) -> Result<(), SessionError> {
        if let Some(score) = new_round {
            info!(first = score.first, second = score.second, "New round");
            self.world.new_round();
            self.stats.set_team_score(score);
        }

        for entry in tanks {
            let ownership = if Some(entry.client_index) == self.client_index {
                self.local_tank = Some(entry.tank);
                self.pending_move = None;
                Ownership::Local(entry.tank)
            } else {
                Ownership::Remote(entry.tank)
            };
            let state = TankSyncState::spawned(entry.tank, entry.position, entry.team);
            self.world.spawn_tank(ownership, state)?;
        }
        Ok(())
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn send_client_info(&mut self) {
        let message = Message::ClientInfoReq {
            team: self.team,
            name: self.config.player_name.clone(),
        };
        if let Err(e) = self.send(&message) {
            warn!(error = %e, "Client info request not sent");
        }
    }

    fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        let payload = encode(message)?;
        self.transport.send(payload, message.delivery());
        Ok(())
    }

    fn playing_tank(&self) -> Option<EntityIndex> {
        if self.is_ready() {
            self.local_tank
        } else {
            None
        }
    }
}

fn duration_ms(duration: Duration) -> u32 {
    duration.as_millis().min(u128::from(u32::MAX)) as u32
}
