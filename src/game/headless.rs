//! Plain-data world without rendering
//!
//! Backs the dedicated host, the headless client and the session tests.
//! Entities are plain records; behavior comes from the capability traits
//! [`Movable`], [`Damageable`] and [`NetworkOwned`].

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use super::combat::{CombatSystem, HitOutcome, Shell};
use super::entity::{
    Cell, Direction, EntityIndex, GameMode, Health, ItemSyncState, Ownership, Position,
    TankMotion, TankPositionState, TankSyncState, Team,
};
use super::index::{AllocError, IndexAllocator};
use super::physics::{Bounds, PhysicsSystem};
use super::world::{MapControl, MatchEvents, TankControl, TankSpawn, World, WorldEvent};
use crate::net::PeerId;

/// Invulnerability granted to every surviving tank when a round starts
const NEW_ROUND_INVULNERABLE_MS: i16 = 3_000;

// ============================================================================
// Capabilities
// ============================================================================

pub trait Movable {
    fn position(&self) -> Position;
    fn heading(&self) -> Direction;
    fn speed(&self) -> u8;
    fn steer(&mut self, direction: Direction);
    fn place(&mut self, position: Position);
}

pub trait Damageable {
    fn health(&self) -> u8;
    fn set_health(&mut self, health: u8);

    fn is_destroyed(&self) -> bool {
        self.health() == 0
    }
}

pub trait NetworkOwned {
    fn ownership(&self) -> Ownership;

    fn is_remote(&self) -> bool {
        self.ownership().is_remote()
    }
}

/// A live tank
#[derive(Debug, Clone)]
pub struct TankBody {
    pub state: TankSyncState,
    pub ownership: Ownership,
    pub freeze_ms: i32,
    pub fire_cooldown_ms: i32,
}

impl TankBody {
    pub fn is_frozen(&self) -> bool {
        self.freeze_ms > 0
    }

    pub fn is_invulnerable(&self) -> bool {
        self.state.invulnerable_ms > 0
    }

    fn tick_timers(&mut self, elapsed_ms: u32) {
        let elapsed = elapsed_ms.min(i16::MAX as u32) as i16;
        self.state.invulnerable_ms = (self.state.invulnerable_ms - elapsed).max(0);
        self.freeze_ms = (self.freeze_ms - i32::from(elapsed)).max(0);
        self.fire_cooldown_ms = (self.fire_cooldown_ms - i32::from(elapsed)).max(0);
    }
}

impl Movable for TankBody {
    fn position(&self) -> Position {
        self.state.position
    }

    fn heading(&self) -> Direction {
        self.state.destined_direction
    }

    fn speed(&self) -> u8 {
        self.state.speed
    }

    fn steer(&mut self, direction: Direction) {
        self.state.destined_direction = direction;
        if direction != Direction::None {
            self.state.facing_direction = direction;
        }
    }

    fn place(&mut self, position: Position) {
        self.state.position = position;
    }
}

impl Damageable for TankBody {
    fn health(&self) -> u8 {
        self.state.health
    }

    fn set_health(&mut self, health: u8) {
        self.state.health = health;
    }
}

impl NetworkOwned for TankBody {
    fn ownership(&self) -> Ownership {
        self.ownership
    }
}

// ============================================================================
// Maps
// ============================================================================

/// Terrain and spawn points of a named map
#[derive(Debug, Clone)]
pub struct MapLayout {
    pub name: String,
    pub columns: u8,
    pub rows: u8,
    pub blocks: Vec<(Cell, Health)>,
    pub spawn_points: Vec<Position>,
}

impl MapLayout {
    /// 40x30 arena: solid border, two brick walls and a stone pillar
    pub fn arena() -> Self {
        let (columns, rows) = (40u8, 30u8);
        let mut blocks = Vec::new();

        for x in 0..columns {
            blocks.push((Cell::new(x, 0), Health::NotTracked));
            blocks.push((Cell::new(x, rows - 1), Health::NotTracked));
        }
        for y in 1..rows - 1 {
            blocks.push((Cell::new(0, y), Health::NotTracked));
            blocks.push((Cell::new(columns - 1, y), Health::NotTracked));
        }
        for x in 12..=27 {
            blocks.push((Cell::new(x, 10), Health::Alive(60)));
            blocks.push((Cell::new(x, 19), Health::Alive(60)));
        }
        for y in 13..=16 {
            blocks.push((Cell::new(19, y), Health::Alive(150)));
            blocks.push((Cell::new(20, y), Health::Alive(150)));
        }

        Self {
            name: "arena".to_string(),
            columns,
            rows,
            blocks,
            spawn_points: vec![
                Position::new(40, 40),
                Position::new(710, 40),
                Position::new(40, 510),
                Position::new(710, 510),
                Position::new(375, 40),
                Position::new(375, 510),
            ],
        }
    }
}

// ============================================================================
// World
// ============================================================================

/// Which side of the connection this world simulates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Resolves hits, deaths and spawns
    Host,
    /// Only predicts movement; outcomes arrive from the host
    Client,
}

pub struct HeadlessWorld {
    authority: Authority,
    mode: GameMode,
    layouts: HashMap<String, MapLayout>,
    map_name: String,
    bounds: Bounds,
    blocks: BTreeMap<Cell, Health>,
    spawn_points: Vec<Position>,
    next_spawn: usize,
    tanks: BTreeMap<EntityIndex, TankBody>,
    items: BTreeMap<EntityIndex, ItemSyncState>,
    shells: Vec<Shell>,
    players: BTreeMap<PeerId, Team>,
    tank_ids: IndexAllocator,
    item_ids: IndexAllocator,
    events: Vec<WorldEvent>,
}

impl HeadlessWorld {
    pub fn new(authority: Authority) -> Self {
        Self::with_allocators(authority, IndexAllocator::new(), IndexAllocator::new())
    }

    /// Deterministic index allocation for tests
    pub fn seeded(authority: Authority, seed: u64) -> Self {
        Self::with_allocators(
            authority,
            IndexAllocator::seeded(seed),
            IndexAllocator::seeded(seed.wrapping_add(1)),
        )
    }

    fn with_allocators(authority: Authority, tank_ids: IndexAllocator, item_ids: IndexAllocator) -> Self {
        let arena = MapLayout::arena();
        let mut layouts = HashMap::new();
        layouts.insert(arena.name.clone(), arena);

        Self {
            authority,
            mode: GameMode::Deathmatch,
            layouts,
            map_name: String::new(),
            bounds: Bounds::from_grid(40, 30),
            blocks: BTreeMap::new(),
            spawn_points: Vec::new(),
            next_spawn: 0,
            tanks: BTreeMap::new(),
            items: BTreeMap::new(),
            shells: Vec::new(),
            players: BTreeMap::new(),
            tank_ids,
            item_ids,
            events: Vec::new(),
        }
    }

    /// Make another map loadable by name.
    pub fn with_layout(mut self, layout: MapLayout) -> Self {
        self.layouts.insert(layout.name.clone(), layout);
        self
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn tank(&self, tank: EntityIndex) -> Option<&TankBody> {
        self.tanks.get(&tank)
    }

    pub fn tank_count(&self) -> usize {
        self.tanks.len()
    }

    pub fn block(&self, cell: Cell) -> Option<Health> {
        self.blocks.get(&cell).copied()
    }

    pub fn item(&self, item: EntityIndex) -> Option<&ItemSyncState> {
        self.items.get(&item)
    }

    /// Joined and not yet left
    pub fn has_player(&self, peer: PeerId) -> bool {
        self.players.contains_key(&peer)
    }

    pub fn shells_in_flight(&self) -> usize {
        self.shells.len()
    }

    /// Spawn a tank for `peer` at the next free spawn point and queue the
    /// announcement.
    pub fn spawn_player(&mut self, peer: PeerId, team: Team) -> Result<EntityIndex, AllocError> {
        let position = self.free_spawn_point();
        let state = TankSyncState::spawned(EntityIndex(0), position, team);
        let tank = self.spawn_tank(Ownership::Unassigned, state)?;

        self.players.insert(peer, team);
        self.events.push(WorldEvent::TanksCreated {
            new_round: false,
            spawns: vec![TankSpawn {
                peer,
                tank,
                position,
            }],
        });
        info!(peer = %peer, tank = %tank, team, "Player tank spawned");
        Ok(tank)
    }

    /// Fire the host's own tank, respecting its cooldown.
    pub fn fire_local(&mut self, tank: EntityIndex) -> bool {
        if !self.can_fire(tank) {
            return false;
        }
        let Some(position) = self.tanks.get(&tank).map(|body| body.state.position) else {
            return false;
        };
        self.fire(tank, None);
        self.events.push(WorldEvent::TankFired { tank, position });
        true
    }

    /// Apply raw damage to a tank, as if hit by `attacker`.
    pub fn damage_tank(&mut self, tank: EntityIndex, damage: u16, attacker: Option<EntityIndex>) {
        let Some(body) = self.tanks.get_mut(&tank) else {
            return;
        };
        let (health, killed) = CombatSystem::apply_damage(body.health(), damage);
        body.set_health(health);
        self.events.push(WorldEvent::TankHealthChanged { tank, health });
        if killed {
            if let Some(killer) = attacker {
                self.events.push(WorldEvent::Kill {
                    killer,
                    victim: tank,
                });
            }
        }
    }

    /// Team `team` lost the round.
    pub fn end_round(&mut self, team: Team) {
        self.events.push(WorldEvent::RoundLost { team });
    }

    fn free_spawn_point(&mut self) -> Position {
        let count = self.spawn_points.len();
        if count == 0 {
            return Position::default();
        }

        for _ in 0..count {
            let candidate = self.spawn_points[self.next_spawn % count];
            self.next_spawn = (self.next_spawn + 1) % count;
            if !self
                .tanks
                .values()
                .any(|t| PhysicsSystem::tanks_collide(t.position(), candidate))
            {
                return candidate;
            }
        }
        self.spawn_points[0]
    }

    fn blocked(&self, tank: EntityIndex, position: Position) -> bool {
        let area = PhysicsSystem::tank_area(position);
        let hits_block = PhysicsSystem::cells_under(area)
            .iter()
            .any(|c| self.blocks.contains_key(c));
        hits_block
            || self
                .tanks
                .iter()
                .any(|(i, t)| *i != tank && PhysicsSystem::tanks_collide(t.position(), position))
    }

    fn move_tanks(&mut self) {
        let indices: Vec<EntityIndex> = self.tanks.keys().copied().collect();
        for index in indices {
            let Some(body) = self.tanks.get(&index) else {
                continue;
            };
            if body.is_frozen() || body.heading() == Direction::None {
                continue;
            }
            let next = PhysicsSystem::step(body.position(), body.heading(), body.speed(), self.bounds);
            if !self.blocked(index, next) {
                if let Some(body) = self.tanks.get_mut(&index) {
                    body.place(next);
                }
            }
        }
    }

    fn move_shells(&mut self) {
        let shells = std::mem::take(&mut self.shells);
        for mut shell in shells {
            if !shell.update() {
                continue;
            }
            let area = shell.area();

            let hit_cell = PhysicsSystem::cells_under(area)
                .into_iter()
                .find(|c| self.blocks.contains_key(c));
            if let Some(cell) = hit_cell {
                if self.authority == Authority::Host {
                    self.hit_block(cell, shell.damage);
                }
                continue;
            }

            let hit_tank = self
                .tanks
                .iter()
                .find(|(i, t)| {
                    **i != shell.owner
                        && !t.is_destroyed()
                        && PhysicsSystem::tank_area(t.position()).intersects(&area)
                })
                .map(|(i, _)| *i);
            if let Some(tank) = hit_tank {
                if self.authority == Authority::Host {
                    self.hit_tank(tank, &shell);
                }
                continue;
            }

            self.shells.push(shell);
        }
    }

    fn hit_block(&mut self, cell: Cell, damage: u16) {
        let Some(Health::Alive(health)) = self.blocks.get(&cell).copied() else {
            return;
        };
        let left = (i32::from(health) - i32::from(damage)).max(0) as i16;
        if left == 0 {
            self.blocks.remove(&cell);
        } else {
            self.blocks.insert(cell, Health::Alive(left));
        }
        self.events.push(WorldEvent::BlockHealthChanged { cell, health: left });
    }

    fn hit_tank(&mut self, tank: EntityIndex, shell: &Shell) {
        let Some(body) = self.tanks.get_mut(&tank) else {
            return;
        };
        let outcome = CombatSystem::resolve_hit(
            shell,
            body.state.team,
            body.health(),
            body.state.armor,
            body.is_invulnerable(),
        );

        match outcome {
            HitOutcome::Damaged { health, killed } => {
                body.set_health(health);
                self.events.push(WorldEvent::TankHealthChanged { tank, health });
                if killed {
                    self.events.push(WorldEvent::Kill {
                        killer: shell.owner,
                        victim: tank,
                    });
                }
            }
            HitOutcome::Frozen(freeze_ms) => {
                body.freeze_ms = i32::from(freeze_ms);
                self.events.push(WorldEvent::TankFrozen { tank, freeze_ms });
            }
            HitOutcome::Absorbed => {}
        }
    }

    fn tick_items(&mut self, elapsed_ms: u32) {
        let elapsed = elapsed_ms.min(i16::MAX as u32) as i16;
        self.items.retain(|_, item| {
            if item.affected_tank.is_some() {
                item.active_ms = item.active_ms.saturating_sub(elapsed);
                item.active_ms > 0
            } else {
                item.waiting_ms = item.waiting_ms.saturating_sub(elapsed);
                item.waiting_ms > 0
            }
        });
    }
}

impl TankControl for HeadlessWorld {
    fn tanks(&self) -> Vec<TankSyncState> {
        self.tanks.values().map(|t| t.state.clone()).collect()
    }

    fn tank_positions(&self) -> Vec<TankPositionState> {
        self.tanks
            .values()
            .map(|t| TankPositionState {
                index: t.state.index,
                position: t.state.position,
                destined_direction: t.state.destined_direction,
            })
            .collect()
    }

    fn tank_motion(&self, tank: EntityIndex) -> Option<TankMotion> {
        self.tanks.get(&tank).map(|t| TankMotion {
            position: t.position(),
            destined_direction: t.heading(),
            speed: t.speed(),
        })
    }

    fn set_destined_direction(&mut self, tank: EntityIndex, direction: Direction) -> bool {
        match self.tanks.get_mut(&tank) {
            Some(body) => {
                body.steer(direction);
                true
            }
            None => false,
        }
    }

    fn snap_tank(&mut self, tank: EntityIndex, position: Position, direction: Direction) -> bool {
        match self.tanks.get_mut(&tank) {
            Some(body) => {
                body.place(position);
                body.steer(direction);
                true
            }
            None => false,
        }
    }

    fn fire(&mut self, tank: EntityIndex, from: Option<Position>) -> bool {
        let Some(body) = self.tanks.get_mut(&tank) else {
            return false;
        };
        if let Some(position) = from {
            body.place(position);
        }
        body.fire_cooldown_ms = i32::from(body.state.time_between_fires);

        let shell = Shell::fired(
            tank,
            body.state.team,
            body.state.position,
            body.state.facing_direction,
            body.state.ammo,
            body.state.ammo_speed,
        );
        self.shells.push(shell);
        true
    }

    fn can_fire(&self, tank: EntityIndex) -> bool {
        self.tanks
            .get(&tank)
            .is_some_and(|body| CombatSystem::can_fire(body.fire_cooldown_ms))
    }

    fn start_reload(&mut self, tank: EntityIndex) -> bool {
        match self.tanks.get_mut(&tank) {
            Some(body) => {
                body.fire_cooldown_ms = i32::from(body.state.time_between_fires);
                true
            }
            None => false,
        }
    }

    fn retain_tanks(&mut self, survivors: &[EntityIndex]) {
        self.tanks.retain(|index, _| survivors.contains(index));
    }

    fn set_tank_health(&mut self, tank: EntityIndex, health: u8) -> bool {
        match self.tanks.get_mut(&tank) {
            Some(body) => {
                body.set_health(health);
                true
            }
            None => false,
        }
    }

    fn freeze_tank(&mut self, tank: EntityIndex, freeze_ms: i16) -> bool {
        match self.tanks.get_mut(&tank) {
            Some(body) => {
                body.freeze_ms = i32::from(freeze_ms);
                true
            }
            None => false,
        }
    }

    fn spawn_tank(
        &mut self,
        ownership: Ownership,
        mut state: TankSyncState,
    ) -> Result<EntityIndex, AllocError> {
        let ownership = self.tank_ids.resolve(ownership, &self.tanks)?;
        let Some(index) = ownership.index() else {
            return Err(AllocError::Exhausted(0));
        };
        state.index = index;

        if self.tanks.contains_key(&index) {
            debug!(tank = %index, "Replacing tank with announced state");
        }
        self.tanks.insert(
            index,
            TankBody {
                state,
                ownership,
                freeze_ms: 0,
                fire_cooldown_ms: 0,
            },
        );
        Ok(index)
    }
}

impl MapControl for HeadlessWorld {
    fn map_name(&self) -> &str {
        &self.map_name
    }

    fn load_map(&mut self, mode: GameMode, name: &str) -> bool {
        let Some(layout) = self.layouts.get(name) else {
            warn!(map = name, "Unknown map");
            return false;
        };

        self.bounds = Bounds::from_grid(layout.columns, layout.rows);
        self.blocks = layout.blocks.iter().copied().collect();
        self.spawn_points = layout.spawn_points.clone();
        self.next_spawn = 0;
        self.map_name = layout.name.clone();
        self.mode = mode;
        self.tanks.clear();
        self.items.clear();
        self.shells.clear();

        info!(map = name, ?mode, "Map loaded");
        true
    }

    fn block_cells(&self) -> Vec<(Cell, Health)> {
        self.blocks.iter().map(|(c, h)| (*c, *h)).collect()
    }

    fn set_block_health(&mut self, cell: Cell, health: i16) -> bool {
        if !self.blocks.contains_key(&cell) {
            return false;
        }
        if health <= 0 {
            self.blocks.remove(&cell);
        } else {
            self.blocks.insert(cell, Health::Alive(health));
        }
        true
    }

    fn retain_blocks(&mut self, survivors: &[Cell]) {
        self.blocks.retain(|cell, health| match health {
            Health::NotTracked => true,
            Health::Alive(_) => survivors.contains(cell),
        });
    }

    fn items(&self) -> Vec<ItemSyncState> {
        self.items.values().cloned().collect()
    }

    fn spawn_item(
        &mut self,
        ownership: Ownership,
        mut state: ItemSyncState,
    ) -> Result<EntityIndex, AllocError> {
        let ownership = self.item_ids.resolve(ownership, &self.items)?;
        let Some(index) = ownership.index() else {
            return Err(AllocError::Exhausted(0));
        };
        state.index = index;
        self.items.insert(index, state);
        Ok(index)
    }

    fn activate_item(&mut self, item: EntityIndex, tank: EntityIndex) -> bool {
        if !self.tanks.contains_key(&tank) {
            return false;
        }
        match self.items.get_mut(&item) {
            Some(state) => {
                state.affected_tank = Some(tank);
                true
            }
            None => false,
        }
    }

    fn new_round(&mut self) {
        self.items.clear();
        for body in self.tanks.values_mut() {
            body.state.invulnerable_ms = NEW_ROUND_INVULNERABLE_MS;
        }
    }
}

impl MatchEvents for HeadlessWorld {
    fn player_joined(&mut self, peer: PeerId, team: Team) {
        if self.authority != Authority::Host {
            return;
        }
        if let Err(e) = self.spawn_player(peer, team) {
            warn!(peer = %peer, error = %e, "No tank for joining player");
        }
    }

    fn player_left(&mut self, peer: PeerId, team: Team) {
        if self.players.remove(&peer).is_some() {
            info!(peer = %peer, team, "Player left the match");
        }
    }
}

impl World for HeadlessWorld {
    fn advance(&mut self, elapsed_ms: u32) {
        for body in self.tanks.values_mut() {
            body.tick_timers(elapsed_ms);
        }
        self.move_tanks();
        self.move_shells();
        self.tanks.retain(|_, t| !t.is_destroyed());
        self.tick_items(elapsed_ms);
    }

    fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::ItemKind;
    use std::net::Ipv4Addr;

    fn host_world() -> HeadlessWorld {
        let mut world = HeadlessWorld::seeded(Authority::Host, 3);
        assert!(world.load_map(GameMode::Deathmatch, "arena"));
        world
    }

    fn peer(n: u8) -> PeerId {
        PeerId::new(Ipv4Addr::new(10, 0, 0, n), 4000)
    }

    #[test]
    fn joining_player_gets_a_tank() {
        let mut world = host_world();
        world.player_joined(peer(1), 7);

        let events = world.drain_events();
        let [WorldEvent::TanksCreated { new_round, spawns }] = events.as_slice() else {
            panic!("expected one TanksCreated, got {events:?}");
        };
        assert!(!new_round);
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].peer, peer(1));

        let body = world.tank(spawns[0].tank).unwrap();
        assert_eq!(body.state.team, 7);
        assert_eq!(body.position(), Position::new(40, 40));
    }

    #[test]
    fn spawn_points_avoid_occupied_slots() {
        let mut world = host_world();
        let a = world.spawn_player(peer(1), 0).unwrap();
        let b = world.spawn_player(peer(2), 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(world.tank(a).unwrap().position(), world.tank(b).unwrap().position());
    }

    #[test]
    fn client_world_does_not_spawn_players() {
        let mut world = HeadlessWorld::seeded(Authority::Client, 1);
        world.load_map(GameMode::Deathmatch, "arena");
        world.player_joined(peer(1), 0);
        assert_eq!(world.tank_count(), 0);
    }

    #[test]
    fn unknown_map_does_not_load() {
        let mut world = HeadlessWorld::seeded(Authority::Client, 1);
        assert!(!world.load_map(GameMode::TeamRounds, "nowhere"));
        assert_eq!(world.map_name(), "");
    }

    #[test]
    fn tanks_move_until_blocked_by_the_border() {
        let mut world = host_world();
        let tank = world.spawn_player(peer(1), 0).unwrap();
        world.set_destined_direction(tank, Direction::Up);

        world.advance(16);
        assert_eq!(world.tank(tank).unwrap().position(), Position::new(40, 37));

        for _ in 0..50 {
            world.advance(16);
        }
        // One more step would overlap the border row (y < 20)
        assert_eq!(world.tank(tank).unwrap().position().y, 22);
    }

    #[test]
    fn frozen_tanks_stay_put() {
        let mut world = host_world();
        let tank = world.spawn_player(peer(1), 0).unwrap();
        world.set_destined_direction(tank, Direction::Right);
        world.freeze_tank(tank, 100);

        world.advance(50);
        assert_eq!(world.tank(tank).unwrap().position(), Position::new(40, 40));
        world.advance(60);
        assert_eq!(world.tank(tank).unwrap().position(), Position::new(43, 40));
    }

    #[test]
    fn lethal_damage_reports_kill_and_removes_tank() {
        let mut world = host_world();
        let killer = world.spawn_player(peer(1), 0).unwrap();
        let victim = world.spawn_player(peer(2), 1).unwrap();
        world.drain_events();

        world.damage_tank(victim, 500, Some(killer));
        let events = world.drain_events();
        assert!(events.contains(&WorldEvent::TankHealthChanged {
            tank: victim,
            health: 0
        }));
        assert!(events.contains(&WorldEvent::Kill { killer, victim }));

        world.advance(16);
        assert!(world.tank(victim).is_none());
    }

    #[test]
    fn remote_tanks_keep_their_index() {
        let mut world = HeadlessWorld::seeded(Authority::Client, 1);
        let state = TankSyncState::spawned(EntityIndex(0), Position::new(60, 60), 2);
        let index = world
            .spawn_tank(Ownership::Remote(EntityIndex(250)), state)
            .unwrap();

        assert_eq!(index, EntityIndex(250));
        assert!(world.tank(index).unwrap().is_remote());
    }

    #[test]
    fn retain_tanks_destroys_the_rest() {
        let mut world = host_world();
        let a = world.spawn_player(peer(1), 0).unwrap();
        let b = world.spawn_player(peer(2), 1).unwrap();

        world.retain_tanks(&[b]);
        assert!(world.tank(a).is_none());
        assert!(world.tank(b).is_some());
    }

    #[test]
    fn block_health_and_retention() {
        let mut world = host_world();
        let brick = Cell::new(12, 10);
        let other = Cell::new(13, 10);

        assert!(world.set_block_health(brick, 20));
        assert_eq!(world.block(brick), Some(Health::Alive(20)));
        assert!(world.set_block_health(brick, 0));
        assert_eq!(world.block(brick), None);
        assert!(!world.set_block_health(Cell::new(5, 5), 10));

        world.retain_blocks(&[other]);
        assert_eq!(world.block(other), Some(Health::Alive(60)));
        assert_eq!(world.block(Cell::new(14, 10)), None);
        // Indestructible border survives
        assert_eq!(world.block(Cell::new(0, 0)), Some(Health::NotTracked));
    }

    #[test]
    fn new_round_clears_items_and_protects_tanks() {
        let mut world = host_world();
        let tank = world.spawn_player(peer(1), 0).unwrap();
        world
            .spawn_item(
                Ownership::Unassigned,
                ItemSyncState::spawned(EntityIndex(0), ItemKind::MaxArmor, Position::new(100, 100)),
            )
            .unwrap();
        world.advance(5_000);

        world.new_round();
        assert!(world.items().is_empty());
        assert!(world.tank(tank).unwrap().is_invulnerable());
    }

    #[test]
    fn fire_local_respects_cooldown() {
        let mut world = host_world();
        let tank = world.spawn_player(peer(1), 0).unwrap();
        world.drain_events();

        assert!(world.fire_local(tank));
        assert!(!world.fire_local(tank));
        assert_eq!(world.shells_in_flight(), 1);
        assert!(matches!(
            world.drain_events().as_slice(),
            [WorldEvent::TankFired { .. }]
        ));
    }

    #[test]
    fn reload_blocks_firing_until_the_timer_runs_out() {
        let mut world = host_world();
        let tank = world.spawn_player(peer(1), 0).unwrap();

        assert!(world.can_fire(tank));
        assert!(world.start_reload(tank));
        assert!(!world.can_fire(tank));
        assert_eq!(world.shells_in_flight(), 0);

        world.advance(999);
        assert!(!world.can_fire(tank));
        world.advance(1);
        assert!(world.can_fire(tank));

        assert!(!world.can_fire(EntityIndex(99)));
        assert!(!world.start_reload(EntityIndex(99)));
    }

    #[test]
    fn leaving_player_is_forgotten() {
        let mut world = host_world();
        world.spawn_player(peer(1), 0).unwrap();
        assert!(world.has_player(peer(1)));

        world.player_left(peer(1), 0);
        assert!(!world.has_player(peer(1)));
    }
}
