//! Collaborator interfaces between the network sessions and gameplay
//!
//! Sessions receive a world at construction and only talk to gameplay through
//! these traits. The world owns the authoritative entity state; sessions read
//! snapshots of it and push host announcements into it.

use super::entity::{
    Cell, Direction, EntityIndex, GameMode, Health, ItemKind, ItemSyncState, Ownership, Position,
    TankMotion, TankPositionState, TankSyncState, Team,
};
use super::index::AllocError;
use crate::net::PeerId;

/// Tank-side operations
pub trait TankControl {
    /// Full snapshot of every live tank
    fn tanks(&self) -> Vec<TankSyncState>;

    /// Position tick of every live tank
    fn tank_positions(&self) -> Vec<TankPositionState>;

    fn tank_motion(&self, tank: EntityIndex) -> Option<TankMotion>;

    /// Returns `false` when the tank does not exist.
    fn set_destined_direction(&mut self, tank: EntityIndex, direction: Direction) -> bool;

    /// Overwrite position and heading with host truth.
    fn snap_tank(&mut self, tank: EntityIndex, position: Position, direction: Direction) -> bool;

    /// Fire a shot, first moving the tank to `from` when given.
    fn fire(&mut self, tank: EntityIndex, from: Option<Position>) -> bool;

    /// Reload finished. Unknown tanks never can.
    fn can_fire(&self, tank: EntityIndex) -> bool;

    /// Start the reload timer without firing, for a shot the host has yet
    /// to confirm.
    fn start_reload(&mut self, tank: EntityIndex) -> bool;

    /// Kill every tank not listed.
    fn retain_tanks(&mut self, survivors: &[EntityIndex]);

    fn set_tank_health(&mut self, tank: EntityIndex, health: u8) -> bool;

    fn freeze_tank(&mut self, tank: EntityIndex, freeze_ms: i16) -> bool;

    /// Materialize a tank. `Unassigned` ownership draws a fresh index.
    fn spawn_tank(
        &mut self,
        ownership: Ownership,
        state: TankSyncState,
    ) -> Result<EntityIndex, AllocError>;
}

/// Map, terrain and item operations
pub trait MapControl {
    fn map_name(&self) -> &str;

    /// Load the named map for `mode`. Returns `false` when it is not ready yet.
    fn load_map(&mut self, mode: GameMode, name: &str) -> bool;

    /// Every terrain cell with its health
    fn block_cells(&self) -> Vec<(Cell, Health)>;

    fn set_block_health(&mut self, cell: Cell, health: i16) -> bool;

    /// Drop every destructible cell not listed.
    fn retain_blocks(&mut self, survivors: &[Cell]);

    fn items(&self) -> Vec<ItemSyncState>;

    fn spawn_item(
        &mut self,
        ownership: Ownership,
        state: ItemSyncState,
    ) -> Result<EntityIndex, AllocError>;

    fn activate_item(&mut self, item: EntityIndex, tank: EntityIndex) -> bool;

    /// Reset items and make surviving tanks briefly invulnerable.
    fn new_round(&mut self);
}

/// Match bookkeeping driven by connections coming and going
pub trait MatchEvents {
    fn player_joined(&mut self, peer: PeerId, team: Team);

    fn player_left(&mut self, peer: PeerId, team: Team);
}

/// Tank created by the host for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankSpawn {
    pub peer: PeerId,
    pub tank: EntityIndex,
    pub position: Position,
}

/// Gameplay outcomes the host must announce to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    TanksCreated {
        new_round: bool,
        spawns: Vec<TankSpawn>,
    },
    TankFired {
        tank: EntityIndex,
        position: Position,
    },
    TankFrozen {
        tank: EntityIndex,
        freeze_ms: i16,
    },
    ItemCreated {
        kind: ItemKind,
        item: EntityIndex,
        position: Position,
    },
    ItemActivated {
        item: EntityIndex,
        tank: EntityIndex,
    },
    TankHealthChanged {
        tank: EntityIndex,
        health: u8,
    },
    BlockHealthChanged {
        cell: Cell,
        health: i16,
    },
    Kill {
        killer: EntityIndex,
        victim: EntityIndex,
    },
    RoundLost {
        team: Team,
    },
}

/// Everything a session needs from gameplay
pub trait World: TankControl + MapControl + MatchEvents {
    /// Run one simulation step.
    fn advance(&mut self, elapsed_ms: u32);

    /// Take the events produced since the last call.
    fn drain_events(&mut self) -> Vec<WorldEvent>;
}
