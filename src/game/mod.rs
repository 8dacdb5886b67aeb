//! Game-side state shared by the network sessions

pub mod combat;
pub mod entity;
pub mod headless;
pub mod index;
pub mod physics;
pub mod reconcile;
pub mod stats;
pub mod world;

pub use entity::{
    Cell, Direction, EntityIndex, GameMode, Health, ItemKind, ItemSyncState, Ownership, Position,
    TankPositionState, TankSyncState, Team,
};
pub use headless::{Authority, HeadlessWorld, MapLayout};
pub use index::{AllocError, IndexAllocator};
pub use reconcile::needs_correction;
pub use stats::{NetStats, PeerStats};
pub use world::{MapControl, MatchEvents, TankControl, TankSpawn, World, WorldEvent};
