//! Synchronized entity state shared by host, client and wire codec

use std::fmt;

use serde::Serialize;

/// Highest index the allocator hands out for a tank or an item.
pub const MAX_ENTITY_INDEX: u8 = 200;

/// Wire byte used when an item has no affected tank.
pub const NO_TANK: u8 = 0xFF;

/// Minimum time between two fires of the same tank (milliseconds)
pub const MIN_TIME_BETWEEN_FIRES_MS: i32 = 300;

/// Default waiting and active timers of a freshly spawned item (milliseconds)
pub const ITEM_WAITING_MS: i16 = 10_000;
pub const ITEM_ACTIVE_MS: i16 = 10_000;

/// Team identifier. In deathmatch every player is its own team.
pub type Team = u8;

/// Small per-kind identifier of a live tank or item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityIndex(pub u8);

impl EntityIndex {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for EntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pixel position in map space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

impl Position {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Terrain grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Cell {
    pub x: u8,
    pub y: u8,
}

impl Cell {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

/// Heading of a tank. `None` means standing still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    None,
}

impl Direction {
    pub fn to_u8(self) -> u8 {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
            Direction::None => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::Up),
            1 => Some(Direction::Down),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            4 => Some(Direction::None),
            _ => None,
        }
    }

    /// Unit step along this heading (screen coordinates, y grows downwards)
    pub fn step(self) -> (i16, i16) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::None => (0, 0),
        }
    }
}

/// Rule set the host is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Free for all; each player is its own team
    Deathmatch,
    /// Two teams playing rounds
    TeamRounds,
}

impl GameMode {
    pub fn to_u8(self) -> u8 {
        match self {
            GameMode::Deathmatch => 1,
            GameMode::TeamRounds => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(GameMode::Deathmatch),
            2 => Some(GameMode::TeamRounds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AmmoKind {
    #[default]
    Basic,
    Rocket,
    FireBall,
    Shuriken,
}

impl AmmoKind {
    pub fn to_u8(self) -> u8 {
        match self {
            AmmoKind::Basic => 0,
            AmmoKind::Rocket => 1,
            AmmoKind::FireBall => 2,
            AmmoKind::Shuriken => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AmmoKind::Basic),
            1 => Some(AmmoKind::Rocket),
            2 => Some(AmmoKind::FireBall),
            3 => Some(AmmoKind::Shuriken),
            _ => None,
        }
    }
}

/// Pick-up kinds. The wire value is the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemKind {
    MaxTankSpeed,
    IncreaseTankSpeed,
    MinTankSpeed,
    MinimizeEnemiesTanksSpeed,
    MaxAmmoSpeed,
    IncreaseAmmoSpeed,
    MinAmmoSpeed,
    MinimizeEnemiesTanksAmmoSpeed,
    MaxArmor,
    IncreaseArmor,
    MinArmor,
    MinimizeEnemiesTanksArmor,
    MinTimeBetweenFires,
    DecreaseTimeBetweenFires,
    MaxTimeBetweenFires,
    MaximizeEnemiesTimeBetweenFires,
    Add50Health,
    MakeTankInvulnerable,
    ChangeAmmoToRocket,
    ChangeAmmoToFireBall,
    ChangeAmmoToShuriken,
    FreezeAllEnemiesTanks,
    Random,
}

impl ItemKind {
    const ALL: [ItemKind; 23] = [
        ItemKind::MaxTankSpeed,
        ItemKind::IncreaseTankSpeed,
        ItemKind::MinTankSpeed,
        ItemKind::MinimizeEnemiesTanksSpeed,
        ItemKind::MaxAmmoSpeed,
        ItemKind::IncreaseAmmoSpeed,
        ItemKind::MinAmmoSpeed,
        ItemKind::MinimizeEnemiesTanksAmmoSpeed,
        ItemKind::MaxArmor,
        ItemKind::IncreaseArmor,
        ItemKind::MinArmor,
        ItemKind::MinimizeEnemiesTanksArmor,
        ItemKind::MinTimeBetweenFires,
        ItemKind::DecreaseTimeBetweenFires,
        ItemKind::MaxTimeBetweenFires,
        ItemKind::MaximizeEnemiesTimeBetweenFires,
        ItemKind::Add50Health,
        ItemKind::MakeTankInvulnerable,
        ItemKind::ChangeAmmoToRocket,
        ItemKind::ChangeAmmoToFireBall,
        ItemKind::ChangeAmmoToShuriken,
        ItemKind::FreezeAllEnemiesTanks,
        ItemKind::Random,
    ];

    pub fn to_u8(self) -> u8 {
        // ALL mirrors the declaration order
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

/// Remaining health of a terrain cell. Indestructible cells are not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Health {
    Alive(i16),
    NotTracked,
}

impl Health {
    pub fn value(self) -> Option<i16> {
        match self {
            Health::Alive(v) => Some(v),
            Health::NotTracked => None,
        }
    }
}

/// Who drives an entity, and under which index.
///
/// Entities created on this peer are `Local`; entities announced by the
/// remote peer are `Remote` and keep the index they were announced with.
/// `Unassigned` asks the allocator for a fresh index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Local(EntityIndex),
    Remote(EntityIndex),
    Unassigned,
}

impl Ownership {
    pub fn index(self) -> Option<EntityIndex> {
        match self {
            Ownership::Local(i) | Ownership::Remote(i) => Some(i),
            Ownership::Unassigned => None,
        }
    }

    pub fn is_remote(self) -> bool {
        matches!(self, Ownership::Remote(_))
    }
}

/// Full snapshot of one tank, as sent in MapInfoAnn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TankSyncState {
    pub index: EntityIndex,
    pub position: Position,
    pub team: Team,
    /// Direction the tank is heading to
    pub destined_direction: Direction,
    /// Direction the gun is facing
    pub facing_direction: Direction,
    /// Pixels moved per tick
    pub speed: u8,
    pub ammo_speed: u8,
    pub armor: u8,
    /// Milliseconds between two fires
    pub time_between_fires: i16,
    pub health: u8,
    /// Remaining invulnerability (milliseconds)
    pub invulnerable_ms: i16,
    pub ammo: AmmoKind,
}

impl TankSyncState {
    /// Default user tank stats at `position`
    pub fn spawned(index: EntityIndex, position: Position, team: Team) -> Self {
        Self {
            index,
            position,
            team,
            destined_direction: Direction::None,
            facing_direction: Direction::Up,
            speed: 3,
            ammo_speed: 12,
            armor: 5,
            time_between_fires: 1_000,
            health: 100,
            invulnerable_ms: 3_000,
            ammo: AmmoKind::Basic,
        }
    }
}

/// Lightweight per-tick position state, as sent in StateUpdate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankPositionState {
    pub index: EntityIndex,
    pub position: Position,
    pub destined_direction: Direction,
}

/// What the reconciliation policy needs to know about a local tank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankMotion {
    pub position: Position,
    pub destined_direction: Direction,
    pub speed: u8,
}

/// Full snapshot of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSyncState {
    pub index: EntityIndex,
    pub kind: ItemKind,
    pub position: Position,
    pub waiting_ms: i16,
    pub active_ms: i16,
    pub affected_tank: Option<EntityIndex>,
    /// Value of the modified tank stat before the item took effect
    pub saved_value: i32,
}

impl ItemSyncState {
    pub fn spawned(index: EntityIndex, kind: ItemKind, position: Position) -> Self {
        Self {
            index,
            kind,
            position,
            waiting_ms: ITEM_WAITING_MS,
            active_ms: ITEM_ACTIVE_MS,
            affected_tank: None,
            saved_value: 0,
        }
    }
}
