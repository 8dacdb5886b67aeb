//! Wire protocol between host and clients
//!
//! Every message starts with a one-byte tag followed by a fixed, positional
//! field sequence. See [`codec`] for the byte layout.

pub mod codec;

use crate::game::entity::{
    Cell, Direction, EntityIndex, GameMode, ItemKind, ItemSyncState, Position, TankPositionState,
    TankSyncState, Team,
};
use crate::net::PeerId;

pub use codec::{decode, encode, CodecError};

/// Delivery class a message travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Latest wins; older arrivals are dropped, nothing is resent
    UnreliableSequenced,
    /// Resent until acknowledged, delivered in send order
    ReliableOrdered,
    /// Resent until acknowledged, delivered on arrival
    ReliableUnordered,
}

impl Delivery {
    pub fn to_u8(self) -> u8 {
        match self {
            Delivery::UnreliableSequenced => 0,
            Delivery::ReliableOrdered => 1,
            Delivery::ReliableUnordered => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Delivery::UnreliableSequenced),
            1 => Some(Delivery::ReliableOrdered),
            2 => Some(Delivery::ReliableUnordered),
            _ => None,
        }
    }

    pub fn is_reliable(self) -> bool {
        !matches!(self, Delivery::UnreliableSequenced)
    }
}

/// One-byte message discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    MoveReq = 0,
    FireReq = 1,
    FireAck = 2,
    StateUpdate = 3,
    CreateTank = 4,
    TankFreezeAnn = 5,
    CreateItem = 6,
    ActiveItem = 7,
    HealthAnn = 8,
    StatAnn = 9,
    ClientInfoReq = 10,
    ClientInfoAnn = 11,
    MapInfoReq = 12,
    MapInfoAnn = 13,
    BlockSpriteInfoReq = 14,
    BlockSpriteInfoAnn = 15,
}

impl MessageTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        use MessageTag::*;
        Some(match value {
            0 => MoveReq,
            1 => FireReq,
            2 => FireAck,
            3 => StateUpdate,
            4 => CreateTank,
            5 => TankFreezeAnn,
            6 => CreateItem,
            7 => ActiveItem,
            8 => HealthAnn,
            9 => StatAnn,
            10 => ClientInfoReq,
            11 => ClientInfoAnn,
            12 => MapInfoReq,
            13 => MapInfoAnn,
            14 => BlockSpriteInfoReq,
            15 => BlockSpriteInfoAnn,
            _ => return None,
        })
    }

    /// Snapshot handshake messages. Everything else is gameplay traffic that a
    /// client only applies once ready.
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            MessageTag::ClientInfoReq
                | MessageTag::ClientInfoAnn
                | MessageTag::MapInfoReq
                | MessageTag::MapInfoAnn
                | MessageTag::BlockSpriteInfoReq
                | MessageTag::BlockSpriteInfoAnn
        )
    }
}

/// Team scores announced at the start of a team round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeamScore {
    pub first: i16,
    pub second: i16,
}

/// One tank in a CreateTank announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankSpawnEntry {
    pub client_index: u8,
    pub tank: EntityIndex,
    pub position: Position,
    pub team: Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankHealth {
    pub tank: EntityIndex,
    pub health: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHealth {
    pub cell: Cell,
    pub health: i16,
}

/// Kill or death count of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatEntry {
    pub peer: PeerId,
    pub value: i16,
}

/// Peer statistics row in MapInfoAnn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatRecord {
    pub peer: PeerId,
    pub name: String,
    pub team: Team,
    pub kills: i16,
    pub deaths: i16,
}

/// Terrain cells sharing the same remaining health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHealthGroup {
    pub health: i16,
    pub cells: Vec<Cell>,
}

/// Every message exchanged between host and clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // Client → host intents
    MoveReq {
        tank: EntityIndex,
        direction: Direction,
    },
    FireReq {
        tank: EntityIndex,
    },

    // Host → client announcements
    FireAck {
        tank: EntityIndex,
        position: Position,
    },
    StateUpdate {
        tanks: Vec<TankPositionState>,
    },
    CreateTank {
        /// Present when the announcement starts a new team round
        new_round: Option<TeamScore>,
        tanks: Vec<TankSpawnEntry>,
    },
    TankFreezeAnn {
        tank: EntityIndex,
        freeze_ms: i16,
    },
    CreateItem {
        kind: ItemKind,
        item: EntityIndex,
        position: Position,
    },
    ActiveItem {
        item: EntityIndex,
        tank: EntityIndex,
    },
    HealthAnn {
        tanks: Vec<TankHealth>,
        blocks: Vec<BlockHealth>,
    },
    StatAnn {
        killers: Vec<StatEntry>,
        victims: Vec<StatEntry>,
    },

    // Snapshot handshake
    ClientInfoReq {
        team: Team,
        name: String,
    },
    ClientInfoAnn {
        client_index: u8,
        mode: GameMode,
        map_name: String,
    },
    MapInfoReq {
        client_index: u8,
    },
    MapInfoAnn {
        tanks: Vec<TankSyncState>,
        items: Vec<ItemSyncState>,
        stats: Vec<PeerStatRecord>,
    },
    BlockSpriteInfoReq,
    BlockSpriteInfoAnn {
        groups: Vec<BlockHealthGroup>,
    },
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::MoveReq { .. } => MessageTag::MoveReq,
            Message::FireReq { .. } => MessageTag::FireReq,
            Message::FireAck { .. } => MessageTag::FireAck,
            Message::StateUpdate { .. } => MessageTag::StateUpdate,
            Message::CreateTank { .. } => MessageTag::CreateTank,
            Message::TankFreezeAnn { .. } => MessageTag::TankFreezeAnn,
            Message::CreateItem { .. } => MessageTag::CreateItem,
            Message::ActiveItem { .. } => MessageTag::ActiveItem,
            Message::HealthAnn { .. } => MessageTag::HealthAnn,
            Message::StatAnn { .. } => MessageTag::StatAnn,
            Message::ClientInfoReq { .. } => MessageTag::ClientInfoReq,
            Message::ClientInfoAnn { .. } => MessageTag::ClientInfoAnn,
            Message::MapInfoReq { .. } => MessageTag::MapInfoReq,
            Message::MapInfoAnn { .. } => MessageTag::MapInfoAnn,
            Message::BlockSpriteInfoReq => MessageTag::BlockSpriteInfoReq,
            Message::BlockSpriteInfoAnn { .. } => MessageTag::BlockSpriteInfoAnn,
        }
    }

    /// Delivery class each message is sent on.
    ///
    /// Intents, fire acks and health announcements keep their relative order;
    /// position ticks are latest-wins; one-shot events and snapshots only need
    /// to arrive.
    pub fn delivery(&self) -> Delivery {
        match self.tag() {
            MessageTag::StateUpdate => Delivery::UnreliableSequenced,
            MessageTag::MoveReq
            | MessageTag::FireReq
            | MessageTag::FireAck
            | MessageTag::HealthAnn => Delivery::ReliableOrdered,
            _ => Delivery::ReliableUnordered,
        }
    }
}
