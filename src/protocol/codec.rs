//! Binary encoding/decoding of [`Message`]s.
//!
//! One message per buffer. All integers are little-endian.
//!
//! ```text
//! [0]  : tag (MessageTag as u8)
//! [1..]: body, positional per tag
//!
//! position  : x i16, y i16
//! cell      : x u8, y u8
//! address   : ipv4 octets [u8; 4], port u16
//! string    : len u8, UTF-8 bytes
//! list<T>   : count u8, T * count
//!
//! MoveReq            tank u8, direction u8
//! FireReq            tank u8
//! FireAck            tank u8, position
//! StateUpdate        list<tank u8, position, destined direction u8>
//! CreateTank         new_round u8 (0/1), [score i16, i16 if new_round],
//!                    list<client index u8, tank u8, position, team u8>
//! TankFreezeAnn      tank u8, freeze_ms i16
//! CreateItem         kind u8, item u8, position
//! ActiveItem         item u8, tank u8
//! HealthAnn          list<tank u8, health u8>, list<cell, health i16>
//! StatAnn            list<address, kills i16>, list<address, deaths i16>
//! ClientInfoReq      team u8, name string
//! ClientInfoAnn      client index u8, mode u8, map string
//! MapInfoReq         client index u8
//! MapInfoAnn         list<tank>, list<item>, list<stat>
//!   tank             index u8, position, team u8, destined dir u8,
//!                    facing dir u8, speed u8, ammo speed u8, armor u8,
//!                    time between fires i16, health u8, invulnerable i16,
//!                    ammo u8
//!   item             index u8, kind u8, position, waiting i16, active i16,
//!                    affected tank u8 (0xFF = none), saved value i32
//!   stat             address, name string, team u8, kills i16, deaths i16
//! BlockSpriteInfoReq (empty)
//! BlockSpriteInfoAnn count u8, per group: health i16, cell count i16, cells
//! ```

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    BlockHealth, BlockHealthGroup, Message, MessageTag, PeerStatRecord, StatEntry, TankHealth,
    TankSpawnEntry, TeamScore,
};
use crate::game::entity::{
    AmmoKind, Cell, Direction, EntityIndex, GameMode, ItemKind, ItemSyncState, Position,
    TankPositionState, TankSyncState, NO_TANK,
};
use crate::net::PeerId;

/// Errors that can arise when encoding/decoding a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("buffer truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("invalid value {value} for {field}")]
    InvalidField { field: &'static str, value: i64 },

    #[error("{field} is too long to encode ({len})")]
    TooLong { field: &'static str, len: usize },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a single message into a fresh buffer.
pub fn encode(msg: &Message) -> Result<Bytes, CodecError> {
    let mut out = BytesMut::with_capacity(32);
    encode_into(msg, &mut out)?;
    Ok(out.freeze())
}

/// Append a single encoded message to `out`.
pub fn encode_into(msg: &Message, out: &mut BytesMut) -> Result<(), CodecError> {
    out.put_u8(msg.tag() as u8);

    match msg {
        Message::MoveReq { tank, direction } => {
            out.put_u8(tank.0);
            out.put_u8(direction.to_u8());
        }
        Message::FireReq { tank } => out.put_u8(tank.0),
        Message::FireAck { tank, position } => {
            out.put_u8(tank.0);
            put_position(out, *position);
        }
        Message::StateUpdate { tanks } => {
            put_count(out, "state update tanks", tanks.len())?;
            for t in tanks {
                out.put_u8(t.index.0);
                put_position(out, t.position);
                out.put_u8(t.destined_direction.to_u8());
            }
        }
        Message::CreateTank { new_round, tanks } => {
            match new_round {
                Some(score) => {
                    out.put_u8(1);
                    out.put_i16_le(score.first);
                    out.put_i16_le(score.second);
                }
                None => out.put_u8(0),
            }
            put_count(out, "created tanks", tanks.len())?;
            for t in tanks {
                out.put_u8(t.client_index);
                out.put_u8(t.tank.0);
                put_position(out, t.position);
                out.put_u8(t.team);
            }
        }
        Message::TankFreezeAnn { tank, freeze_ms } => {
            out.put_u8(tank.0);
            out.put_i16_le(*freeze_ms);
        }
        Message::CreateItem {
            kind,
            item,
            position,
        } => {
            out.put_u8(kind.to_u8());
            out.put_u8(item.0);
            put_position(out, *position);
        }
        Message::ActiveItem { item, tank } => {
            out.put_u8(item.0);
            out.put_u8(tank.0);
        }
        Message::HealthAnn { tanks, blocks } => {
            put_count(out, "tank health entries", tanks.len())?;
            for t in tanks {
                out.put_u8(t.tank.0);
                out.put_u8(t.health);
            }
            put_count(out, "block health entries", blocks.len())?;
            for b in blocks {
                put_cell(out, b.cell);
                out.put_i16_le(b.health);
            }
        }
        Message::StatAnn { killers, victims } => {
            put_stat_entries(out, "killers", killers)?;
            put_stat_entries(out, "victims", victims)?;
        }
        Message::ClientInfoReq { team, name } => {
            out.put_u8(*team);
            put_string(out, "player name", name)?;
        }
        Message::ClientInfoAnn {
            client_index,
            mode,
            map_name,
        } => {
            out.put_u8(*client_index);
            out.put_u8(mode.to_u8());
            put_string(out, "map name", map_name)?;
        }
        Message::MapInfoReq { client_index } => out.put_u8(*client_index),
        Message::MapInfoAnn {
            tanks,
            items,
            stats,
        } => {
            put_count(out, "snapshot tanks", tanks.len())?;
            for t in tanks {
                put_tank(out, t);
            }
            put_count(out, "snapshot items", items.len())?;
            for i in items {
                put_item(out, i);
            }
            put_count(out, "snapshot stats", stats.len())?;
            for s in stats {
                put_peer(out, s.peer);
                put_string(out, "player name", &s.name)?;
                out.put_u8(s.team);
                out.put_i16_le(s.kills);
                out.put_i16_le(s.deaths);
            }
        }
        Message::BlockSpriteInfoReq => {}
        Message::BlockSpriteInfoAnn { groups } => {
            put_count(out, "block groups", groups.len())?;
            for g in groups {
                out.put_i16_le(g.health);
                let cells = i16::try_from(g.cells.len()).map_err(|_| CodecError::TooLong {
                    field: "block group cells",
                    len: g.cells.len(),
                })?;
                out.put_i16_le(cells);
                for c in &g.cells {
                    put_cell(out, *c);
                }
            }
        }
    }

    Ok(())
}

fn put_count(out: &mut BytesMut, field: &'static str, len: usize) -> Result<(), CodecError> {
    let count = u8::try_from(len).map_err(|_| CodecError::TooLong { field, len })?;
    out.put_u8(count);
    Ok(())
}

fn put_string(out: &mut BytesMut, field: &'static str, s: &str) -> Result<(), CodecError> {
    put_count(out, field, s.len())?;
    out.put_slice(s.as_bytes());
    Ok(())
}

fn put_position(out: &mut BytesMut, p: Position) {
    out.put_i16_le(p.x);
    out.put_i16_le(p.y);
}

fn put_cell(out: &mut BytesMut, c: Cell) {
    out.put_u8(c.x);
    out.put_u8(c.y);
}

fn put_peer(out: &mut BytesMut, peer: PeerId) {
    out.put_slice(&peer.0.ip().octets());
    out.put_u16_le(peer.0.port());
}

fn put_stat_entries(
    out: &mut BytesMut,
    field: &'static str,
    entries: &[StatEntry],
) -> Result<(), CodecError> {
    put_count(out, field, entries.len())?;
    for e in entries {
        put_peer(out, e.peer);
        out.put_i16_le(e.value);
    }
    Ok(())
}

fn put_tank(out: &mut BytesMut, t: &TankSyncState) {
    out.put_u8(t.index.0);
    put_position(out, t.position);
    out.put_u8(t.team);
    out.put_u8(t.destined_direction.to_u8());
    out.put_u8(t.facing_direction.to_u8());
    out.put_u8(t.speed);
    out.put_u8(t.ammo_speed);
    out.put_u8(t.armor);
    out.put_i16_le(t.time_between_fires);
    out.put_u8(t.health);
    out.put_i16_le(t.invulnerable_ms);
    out.put_u8(t.ammo.to_u8());
}

fn put_item(out: &mut BytesMut, i: &ItemSyncState) {
    out.put_u8(i.index.0);
    out.put_u8(i.kind.to_u8());
    put_position(out, i.position);
    out.put_i16_le(i.waiting_ms);
    out.put_i16_le(i.active_ms);
    out.put_u8(i.affected_tank.map_or(NO_TANK, |t| t.0));
    out.put_i32_le(i.saved_value);
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a single message. The buffer must hold exactly one message.
pub fn decode(buf: &[u8]) -> Result<Message, CodecError> {
    let mut r = Reader { buf };
    let raw_tag = r.u8()?;
    let tag = MessageTag::from_u8(raw_tag).ok_or(CodecError::UnknownTag(raw_tag))?;

    let msg = match tag {
        MessageTag::MoveReq => Message::MoveReq {
            tank: r.index()?,
            direction: r.direction("direction")?,
        },
        MessageTag::FireReq => Message::FireReq { tank: r.index()? },
        MessageTag::FireAck => Message::FireAck {
            tank: r.index()?,
            position: r.position()?,
        },
        MessageTag::StateUpdate => {
            let count = r.u8()?;
            let mut tanks = Vec::with_capacity(count as usize);
            for _ in 0..count {
                tanks.push(TankPositionState {
                    index: r.index()?,
                    position: r.position()?,
                    destined_direction: r.direction("destined direction")?,
                });
            }
            Message::StateUpdate { tanks }
        }
        MessageTag::CreateTank => {
            let new_round = if r.bool("new round")? {
                Some(TeamScore {
                    first: r.i16()?,
                    second: r.i16()?,
                })
            } else {
                None
            };
            let count = r.u8()?;
            let mut tanks = Vec::with_capacity(count as usize);
            for _ in 0..count {
                tanks.push(TankSpawnEntry {
                    client_index: r.u8()?,
                    tank: r.index()?,
                    position: r.position()?,
                    team: r.u8()?,
                });
            }
            Message::CreateTank { new_round, tanks }
        }
        MessageTag::TankFreezeAnn => Message::TankFreezeAnn {
            tank: r.index()?,
            freeze_ms: r.i16()?,
        },
        MessageTag::CreateItem => Message::CreateItem {
            kind: r.item_kind()?,
            item: r.index()?,
            position: r.position()?,
        },
        MessageTag::ActiveItem => Message::ActiveItem {
            item: r.index()?,
            tank: r.index()?,
        },
        MessageTag::HealthAnn => {
            let count = r.u8()?;
            let mut tanks = Vec::with_capacity(count as usize);
            for _ in 0..count {
                tanks.push(TankHealth {
                    tank: r.index()?,
                    health: r.u8()?,
                });
            }
            let count = r.u8()?;
            let mut blocks = Vec::with_capacity(count as usize);
            for _ in 0..count {
                blocks.push(BlockHealth {
                    cell: r.cell()?,
                    health: r.i16()?,
                });
            }
            Message::HealthAnn { tanks, blocks }
        }
        MessageTag::StatAnn => Message::StatAnn {
            killers: r.stat_entries()?,
            victims: r.stat_entries()?,
        },
        MessageTag::ClientInfoReq => Message::ClientInfoReq {
            team: r.u8()?,
            name: r.string()?,
        },
        MessageTag::ClientInfoAnn => {
            let client_index = r.u8()?;
            let raw_mode = r.u8()?;
            let mode = GameMode::from_u8(raw_mode).ok_or(CodecError::InvalidField {
                field: "game mode",
                value: raw_mode.into(),
            })?;
            Message::ClientInfoAnn {
                client_index,
                mode,
                map_name: r.string()?,
            }
        }
        MessageTag::MapInfoReq => Message::MapInfoReq {
            client_index: r.u8()?,
        },
        MessageTag::MapInfoAnn => {
            let count = r.u8()?;
            let mut tanks = Vec::with_capacity(count as usize);
            for _ in 0..count {
                tanks.push(r.tank()?);
            }
            let count = r.u8()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(r.item()?);
            }
            let count = r.u8()?;
            let mut stats = Vec::with_capacity(count as usize);
            for _ in 0..count {
                stats.push(PeerStatRecord {
                    peer: r.peer()?,
                    name: r.string()?,
                    team: r.u8()?,
                    kills: r.i16()?,
                    deaths: r.i16()?,
                });
            }
            Message::MapInfoAnn {
                tanks,
                items,
                stats,
            }
        }
        MessageTag::BlockSpriteInfoReq => Message::BlockSpriteInfoReq,
        MessageTag::BlockSpriteInfoAnn => {
            let count = r.u8()?;
            let mut groups = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let health = r.i16()?;
                let raw_cells = r.i16()?;
                let cells_len = usize::try_from(raw_cells).map_err(|_| CodecError::InvalidField {
                    field: "block group cell count",
                    value: raw_cells.into(),
                })?;
                // Each cell is two bytes; refuse counts the buffer cannot hold
                r.need(cells_len * 2)?;
                let mut cells = Vec::with_capacity(cells_len);
                for _ in 0..cells_len {
                    cells.push(r.cell()?);
                }
                groups.push(BlockHealthGroup { health, cells });
            }
            Message::BlockSpriteInfoAnn { groups }
        }
    };

    if !r.buf.is_empty() {
        return Err(CodecError::TrailingBytes(r.buf.len()));
    }
    Ok(msg)
}

/// Bounds-checked little-endian reader over a borrowed buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn i16(&mut self) -> Result<i16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(CodecError::InvalidField {
                field,
                value: v.into(),
            }),
        }
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u8()? as usize;
        self.need(len)?;
        let (raw, rest) = self.buf.split_at(len);
        self.buf = rest;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    fn index(&mut self) -> Result<EntityIndex, CodecError> {
        self.u8().map(EntityIndex)
    }

    fn position(&mut self) -> Result<Position, CodecError> {
        Ok(Position::new(self.i16()?, self.i16()?))
    }

    fn cell(&mut self) -> Result<Cell, CodecError> {
        Ok(Cell::new(self.u8()?, self.u8()?))
    }

    fn direction(&mut self, field: &'static str) -> Result<Direction, CodecError> {
        let raw = self.u8()?;
        Direction::from_u8(raw).ok_or(CodecError::InvalidField {
            field,
            value: raw.into(),
        })
    }

    fn item_kind(&mut self) -> Result<ItemKind, CodecError> {
        let raw = self.u8()?;
        ItemKind::from_u8(raw).ok_or(CodecError::InvalidField {
            field: "item kind",
            value: raw.into(),
        })
    }

    fn peer(&mut self) -> Result<PeerId, CodecError> {
        self.need(4)?;
        let ip = Ipv4Addr::new(
            self.buf.get_u8(),
            self.buf.get_u8(),
            self.buf.get_u8(),
            self.buf.get_u8(),
        );
        Ok(PeerId::new(ip, self.u16()?))
    }

    fn stat_entries(&mut self) -> Result<Vec<StatEntry>, CodecError> {
        let count = self.u8()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(StatEntry {
                peer: self.peer()?,
                value: self.i16()?,
            });
        }
        Ok(entries)
    }

    fn tank(&mut self) -> Result<TankSyncState, CodecError> {
        Ok(TankSyncState {
            index: self.index()?,
            position: self.position()?,
            team: self.u8()?,
            destined_direction: self.direction("destined direction")?,
            facing_direction: self.direction("facing direction")?,
            speed: self.u8()?,
            ammo_speed: self.u8()?,
            armor: self.u8()?,
            time_between_fires: self.i16()?,
            health: self.u8()?,
            invulnerable_ms: self.i16()?,
            ammo: {
                let raw = self.u8()?;
                AmmoKind::from_u8(raw).ok_or(CodecError::InvalidField {
                    field: "ammo kind",
                    value: raw.into(),
                })?
            },
        })
    }

    fn item(&mut self) -> Result<ItemSyncState, CodecError> {
        Ok(ItemSyncState {
            index: self.index()?,
            kind: self.item_kind()?,
            position: self.position()?,
            waiting_ms: self.i16()?,
            active_ms: self.i16()?,
            affected_tank: match self.u8()? {
                NO_TANK => None,
                t => Some(EntityIndex(t)),
            },
            saved_value: self.i32()?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(a: u8, port: u16) -> PeerId {
        PeerId::new(Ipv4Addr::new(192, 168, 1, a), port)
    }

    #[test]
    fn move_req_layout() {
        let msg = Message::MoveReq {
            tank: EntityIndex(7),
            direction: Direction::Left,
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[0, 7, 2]);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn fire_ack_layout_is_little_endian() {
        let msg = Message::FireAck {
            tank: EntityIndex(3),
            position: Position::new(0x0102, -2),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[2, 3, 0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn state_update_layout() {
        let msg = Message::StateUpdate {
            tanks: vec![TankPositionState {
                index: EntityIndex(5),
                position: Position::new(10, 20),
                destined_direction: Direction::Down,
            }],
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[3, 1, 5, 10, 0, 20, 0, 1]);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn create_tank_carries_score_only_on_new_round() {
        let entry = TankSpawnEntry {
            client_index: 9,
            tank: EntityIndex(4),
            position: Position::new(1, 2),
            team: 1,
        };

        let plain = encode(&Message::CreateTank {
            new_round: None,
            tanks: vec![entry],
        })
        .unwrap();
        assert_eq!(&plain[..], &[4, 0, 1, 9, 4, 1, 0, 2, 0, 1]);

        let round = Message::CreateTank {
            new_round: Some(TeamScore { first: 2, second: 3 }),
            tanks: vec![entry],
        };
        let bytes = encode(&round).unwrap();
        assert_eq!(&bytes[..6], &[4, 1, 2, 0, 3, 0]);
        assert_eq!(decode(&bytes).unwrap(), round);
    }

    #[test]
    fn health_ann_layout() {
        let msg = Message::HealthAnn {
            tanks: vec![TankHealth {
                tank: EntityIndex(5),
                health: 40,
            }],
            blocks: vec![BlockHealth {
                cell: Cell::new(3, 4),
                health: 256,
            }],
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[8, 1, 5, 40, 1, 3, 4, 0, 1]);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn stat_ann_encodes_addresses() {
        let msg = Message::StatAnn {
            killers: vec![StatEntry {
                peer: peer(2, 27388),
                value: 4,
            }],
            victims: vec![],
        };
        let bytes = encode(&msg).unwrap();
        let port = 27388u16.to_le_bytes();
        assert_eq!(&bytes[..], &[9, 1, 192, 168, 1, 2, port[0], port[1], 4, 0, 0]);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn client_info_strings_are_length_prefixed() {
        let msg = Message::ClientInfoAnn {
            client_index: 42,
            mode: GameMode::TeamRounds,
            map_name: "dune".into(),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[11, 42, 2, 4, b'd', b'u', b'n', b'e']);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn map_info_snapshot_decodes_back() {
        let mut tank = TankSyncState::spawned(EntityIndex(12), Position::new(64, 96), 1);
        tank.ammo = AmmoKind::Rocket;
        let mut item = ItemSyncState::spawned(EntityIndex(3), ItemKind::Add50Health, Position::new(5, 6));
        item.affected_tank = Some(EntityIndex(12));
        item.saved_value = -70_000;
        let msg = Message::MapInfoAnn {
            tanks: vec![tank],
            items: vec![item, ItemSyncState::spawned(EntityIndex(4), ItemKind::Random, Position::default())],
            stats: vec![PeerStatRecord {
                peer: PeerId::local(),
                name: "host".into(),
                team: 0,
                kills: 3,
                deaths: -1,
            }],
        };

        let bytes = encode(&msg).unwrap();
        // tag + 3 counts + tank 17 + items 2 * 15 + stat (6 + 5 + 5)
        assert_eq!(bytes.len(), 1 + 3 + 17 + 30 + 16);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn block_sprite_groups_use_wide_cell_count() {
        let msg = Message::BlockSpriteInfoAnn {
            groups: vec![BlockHealthGroup {
                health: 2,
                cells: vec![Cell::new(1, 1), Cell::new(2, 1)],
            }],
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[15, 1, 2, 0, 2, 0, 1, 1, 2, 1]);
        assert_eq!(decode(&bytes).unwrap(), msg);
        assert_eq!(&encode(&Message::BlockSpriteInfoReq).unwrap()[..], &[14]);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        assert_eq!(
            decode(&[]),
            Err(CodecError::Truncated {
                needed: 1,
                remaining: 0
            })
        );
        assert_eq!(
            decode(&[2, 3, 0x02]),
            Err(CodecError::Truncated {
                needed: 2,
                remaining: 1
            })
        );
        // Cell count larger than the payload
        assert!(matches!(
            decode(&[15, 1, 2, 0, 100, 0, 1, 1]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(decode(&[16]), Err(CodecError::UnknownTag(16)));
        assert_eq!(decode(&[0xFF, 1, 2]), Err(CodecError::UnknownTag(0xFF)));
    }

    #[test]
    fn invalid_enum_values_are_rejected() {
        assert_eq!(
            decode(&[0, 1, 9]),
            Err(CodecError::InvalidField {
                field: "direction",
                value: 9
            })
        );
        assert!(matches!(
            decode(&[4, 7, 0]),
            Err(CodecError::InvalidField { field: "new round", .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert_eq!(decode(&[1, 4, 0]), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn oversized_lists_fail_to_encode() {
        let tanks = (0..256)
            .map(|i| TankPositionState {
                index: EntityIndex((i % 200) as u8),
                position: Position::default(),
                destined_direction: Direction::None,
            })
            .collect();
        assert_eq!(
            encode(&Message::StateUpdate { tanks }),
            Err(CodecError::TooLong {
                field: "state update tanks",
                len: 256
            })
        );
    }

    #[test]
    fn invalid_utf8_name_is_rejected() {
        assert_eq!(decode(&[10, 0, 2, 0xC3, 0x28]), Err(CodecError::InvalidUtf8));
    }
}
