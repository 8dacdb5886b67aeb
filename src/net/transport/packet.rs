//! Framing the UDP transport adds on top of renet
//!
//! Control frames travel on their own reliable channel and carry the session
//! level answers netcode has no room for: approval, rejection reasons and
//! goodbye reasons. Discovery datagrams use a separate side socket, since the
//! game port belongs to netcode.
//!
//! ```text
//! Control    [0] kind: Approve | Reject reason | Goodbye reason
//! Discovery  [0] kind, magic "TNKA", version u8, Response: game port u16
//! Sequenced  sequence u16, payload (rest of message)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Application identifier carried by discovery datagrams
pub const MAGIC: [u8; 4] = *b"TNKA";

/// Bumped whenever the framing or message layout changes
pub const PROTOCOL_VERSION: u8 = 2;

/// Netcode protocol id; peers with another id cannot connect
pub const PROTOCOL_ID: u64 = u64::from_le_bytes([
    MAGIC[0],
    MAGIC[1],
    MAGIC[2],
    MAGIC[3],
    PROTOCOL_VERSION,
    0,
    0,
    0,
]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,

    #[error("frame truncated")]
    Truncated,

    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    #[error("foreign application identifier")]
    BadMagic,

    #[error("protocol version {0} is not supported")]
    VersionMismatch(u8),

    #[error("reason is not valid UTF-8")]
    InvalidUtf8,
}

// ============================================================================
// Control channel
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Host accepted the connection; data may flow
    Approve,
    /// Host turned the connection down
    Reject(String),
    /// Either side is leaving
    Goodbye(String),
}

impl Control {
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(16);
        match self {
            Control::Approve => out.put_u8(0),
            Control::Reject(reason) => {
                out.put_u8(1);
                put_reason(&mut out, reason);
            }
            Control::Goodbye(reason) => {
                out.put_u8(2);
                put_reason(&mut out, reason);
            }
        }
        out.freeze()
    }

    pub fn decode(frame: &[u8]) -> Result<Control, PacketError> {
        let mut buf = frame;
        if !buf.has_remaining() {
            return Err(PacketError::Empty);
        }
        match buf.get_u8() {
            0 => Ok(Control::Approve),
            1 => read_reason(&mut buf).map(Control::Reject),
            2 => read_reason(&mut buf).map(Control::Goodbye),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

// ============================================================================
// Discovery side socket
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    Request,
    /// `port` is the game port the answering host listens on
    Response { port: u16 },
}

impl Discovery {
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(8);
        match self {
            Discovery::Request => out.put_u8(0),
            Discovery::Response { .. } => out.put_u8(1),
        }
        out.put_slice(&MAGIC);
        out.put_u8(PROTOCOL_VERSION);
        if let Discovery::Response { port } = self {
            out.put_u16_le(*port);
        }
        out.freeze()
    }

    pub fn decode(datagram: &[u8]) -> Result<Discovery, PacketError> {
        let mut buf = datagram;
        if !buf.has_remaining() {
            return Err(PacketError::Empty);
        }
        let kind = buf.get_u8();
        check_magic(&mut buf)?;
        match kind {
            0 => Ok(Discovery::Request),
            1 => {
                if buf.remaining() < 2 {
                    return Err(PacketError::Truncated);
                }
                Ok(Discovery::Response {
                    port: buf.get_u16_le(),
                })
            }
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

/// Side port answering discovery requests for a host on `game_port`.
pub fn discovery_port(game_port: u16) -> Option<u16> {
    game_port.checked_add(1)
}

// ============================================================================
// Latest-wins channel
// ============================================================================

pub fn frame_sequenced(sequence: u16, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 2);
    out.put_u16_le(sequence);
    out.put_slice(payload);
    out.freeze()
}

pub fn split_sequenced(mut message: Bytes) -> Result<(u16, Bytes), PacketError> {
    if message.len() < 2 {
        return Err(PacketError::Truncated);
    }
    let sequence = message.get_u16_le();
    Ok((sequence, message))
}

/// Drops unreliable messages that are not newer than the newest seen.
#[derive(Debug, Default)]
pub struct LatestWins {
    latest: Option<u16>,
}

impl LatestWins {
    pub fn accept(&mut self, sequence: u16) -> bool {
        let newer = self
            .latest
            .map_or(true, |latest| sequence_greater_than(sequence, latest));
        if newer {
            self.latest = Some(sequence);
        }
        newer
    }
}

/// `true` when `s1` comes after `s2`, allowing for wrap-around.
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

fn put_reason(out: &mut BytesMut, reason: &str) {
    // Reasons are short human-readable strings; clip at the length byte
    let mut end = reason.len().min(u8::MAX as usize);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    out.put_u8(end as u8);
    out.put_slice(&reason.as_bytes()[..end]);
}

fn check_magic(buf: &mut &[u8]) -> Result<(), PacketError> {
    if buf.remaining() < MAGIC.len() + 1 {
        return Err(PacketError::Truncated);
    }
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(PacketError::BadMagic);
    }
    match buf.get_u8() {
        PROTOCOL_VERSION => Ok(()),
        other => Err(PacketError::VersionMismatch(other)),
    }
}

fn read_reason(buf: &mut &[u8]) -> Result<String, PacketError> {
    if !buf.has_remaining() {
        return Err(PacketError::Truncated);
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(PacketError::Truncated);
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| PacketError::InvalidUtf8)
}
