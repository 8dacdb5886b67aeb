//! Networked sessions: transport, host side and client side

pub mod client;
pub mod host;
pub mod peer;
pub mod transport;

pub use client::{ClientSession, ConnectionState};
pub use host::{ClientRecord, HostSession, HostStatus};
pub use peer::PeerId;

use crate::game::entity::{Cell, EntityIndex};
use crate::game::index::AllocError;
use crate::protocol::{CodecError, MessageTag};

/// Why an inbound message was not applied.
///
/// None of these are fatal: the session logs the error and drops the message.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown tank {0}")]
    UnknownTank(EntityIndex),

    #[error("unknown item {0}")]
    UnknownItem(EntityIndex),

    #[error("unknown block at ({}, {})", .0.x, .0.y)]
    UnknownBlock(Cell),

    #[error("message from unknown peer {0}")]
    UnknownPeer(PeerId),

    #[error("peer {peer} does not own tank {tank}")]
    NotOwner { peer: PeerId, tank: EntityIndex },

    #[error("unexpected {0:?} message")]
    UnexpectedMessage(MessageTag),

    #[error("rate limited")]
    RateLimited,

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
