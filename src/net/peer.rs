//! Peer identity

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::Serialize;

/// Network endpoint identifying one connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PeerId(pub SocketAddrV4);

impl PeerId {
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self(SocketAddrV4::new(ip, port))
    }

    /// The host's own player. Port 0 never belongs to a remote peer.
    pub const fn local() -> Self {
        Self::new(Ipv4Addr::LOCALHOST, 0)
    }

    pub fn is_local(&self) -> bool {
        *self == Self::local()
    }

    pub fn addr(&self) -> SocketAddrV4 {
        self.0
    }

    /// IPv4 endpoints only; the transport binds IPv4 sockets.
    pub fn from_socket_addr(addr: SocketAddr) -> Option<Self> {
        match addr {
            SocketAddr::V4(v4) => Some(Self(v4)),
            SocketAddr::V6(v6) => v6
                .ip()
                .to_ipv4_mapped()
                .map(|ip| Self::new(ip, v6.port())),
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddrV4> for PeerId {
    fn from(addr: SocketAddrV4) -> Self {
        Self(addr)
    }
}
