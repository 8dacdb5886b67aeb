//! Message transport underneath the sessions
//!
//! Sessions never touch sockets. They poll [`TransportEvent`]s and hand
//! encoded payloads back with a [`Delivery`] class; the transport owns
//! connection management and delivery guarantees. Sessions call `flush`
//! once per update to put what they queued on the wire.

pub mod channel;
pub mod memory;
pub mod packet;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use super::PeerId;
use crate::protocol::Delivery;

pub use memory::{MemoryClient, MemoryHost, MemoryNetwork};
pub use udp::{UdpClient, UdpHost, UdpSettings};

/// Reason attached to [`TransportEvent::Disconnected`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote side said goodbye
    Quit(String),
    /// Nothing heard from the remote side for too long
    TimedOut,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Quit(reason) => f.write_str(reason),
            DisconnectReason::TimedOut => f.write_str("Connection timed out"),
        }
    }
}

/// What the transport reports to its session.
///
/// On a client, `peer` is always the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote peer asks to join; answer with approve or reject
    ConnectionRequested { peer: PeerId },
    Connected { peer: PeerId },
    Disconnected { peer: PeerId, reason: DisconnectReason },
    Rejected { peer: PeerId, reason: String },
    /// Answer to a discovery request
    HostDiscovered { peer: PeerId },
    Data { peer: PeerId, payload: Bytes },
}

/// Resolves once the disconnect notifications were handed to the socket.
///
/// Delivery to the remote side is never confirmed.
#[derive(Debug)]
pub struct ShutdownFlush(oneshot::Receiver<()>);

impl ShutdownFlush {
    pub fn new() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// Already flushed
    pub fn done() -> Self {
        let (tx, flush) = Self::new();
        let _ = tx.send(());
        flush
    }

    /// Wait at most `grace` for the flush. Returns `false` on timeout or when
    /// the transport went away without flushing.
    pub async fn wait(self, grace: Duration) -> bool {
        matches!(tokio::time::timeout(grace, self.0).await, Ok(Ok(())))
    }
}

/// Host side of a transport
pub trait HostTransport {
    /// Next queued event, without blocking.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn approve(&mut self, peer: PeerId);

    fn reject(&mut self, peer: PeerId, reason: &str);

    fn send(&mut self, peer: PeerId, payload: Bytes, delivery: Delivery);

    /// Hand queued messages to the socket.
    fn flush(&mut self) {}

    /// Tell every connected peer goodbye and release the connection.
    fn shutdown(&mut self, reason: &str) -> ShutdownFlush;
}

/// Client side of a transport
pub trait ClientTransport {
    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn connect(&mut self, host: SocketAddr);

    /// Broadcast a discovery request for hosts on `port`.
    fn discover(&mut self, port: u16);

    /// Send to the connected host. Dropped when not connected.
    fn send(&mut self, payload: Bytes, delivery: Delivery);

    fn flush(&mut self) {}

    fn shutdown(&mut self, reason: &str) -> ShutdownFlush;
}
