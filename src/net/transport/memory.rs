//! In-process transport for tests and local play
//!
//! A [`MemoryNetwork`] hub routes events between one host endpoint and any
//! number of client endpoints. Delivery is immediate and in send order for
//! every class; timeouts only happen when scripted with
//! [`MemoryNetwork::time_out`].

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    ClientTransport, DisconnectReason, HostTransport, ShutdownFlush, TransportEvent,
};
use crate::net::PeerId;
use crate::protocol::Delivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    Pending,
    Connected,
}

#[derive(Debug)]
struct ClientSlot {
    state: LinkState,
    inbox: VecDeque<TransportEvent>,
    /// Payloads the host sent to this client, with their delivery class
    received: Vec<(Bytes, Delivery)>,
}

#[derive(Debug)]
struct Hub {
    host: PeerId,
    host_online: bool,
    host_inbox: VecDeque<TransportEvent>,
    clients: HashMap<PeerId, ClientSlot>,
}

impl Hub {
    fn slot(&mut self, peer: PeerId) -> &mut ClientSlot {
        self.clients.entry(peer).or_insert_with(|| ClientSlot {
            state: LinkState::Idle,
            inbox: VecDeque::new(),
            received: Vec::new(),
        })
    }
}

/// Shared hub; clone it to hand endpoints to several owners.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new(host: PeerId) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                host,
                host_online: false,
                host_inbox: VecDeque::new(),
                clients: HashMap::new(),
            })),
        }
    }

    pub fn host_id(&self) -> PeerId {
        self.hub.lock().host
    }

    /// The host endpoint. Only one should be live at a time.
    pub fn host(&self) -> MemoryHost {
        self.hub.lock().host_online = true;
        MemoryHost {
            hub: self.hub.clone(),
        }
    }

    pub fn client(&self, id: PeerId) -> MemoryClient {
        self.hub.lock().slot(id);
        MemoryClient {
            id,
            hub: self.hub.clone(),
        }
    }

    /// Drop the connection between host and `peer` as if it went silent.
    pub fn time_out(&self, peer: PeerId) {
        let mut hub = self.hub.lock();
        let host = hub.host;
        let slot = hub.slot(peer);
        if slot.state != LinkState::Connected {
            return;
        }
        slot.state = LinkState::Idle;
        slot.inbox.push_back(TransportEvent::Disconnected {
            peer: host,
            reason: DisconnectReason::TimedOut,
        });
        hub.host_inbox.push_back(TransportEvent::Disconnected {
            peer,
            reason: DisconnectReason::TimedOut,
        });
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.hub
            .lock()
            .clients
            .get(&peer)
            .map_or(false, |slot| slot.state == LinkState::Connected)
    }

    /// Everything the host has sent to `peer` so far.
    pub fn sent_to(&self, peer: PeerId) -> Vec<(Bytes, Delivery)> {
        self.hub
            .lock()
            .clients
            .get(&peer)
            .map(|slot| slot.received.clone())
            .unwrap_or_default()
    }
}

/// Host endpoint of a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryHost {
    hub: Arc<Mutex<Hub>>,
}

impl HostTransport for MemoryHost {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.hub.lock().host_inbox.pop_front()
    }

    fn approve(&mut self, peer: PeerId) {
        let mut hub = self.hub.lock();
        let host = hub.host;
        let slot = hub.slot(peer);
        if slot.state != LinkState::Pending {
            return;
        }
        slot.state = LinkState::Connected;
        slot.inbox.push_back(TransportEvent::Connected { peer: host });
        hub.host_inbox.push_back(TransportEvent::Connected { peer });
    }

    fn reject(&mut self, peer: PeerId, reason: &str) {
        let mut hub = self.hub.lock();
        let host = hub.host;
        let slot = hub.slot(peer);
        if slot.state != LinkState::Pending {
            return;
        }
        slot.state = LinkState::Idle;
        slot.inbox.push_back(TransportEvent::Rejected {
            peer: host,
            reason: reason.to_string(),
        });
    }

    fn send(&mut self, peer: PeerId, payload: Bytes, delivery: Delivery) {
        let mut hub = self.hub.lock();
        let host = hub.host;
        let slot = hub.slot(peer);
        if slot.state != LinkState::Connected {
            debug!(peer = %peer, "Dropping payload for unconnected peer");
            return;
        }
        slot.received.push((payload.clone(), delivery));
        slot.inbox.push_back(TransportEvent::Data {
            peer: host,
            payload,
        });
    }

    fn shutdown(&mut self, reason: &str) -> ShutdownFlush {
        let mut hub = self.hub.lock();
        let host = hub.host;
        hub.host_online = false;
        for slot in hub.clients.values_mut() {
            if slot.state == LinkState::Connected {
                slot.inbox.push_back(TransportEvent::Disconnected {
                    peer: host,
                    reason: DisconnectReason::Quit(reason.to_string()),
                });
            }
            slot.state = LinkState::Idle;
        }
        ShutdownFlush::done()
    }
}

/// Client endpoint of a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryClient {
    id: PeerId,
    hub: Arc<Mutex<Hub>>,
}

impl MemoryClient {
    pub fn id(&self) -> PeerId {
        self.id
    }
}

impl ClientTransport for MemoryClient {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.hub.lock().slot(self.id).inbox.pop_front()
    }

    fn connect(&mut self, host: SocketAddr) {
        let mut hub = self.hub.lock();
        let target = hub.host;
        let online = hub.host_online;
        let id = self.id;
        let slot = hub.slot(id);

        if !online || PeerId::from_socket_addr(host) != Some(target) {
            slot.inbox.push_back(TransportEvent::Disconnected {
                peer: target,
                reason: DisconnectReason::TimedOut,
            });
            return;
        }
        if slot.state != LinkState::Idle {
            return;
        }
        slot.state = LinkState::Pending;
        hub.host_inbox
            .push_back(TransportEvent::ConnectionRequested { peer: id });
    }

    fn discover(&mut self, port: u16) {
        let mut hub = self.hub.lock();
        let host = hub.host;
        if hub.host_online && host.addr().port() == port {
            let id = self.id;
            hub.slot(id)
                .inbox
                .push_back(TransportEvent::HostDiscovered { peer: host });
        }
    }

    fn send(&mut self, payload: Bytes, _delivery: Delivery) {
        let mut hub = self.hub.lock();
        let id = self.id;
        if hub.slot(id).state != LinkState::Connected {
            return;
        }
        hub.host_inbox
            .push_back(TransportEvent::Data { peer: id, payload });
    }

    fn shutdown(&mut self, reason: &str) -> ShutdownFlush {
        let mut hub = self.hub.lock();
        let id = self.id;
        let slot = hub.slot(id);
        let was_connected = slot.state == LinkState::Connected;
        slot.state = LinkState::Idle;
        if was_connected {
            hub.host_inbox.push_back(TransportEvent::Disconnected {
                peer: id,
                reason: DisconnectReason::Quit(reason.to_string()),
            });
        }
        ShutdownFlush::done()
    }
}
