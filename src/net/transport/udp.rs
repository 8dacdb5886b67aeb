//! UDP transport on renet
//!
//! renet channels carry the three delivery classes and netcode owns the
//! connection itself: handshake, keep-alive and timeouts. Both endpoints are
//! driven from the simulation thread. A poll that finds the event queue empty
//! reads whatever waits on the socket, and [`HostTransport::flush`] /
//! [`ClientTransport::flush`] put queued messages on the wire.
//!
//! Host approval, rejection reasons and goodbyes travel as [`Control`] frames
//! on their own channel. LAN discovery uses a side socket next to the game
//! port.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use renet::{ClientId, DisconnectReason as RenetDisconnect, RenetClient, RenetServer, ServerEvent};
use renet_netcode::{
    ClientAuthentication, NetcodeClientTransport, NetcodeDisconnectReason, NetcodeServerTransport,
    ServerAuthentication, ServerConfig,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::channel::{self, CONTROL, DATA_CHANNELS, SEQUENCED};
use super::packet::{self, Control, Discovery, LatestWins, PROTOCOL_ID};
use super::{ClientTransport, DisconnectReason, HostTransport, ShutdownFlush, TransportEvent};
use crate::net::PeerId;
use crate::protocol::Delivery;

/// Discovery datagrams are a handful of bytes
const DISCOVERY_DATAGRAM: usize = 64;

/// Pause between pumps while a shutdown lingers
const LINGER_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct UdpSettings {
    /// Unacknowledged reliable messages are resent after this long
    pub resend_interval: Duration,
    /// A connection not approved within this long is given up
    pub connect_timeout: Duration,
    /// A rejected peer that does not leave by itself is dropped after this long
    pub reject_linger: Duration,
    /// Shutdown keeps pumping at most this long for the other side to leave
    pub shutdown_linger: Duration,
    /// Netcode connection slots; the host session enforces the real capacity
    pub max_connections: usize,
}

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            resend_interval: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(5),
            reject_linger: Duration::from_secs(1),
            shutdown_linger: Duration::from_millis(100),
            max_connections: 64,
        }
    }
}

/// Measures the time between pumps
struct Clock(Instant);

impl Clock {
    fn start() -> Self {
        Self(Instant::now())
    }

    fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.0);
        self.0 = now;
        delta
    }
}

fn unix_time() -> io::Result<Duration> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Connection state handed to a background task on shutdown
trait Linger: Send + 'static {
    /// Pump once, discarding inbound traffic.
    fn step(&mut self, delta: Duration);

    /// The other side has gone; nothing left to wait for
    fn settled(&self) -> bool;

    fn close(&mut self);
}

/// Keep `link` pumping until it settles or `grace` runs out, then close it.
/// Without a runtime the link is closed right away.
fn linger<L: Linger>(mut link: L, grace: Duration) -> ShutdownFlush {
    let (flushed, flush) = ShutdownFlush::new();
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                let deadline = Instant::now() + grace;
                let mut clock = Clock::start();
                while !link.settled() && Instant::now() < deadline {
                    tokio::time::sleep(LINGER_POLL).await;
                    link.step(clock.lap());
                }
                link.close();
                let _ = flushed.send(());
            });
        }
        Err(_) => {
            link.close();
            let _ = flushed.send(());
        }
    }
    flush
}

// ============================================================================
// Host
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Waiting for the session to approve or reject
    Pending,
    Approved,
    /// Told why; dropped once `until` passes
    Rejected { until: Instant },
}

struct Remote {
    peer: PeerId,
    admission: Admission,
    latest: LatestWins,
    next_sequence: u16,
}

struct HostLink {
    server: RenetServer,
    transport: NetcodeServerTransport,
}

impl HostLink {
    fn receive(&mut self, delta: Duration) {
        self.server.update(delta);
        if let Err(e) = self.transport.update(delta, &mut self.server) {
            warn!(error = %e, "Netcode update failed");
        }
    }

    fn send(&mut self) {
        self.transport.send_packets(&mut self.server);
    }
}

impl Linger for HostLink {
    fn step(&mut self, delta: Duration) {
        self.receive(delta);
        while self.server.get_event().is_some() {}
        self.send();
    }

    fn settled(&self) -> bool {
        self.server.connected_clients() == 0
    }

    fn close(&mut self) {
        self.transport.disconnect_all(&mut self.server);
    }
}

/// Host side of the UDP transport
pub struct UdpHost {
    settings: UdpSettings,
    local_addr: SocketAddr,
    link: Option<HostLink>,
    discovery: Option<UdpSocket>,
    remotes: HashMap<ClientId, Remote>,
    ids: HashMap<PeerId, ClientId>,
    events: VecDeque<TransportEvent>,
    clock: Clock,
}

impl UdpHost {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::bind_with(addr, UdpSettings::default())
    }

    pub fn bind_with(addr: SocketAddr, settings: UdpSettings) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        let config = ServerConfig {
            current_time: unix_time()?,
            max_clients: settings.max_connections,
            protocol_id: PROTOCOL_ID,
            public_addresses: public_addresses(local_addr),
            authentication: ServerAuthentication::Unsecure,
        };
        let transport = NetcodeServerTransport::new(config, socket)?;
        let server = RenetServer::new(channel::connection_config(settings.resend_interval));

        let discovery = bind_discovery_responder(local_addr);
        info!(
            addr = %local_addr,
            discovery = discovery.is_some(),
            "UDP host bound"
        );

        Ok(Self {
            settings,
            local_addr,
            link: Some(HostLink { server, transport }),
            discovery,
            remotes: HashMap::new(),
            ids: HashMap::new(),
            events: VecDeque::new(),
            clock: Clock::start(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn pump(&mut self) {
        let delta = self.clock.lap();
        self.answer_discovery();

        let Some(link) = self.link.as_mut() else {
            return;
        };
        link.receive(delta);
        let mut server_events = Vec::new();
        while let Some(event) = link.server.get_event() {
            server_events.push(event);
        }

        for event in server_events {
            self.handle_server_event(event);
        }
        self.receive_messages();
        self.expire_rejections(Instant::now());

        if let Some(link) = self.link.as_mut() {
            link.send();
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ClientConnected { client_id } => {
                let addr = self
                    .link
                    .as_ref()
                    .and_then(|link| link.transport.client_addr(client_id));
                let Some(peer) = addr.and_then(PeerId::from_socket_addr) else {
                    warn!(client_id, "Dropping connection without an IPv4 endpoint");
                    if let Some(link) = self.link.as_mut() {
                        link.server.disconnect(client_id);
                    }
                    return;
                };

                debug!(peer = %peer, client_id, "Connection requested");
                self.ids.insert(peer, client_id);
                self.remotes.insert(
                    client_id,
                    Remote {
                        peer,
                        admission: Admission::Pending,
                        latest: LatestWins::default(),
                        next_sequence: 0,
                    },
                );
                self.events
                    .push_back(TransportEvent::ConnectionRequested { peer });
            }
            ServerEvent::ClientDisconnected { client_id, reason } => {
                let Some(remote) = self.forget(client_id) else {
                    return;
                };
                if matches!(remote.admission, Admission::Rejected { .. }) {
                    return;
                }
                // Netcode drops without a goodbye are indistinguishable from silence
                let reason = match reason {
                    RenetDisconnect::Transport => DisconnectReason::TimedOut,
                    other => DisconnectReason::Quit(other.to_string()),
                };
                info!(peer = %remote.peer, reason = %reason, "Connection lost");
                self.events.push_back(TransportEvent::Disconnected {
                    peer: remote.peer,
                    reason,
                });
            }
        }
    }

    fn receive_messages(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let mut leaving = Vec::new();

        for (&client_id, remote) in self.remotes.iter_mut() {
            while let Some(frame) = link.server.receive_message(client_id, CONTROL) {
                match Control::decode(&frame) {
                    Ok(Control::Goodbye(reason)) => leaving.push((client_id, reason)),
                    Ok(other) => {
                        debug!(peer = %remote.peer, frame = ?other, "Ignoring control frame from a client")
                    }
                    Err(e) => warn!(peer = %remote.peer, error = %e, "Dropping malformed control frame"),
                }
            }

            for channel_id in DATA_CHANNELS {
                while let Some(message) = link.server.receive_message(client_id, channel_id) {
                    if remote.admission != Admission::Approved {
                        continue;
                    }
                    let payload = if channel_id == SEQUENCED {
                        match packet::split_sequenced(message) {
                            Ok((sequence, payload)) if remote.latest.accept(sequence) => payload,
                            Ok(_) => continue,
                            Err(e) => {
                                warn!(peer = %remote.peer, error = %e, "Dropping malformed sequenced message");
                                continue;
                            }
                        }
                    } else {
                        message
                    };
                    self.events.push_back(TransportEvent::Data {
                        peer: remote.peer,
                        payload,
                    });
                }
            }
        }

        for (client_id, reason) in leaving {
            link.server.disconnect(client_id);
            let Some(remote) = self.remotes.remove(&client_id) else {
                continue;
            };
            self.ids.remove(&remote.peer);
            if matches!(remote.admission, Admission::Rejected { .. }) {
                continue;
            }
            info!(peer = %remote.peer, reason = %reason, "Client said goodbye");
            self.events.push_back(TransportEvent::Disconnected {
                peer: remote.peer,
                reason: DisconnectReason::Quit(reason),
            });
        }
    }

    fn expire_rejections(&mut self, now: Instant) {
        let expired: Vec<ClientId> = self
            .remotes
            .iter()
            .filter(|(_, remote)| matches!(remote.admission, Admission::Rejected { until } if now >= until))
            .map(|(client_id, _)| *client_id)
            .collect();

        for client_id in expired {
            if let Some(link) = self.link.as_mut() {
                link.server.disconnect(client_id);
            }
            if let Some(remote) = self.forget(client_id) {
                debug!(peer = %remote.peer, "Dropped rejected peer");
            }
        }
    }

    fn answer_discovery(&mut self) {
        let Some(socket) = self.discovery.as_ref() else {
            return;
        };
        let reply = Discovery::Response {
            port: self.local_addr.port(),
        }
        .encode();
        let mut buf = [0u8; DISCOVERY_DATAGRAM];

        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => match Discovery::decode(&buf[..len]) {
                    Ok(Discovery::Request) => {
                        debug!(from = %from, "Answering discovery request");
                        if let Err(e) = socket.send_to(&reply, from) {
                            warn!(to = %from, error = %e, "Discovery reply failed");
                        }
                    }
                    Ok(other) => debug!(from = %from, datagram = ?other, "Ignoring discovery datagram"),
                    Err(e) => debug!(from = %from, error = %e, "Dropping foreign discovery datagram"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "Discovery receive failed");
                    break;
                }
            }
        }
    }

    fn send_control(&mut self, client_id: ClientId, control: &Control) {
        if let Some(link) = self.link.as_mut() {
            link.server.send_message(client_id, CONTROL, control.encode());
            link.send();
        }
    }

    fn forget(&mut self, client_id: ClientId) -> Option<Remote> {
        let remote = self.remotes.remove(&client_id)?;
        self.ids.remove(&remote.peer);
        Some(remote)
    }

    fn pending_client(&self, peer: PeerId) -> Option<ClientId> {
        let client_id = *self.ids.get(&peer)?;
        match self.remotes.get(&client_id)?.admission {
            Admission::Pending => Some(client_id),
            _ => None,
        }
    }
}

impl HostTransport for UdpHost {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.pump();
        }
        self.events.pop_front()
    }

    fn approve(&mut self, peer: PeerId) {
        let Some(client_id) = self.pending_client(peer) else {
            debug!(peer = %peer, "Approve for a peer that is not waiting");
            return;
        };
        if let Some(remote) = self.remotes.get_mut(&client_id) {
            remote.admission = Admission::Approved;
        }
        self.send_control(client_id, &Control::Approve);
        self.events.push_back(TransportEvent::Connected { peer });
    }

    fn reject(&mut self, peer: PeerId, reason: &str) {
        let Some(client_id) = self.pending_client(peer) else {
            debug!(peer = %peer, "Reject for a peer that is not waiting");
            return;
        };
        let until = Instant::now() + self.settings.reject_linger;
        if let Some(remote) = self.remotes.get_mut(&client_id) {
            remote.admission = Admission::Rejected { until };
        }
        self.send_control(client_id, &Control::Reject(reason.to_string()));
    }

    fn send(&mut self, peer: PeerId, payload: Bytes, delivery: Delivery) {
        let Some(client_id) = self.ids.get(&peer).copied() else {
            debug!(peer = %peer, "Dropping payload for unknown peer");
            return;
        };
        let (Some(link), Some(remote)) = (self.link.as_mut(), self.remotes.get_mut(&client_id)) else {
            return;
        };
        if remote.admission != Admission::Approved {
            debug!(peer = %peer, "Dropping payload for a peer not approved");
            return;
        }

        let message = match delivery {
            Delivery::UnreliableSequenced => {
                let sequence = remote.next_sequence;
                remote.next_sequence = sequence.wrapping_add(1);
                packet::frame_sequenced(sequence, &payload)
            }
            Delivery::ReliableOrdered | Delivery::ReliableUnordered => payload,
        };
        link.server
            .send_message(client_id, channel::channel_of(delivery), message);
    }

    fn flush(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.send();
        }
    }

    fn shutdown(&mut self, reason: &str) -> ShutdownFlush {
        let Some(mut link) = self.link.take() else {
            return ShutdownFlush::done();
        };

        let goodbye = Control::Goodbye(reason.to_string()).encode();
        for client_id in link.server.clients_id() {
            link.server.send_message(client_id, CONTROL, goodbye.clone());
        }
        link.send();

        self.remotes.clear();
        self.ids.clear();
        self.events.clear();
        self.discovery = None;
        info!(reason, "UDP host shutting down");
        linger(link, self.settings.shutdown_linger)
    }
}

/// Addresses clients may dial. Netcode refuses connect tokens naming another.
fn public_addresses(local: SocketAddr) -> Vec<SocketAddr> {
    if !local.ip().is_unspecified() {
        return vec![local];
    }
    let mut addresses = vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())];
    if let Some(ip) = outbound_ip() {
        addresses.push(SocketAddr::new(ip, local.port()));
    }
    addresses
}

/// Interface address the OS routes LAN traffic through. Connecting a UDP
/// socket sends nothing.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

fn bind_discovery_responder(game: SocketAddr) -> Option<UdpSocket> {
    let port = packet::discovery_port(game.port())?;
    let bound = UdpSocket::bind(SocketAddr::new(game.ip(), port)).and_then(|socket| {
        socket.set_nonblocking(true)?;
        Ok(socket)
    });
    match bound {
        Ok(socket) => Some(socket),
        Err(e) => {
            warn!(port, error = %e, "Discovery responder unavailable");
            None
        }
    }
}

// ============================================================================
// Client
// ============================================================================

struct ClientLink {
    host: PeerId,
    client: RenetClient,
    transport: NetcodeClientTransport,
    approved: bool,
    give_up_at: Instant,
    latest: LatestWins,
    next_sequence: u16,
}

impl ClientLink {
    fn receive(&mut self, delta: Duration) {
        self.client.update(delta);
        if let Err(e) = self.transport.update(delta, &mut self.client) {
            debug!(host = %self.host, error = %e, "Netcode update failed");
        }
    }

    fn send(&mut self) {
        if self.client.is_disconnected() {
            return;
        }
        if let Err(e) = self.transport.send_packets(&mut self.client) {
            debug!(host = %self.host, error = %e, "Netcode send failed");
        }
    }

    /// Why the connection ended, once netcode reports it down
    fn lost(&self) -> TransportEvent {
        let peer = self.host;
        match (self.approved, self.transport.disconnect_reason()) {
            (false, Some(NetcodeDisconnectReason::ConnectionDenied)) => TransportEvent::Rejected {
                peer,
                reason: "Connection denied".to_string(),
            },
            (true, Some(NetcodeDisconnectReason::DisconnectedByServer)) => TransportEvent::Disconnected {
                peer,
                reason: DisconnectReason::Quit("Disconnected by host".to_string()),
            },
            _ => TransportEvent::Disconnected {
                peer,
                reason: DisconnectReason::TimedOut,
            },
        }
    }
}

impl Linger for ClientLink {
    fn step(&mut self, delta: Duration) {
        self.receive(delta);
        self.send();
    }

    fn settled(&self) -> bool {
        self.client.is_disconnected()
    }

    fn close(&mut self) {
        self.transport.disconnect();
    }
}

/// Client side of the UDP transport
pub struct UdpClient {
    settings: UdpSettings,
    /// Game socket; each connection drives its own handle to it
    socket: UdpSocket,
    local_addr: SocketAddr,
    discovery: Option<UdpSocket>,
    link: Option<ClientLink>,
    events: VecDeque<TransportEvent>,
    clock: Clock,
}

impl UdpClient {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::bind_with(addr, UdpSettings::default())
    }

    pub fn bind_with(addr: SocketAddr, settings: UdpSettings) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        let discovery = UdpSocket::bind(SocketAddr::new(local_addr.ip(), 0)).and_then(|socket| {
            socket.set_broadcast(true)?;
            socket.set_nonblocking(true)?;
            Ok(socket)
        });
        let discovery = match discovery {
            Ok(socket) => Some(socket),
            Err(e) => {
                warn!(error = %e, "Discovery socket unavailable");
                None
            }
        };

        info!(addr = %local_addr, "UDP client bound");
        Ok(Self {
            settings,
            socket,
            local_addr,
            discovery,
            link: None,
            events: VecDeque::new(),
            clock: Clock::start(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn open_link(&self, host: PeerId, addr: SocketAddr) -> io::Result<ClientLink> {
        let authentication = ClientAuthentication::Unsecure {
            protocol_id: PROTOCOL_ID,
            client_id: rand::random(),
            server_addr: addr,
            user_data: None,
        };
        let transport = NetcodeClientTransport::new(unix_time()?, authentication, self.socket.try_clone()?)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        Ok(ClientLink {
            host,
            client: RenetClient::new(channel::connection_config(self.settings.resend_interval)),
            transport,
            approved: false,
            give_up_at: Instant::now() + self.settings.connect_timeout,
            latest: LatestWins::default(),
            next_sequence: 0,
        })
    }

    fn pump(&mut self) {
        let delta = self.clock.lap();
        self.read_discovery();

        let Some(mut link) = self.link.take() else {
            return;
        };
        link.receive(delta);

        if link.client.is_connected() {
            if !self.read_control(&mut link) {
                return;
            }
            if link.approved {
                self.read_data(&mut link);
            }
        }

        if link.client.is_disconnected() {
            let event = link.lost();
            info!(host = %link.host, event = ?event, "Connection to host ended");
            self.events.push_back(event);
            return;
        }
        if !link.approved && Instant::now() >= link.give_up_at {
            warn!(host = %link.host, "No answer from host");
            link.close();
            self.events.push_back(TransportEvent::Disconnected {
                peer: link.host,
                reason: DisconnectReason::TimedOut,
            });
            return;
        }

        link.send();
        self.link = Some(link);
    }

    /// Returns `false` once the host ended the connection.
    fn read_control(&mut self, link: &mut ClientLink) -> bool {
        while let Some(frame) = link.client.receive_message(CONTROL) {
            match Control::decode(&frame) {
                Ok(Control::Approve) => {
                    if !link.approved {
                        link.approved = true;
                        info!(host = %link.host, "Connected");
                        self.events
                            .push_back(TransportEvent::Connected { peer: link.host });
                    }
                }
                Ok(Control::Reject(reason)) => {
                    link.close();
                    self.events.push_back(TransportEvent::Rejected {
                        peer: link.host,
                        reason,
                    });
                    return false;
                }
                Ok(Control::Goodbye(reason)) => {
                    link.close();
                    self.events.push_back(TransportEvent::Disconnected {
                        peer: link.host,
                        reason: DisconnectReason::Quit(reason),
                    });
                    return false;
                }
                Err(e) => warn!(host = %link.host, error = %e, "Dropping malformed control frame"),
            }
        }
        true
    }

    fn read_data(&mut self, link: &mut ClientLink) {
        for channel_id in DATA_CHANNELS {
            while let Some(message) = link.client.receive_message(channel_id) {
                let payload = if channel_id == SEQUENCED {
                    match packet::split_sequenced(message) {
                        Ok((sequence, payload)) if link.latest.accept(sequence) => payload,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(host = %link.host, error = %e, "Dropping malformed sequenced message");
                            continue;
                        }
                    }
                } else {
                    message
                };
                self.events.push_back(TransportEvent::Data {
                    peer: link.host,
                    payload,
                });
            }
        }
    }

    fn read_discovery(&mut self) {
        let Some(socket) = self.discovery.as_ref() else {
            return;
        };
        let mut buf = [0u8; DISCOVERY_DATAGRAM];

        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, from)) => match Discovery::decode(&buf[..len]) {
                    Ok(Discovery::Response { port }) => {
                        match PeerId::from_socket_addr(SocketAddr::new(from.ip(), port)) {
                            Some(peer) => self.events.push_back(TransportEvent::HostDiscovered { peer }),
                            None => debug!(from = %from, "Ignoring IPv6 discovery answer"),
                        }
                    }
                    Ok(other) => debug!(from = %from, datagram = ?other, "Ignoring discovery datagram"),
                    Err(e) => debug!(from = %from, error = %e, "Dropping foreign discovery datagram"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "Discovery receive failed");
                    break;
                }
            }
        }
    }
}

impl ClientTransport for UdpClient {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.pump();
        }
        self.events.pop_front()
    }

    fn connect(&mut self, host: SocketAddr) {
        let Some(peer) = PeerId::from_socket_addr(host) else {
            warn!(addr = %host, "Only IPv4 hosts are supported");
            return;
        };

        if let Some(mut previous) = self.link.take() {
            if previous.approved {
                previous
                    .client
                    .send_message(CONTROL, Control::Goodbye("Reconnecting".to_string()).encode());
                previous.send();
            }
            previous.close();
        }

        match self.open_link(peer, host) {
            Ok(link) => {
                info!(host = %peer, "Connecting");
                self.link = Some(link);
            }
            Err(e) => {
                warn!(host = %peer, error = %e, "Could not start connecting");
                self.events.push_back(TransportEvent::Disconnected {
                    peer,
                    reason: DisconnectReason::TimedOut,
                });
            }
        }
    }

    fn discover(&mut self, port: u16) {
        let Some(socket) = self.discovery.as_ref() else {
            warn!("Discovery socket unavailable");
            return;
        };
        let Some(port) = packet::discovery_port(port) else {
            warn!(port, "No discovery port next to this game port");
            return;
        };

        let target = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port));
        if let Err(e) = socket.send_to(&Discovery::Request.encode(), target) {
            warn!(target = %target, error = %e, "Discovery request failed");
        }
    }

    fn send(&mut self, payload: Bytes, delivery: Delivery) {
        let Some(link) = self.link.as_mut().filter(|link| link.approved) else {
            debug!("Dropping payload, not connected");
            return;
        };

        let message = match delivery {
            Delivery::UnreliableSequenced => {
                let sequence = link.next_sequence;
                link.next_sequence = sequence.wrapping_add(1);
                packet::frame_sequenced(sequence, &payload)
            }
            Delivery::ReliableOrdered | Delivery::ReliableUnordered => payload,
        };
        link.client.send_message(channel::channel_of(delivery), message);
    }

    fn flush(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.send();
        }
    }

    fn shutdown(&mut self, reason: &str) -> ShutdownFlush {
        self.events.clear();
        let Some(mut link) = self.link.take() else {
            return ShutdownFlush::done();
        };
        info!(reason, "UDP client shutting down");

        if !link.approved {
            link.close();
            return ShutdownFlush::done();
        }
        link.client
            .send_message(CONTROL, Control::Goodbye(reason.to_string()).encode());
        link.send();
        linger(link, self.settings.shutdown_linger)
    }
}
