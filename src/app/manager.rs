//! Network manager: owns at most one running session
//!
//! A process is either hosting or playing as a client. Starting one side stops
//! the other first, and stopping waits for the disconnect flush for at most the
//! configured grace period.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use super::state::SharedStatus;
use crate::config::{ClientConfig, HostConfig, Role};
use crate::game::stats::NetStats;
use crate::game::world::World;
use crate::net::transport::{ClientTransport, HostTransport, ShutdownFlush};
use crate::net::{ClientSession, HostSession, HostStatus};

pub struct NetworkManager<H, C, W> {
    host: Option<HostSession<H, W>>,
    client: Option<ClientSession<C, W>>,
    shutdown_grace: Duration,
    status: SharedStatus,
}

impl<H, C, W> NetworkManager<H, C, W>
where
    H: HostTransport,
    C: ClientTransport,
    W: World,
{
    pub fn new(shutdown_grace: Duration) -> Self {
        Self::with_status(shutdown_grace, SharedStatus::default())
    }

    /// Publish host snapshots into an existing handle.
    pub fn with_status(shutdown_grace: Duration, status: SharedStatus) -> Self {
        Self {
            host: None,
            client: None,
            shutdown_grace,
            status,
        }
    }

    pub async fn start_host(&mut self, config: HostConfig, transport: H, world: W) {
        self.stop_client("Starting a host").await;
        self.stop_host("Host restarting").await;

        let host = HostSession::new(config, transport, world, NetStats::new());
        *self.status.write() = host.status();
        self.host = Some(host);
    }

    /// Returns `false` when no host was running.
    pub async fn stop_host(&mut self, reason: &str) -> bool {
        let Some(mut host) = self.host.take() else {
            return false;
        };
        let flush = host.shutdown(reason);
        self.wait_flush(flush, "host").await;
        *self.status.write() = HostStatus::default();
        true
    }

    pub async fn start_client(&mut self, config: ClientConfig, transport: C, world: W) {
        self.stop_host("Host left to join a game").await;
        self.stop_client("Client restarting").await;

        self.client = Some(ClientSession::new(config, transport, world, NetStats::new()));
    }

    /// Returns `false` when no client was running.
    pub async fn stop_client(&mut self, reason: &str) -> bool {
        let Some(mut client) = self.client.take() else {
            return false;
        };
        let flush = client.shutdown(reason);
        self.wait_flush(flush, "client").await;
        true
    }

    /// Join `host` with the running client. Returns `false` without a client.
    pub fn connect(&mut self, host: SocketAddr) -> bool {
        match self.client.as_mut() {
            Some(client) => {
                client.connect(host);
                true
            }
            None => false,
        }
    }

    pub fn discover(&mut self, port: u16) -> bool {
        match self.client.as_mut() {
            Some(client) => {
                client.discover(port);
                true
            }
            None => false,
        }
    }

    pub fn role(&self) -> Option<Role> {
        if self.host.is_some() {
            Some(Role::Host)
        } else if self.client.is_some() {
            Some(Role::Client)
        } else {
            None
        }
    }

    /// Tick whichever session is running and publish the host snapshot.
    pub fn update(&mut self, elapsed_ms: u32) {
        if let Some(host) = self.host.as_mut() {
            host.update(elapsed_ms);
            *self.status.write() = host.status();
        }
        if let Some(client) = self.client.as_mut() {
            client.update(elapsed_ms);
        }
    }

    pub fn status(&self) -> HostStatus {
        self.status.read().clone()
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.status.clone()
    }

    pub fn host(&self) -> Option<&HostSession<H, W>> {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> Option<&mut HostSession<H, W>> {
        self.host.as_mut()
    }

    pub fn client(&self) -> Option<&ClientSession<C, W>> {
        self.client.as_ref()
    }

    pub fn client_mut(&mut self) -> Option<&mut ClientSession<C, W>> {
        self.client.as_mut()
    }

    async fn wait_flush(&self, flush: ShutdownFlush, side: &'static str) {
        if flush.wait(self.shutdown_grace).await {
            info!(side, "Disconnect flushed");
        } else {
            warn!(side, grace_ms = self.shutdown_grace.as_millis() as u64, "Disconnect not confirmed within grace period");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::game::headless::{Authority, HeadlessWorld};
    use crate::net::transport::{MemoryClient, MemoryHost, MemoryNetwork};
    use crate::net::{ConnectionState, PeerId};

    type Manager = NetworkManager<MemoryHost, MemoryClient, HeadlessWorld>;

    fn host_id() -> PeerId {
        PeerId::new(Ipv4Addr::new(10, 0, 0, 1), 27388)
    }

    fn client_id() -> PeerId {
        PeerId::new(Ipv4Addr::new(10, 0, 0, 2), 40000)
    }

    fn manager() -> Manager {
        NetworkManager::new(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn host_publishes_status() {
        let net = MemoryNetwork::new(host_id());
        let mut manager = manager();
        assert_eq!(manager.role(), None);

        manager
            .start_host(HostConfig::default(), net.host(), HeadlessWorld::new(Authority::Host))
            .await;
        assert_eq!(manager.role(), Some(Role::Host));

        manager.update(16);
        let status = manager.status();
        assert!(status.running);
        assert_eq!(status.map, "arena");
        assert_eq!(status.tick, 1);
        assert_eq!(status.clients.len(), 1);

        assert!(manager.stop_host("done").await);
        assert!(!manager.status().running);
        assert!(!manager.stop_host("again").await);
    }

    #[tokio::test]
    async fn starting_a_client_stops_the_host() {
        let net = MemoryNetwork::new(host_id());
        let mut manager = manager();
        manager
            .start_host(HostConfig::default(), net.host(), HeadlessWorld::new(Authority::Host))
            .await;

        manager
            .start_client(
                ClientConfig::default(),
                net.client(client_id()),
                HeadlessWorld::new(Authority::Client),
            )
            .await;
        assert_eq!(manager.role(), Some(Role::Client));
        assert!(manager.host().is_none());
        assert!(!manager.status().running);
    }

    #[tokio::test]
    async fn connect_needs_a_client() {
        let mut manager = manager();
        assert!(!manager.connect("10.0.0.1:27388".parse().unwrap()));
        assert!(!manager.discover(27388));
    }

    #[tokio::test]
    async fn client_manager_joins_host_manager() {
        let net = MemoryNetwork::new(host_id());
        let mut host = manager();
        let mut client = manager();
        host.start_host(HostConfig::default(), net.host(), HeadlessWorld::seeded(Authority::Host, 1))
            .await;
        client
            .start_client(
                ClientConfig::default(),
                net.client(client_id()),
                HeadlessWorld::seeded(Authority::Client, 2),
            )
            .await;

        assert!(client.connect("10.0.0.1:27388".parse().unwrap()));
        for _ in 0..60 {
            host.update(16);
            client.update(16);
        }

        let session = client.client().unwrap();
        assert_eq!(session.state(), ConnectionState::Ready);
        assert!(session.local_tank().is_some());
        assert_eq!(host.status().clients.len(), 2);

        assert!(client.stop_client("bye").await);
        host.update(16);
        assert_eq!(host.status().clients.len(), 1);
    }
}
