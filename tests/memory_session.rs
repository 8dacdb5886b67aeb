//! Host and client sessions talking over the in-process transport

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use arena_netsync::config::{ClientConfig, HostConfig};
use arena_netsync::game::headless::{Authority, HeadlessWorld, NetworkOwned};
use arena_netsync::game::{Direction, NetStats, Ownership, PeerStats, TankControl};
use arena_netsync::net::host::REJECT_SERVER_FULL;
use arena_netsync::net::transport::{MemoryClient, MemoryHost, MemoryNetwork};
use arena_netsync::net::{ClientSession, ConnectionState, HostSession, PeerId};
use arena_netsync::protocol::{decode, MessageTag};

type Host = HostSession<MemoryHost, HeadlessWorld>;
type Client = ClientSession<MemoryClient, HeadlessWorld>;

const TICK_MS: u32 = 16;

fn host_id() -> PeerId {
    PeerId::new(Ipv4Addr::new(192, 168, 1, 10), 27388)
}

fn client_id(n: u8) -> PeerId {
    PeerId::new(Ipv4Addr::new(192, 168, 1, 20 + n), 50000)
}

fn host_addr() -> SocketAddr {
    SocketAddr::V4(host_id().addr())
}

fn start_host(net: &MemoryNetwork, config: HostConfig) -> Host {
    HostSession::new(
        config,
        net.host(),
        HeadlessWorld::seeded(Authority::Host, 11),
        NetStats::new(),
    )
}

fn start_client(net: &MemoryNetwork, n: u8) -> Client {
    let config = ClientConfig {
        player_name: format!("player{n}"),
        settle_delay: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    ClientSession::new(
        config,
        net.client(client_id(n)),
        HeadlessWorld::seeded(Authority::Client, 100 + u64::from(n)),
        NetStats::new(),
    )
}

fn run(host: &mut Host, clients: &mut [&mut Client], ticks: usize) {
    for _ in 0..ticks {
        host.update(TICK_MS);
        for client in clients.iter_mut() {
            client.update(TICK_MS);
        }
    }
}

fn tags_sent_to(net: &MemoryNetwork, peer: PeerId) -> Vec<MessageTag> {
    net.sent_to(peer)
        .iter()
        .map(|(payload, _)| decode(payload).unwrap().tag())
        .collect()
}

#[test]
fn handshake_materializes_the_host_world() {
    let net = MemoryNetwork::new(host_id());
    let mut host = start_host(&net, HostConfig::default());
    let mut first = start_client(&net, 1);

    first.connect(host_addr());
    run(&mut host, &mut [&mut first], 20);

    assert_eq!(first.state(), ConnectionState::Ready);
    let own_tank = first.local_tank().expect("local tank announced");
    assert_eq!(
        first.world().tank(own_tank).unwrap().ownership(),
        Ownership::Local(own_tank)
    );
    assert_eq!(host.client(client_id(1)).unwrap().tank, Some(own_tank));
    assert_eq!(first.stats().kills(client_id(1)), Some(0));

    // A second client receives the first client's tank in its snapshot
    let mut second = start_client(&net, 2);
    second.connect(host_addr());
    run(&mut host, &mut [&mut first, &mut second], 20);

    assert!(second.is_ready());
    assert!(second.world().tank(own_tank).unwrap().is_remote());
    let second_tank = second.local_tank().unwrap();
    assert_ne!(second_tank, own_tank);
    assert!(first.world().tank(second_tank).unwrap().is_remote());
    assert_eq!(host.world().tank_count(), 2);

    let tags = tags_sent_to(&net, client_id(2));
    assert_eq!(
        &tags[..3],
        &[
            MessageTag::ClientInfoAnn,
            MessageTag::MapInfoAnn,
            MessageTag::BlockSpriteInfoAnn
        ]
    );
}

#[test]
fn move_request_comes_back_in_state_updates() {
    let net = MemoryNetwork::new(host_id());
    let mut host = start_host(&net, HostConfig::default());
    let mut client = start_client(&net, 1);
    client.connect(host_addr());
    run(&mut host, &mut [&mut client], 20);

    let tank = client.local_tank().unwrap();
    assert!(client.request_move(Direction::Down));
    run(&mut host, &mut [&mut client], 6);

    let on_host = host.world().tank_motion(tank).unwrap();
    assert_eq!(on_host.destined_direction, Direction::Down);
    let on_client = client.world().tank_motion(tank).unwrap();
    assert_eq!(on_client.destined_direction, Direction::Down);
    assert!(tags_sent_to(&net, client_id(1)).contains(&MessageTag::StateUpdate));
}

#[test]
fn fire_request_is_acknowledged_to_every_player() {
    let net = MemoryNetwork::new(host_id());
    let mut host = start_host(&net, HostConfig::default());
    let mut shooter = start_client(&net, 1);
    let mut watcher = start_client(&net, 2);
    shooter.connect(host_addr());
    watcher.connect(host_addr());
    run(&mut host, &mut [&mut shooter, &mut watcher], 20);

    assert!(shooter.request_fire());
    run(&mut host, &mut [&mut shooter, &mut watcher], 2);

    assert!(tags_sent_to(&net, client_id(1)).contains(&MessageTag::FireAck));
    assert!(tags_sent_to(&net, client_id(2)).contains(&MessageTag::FireAck));
}

#[test]
fn full_host_rejects_extra_clients() {
    let net = MemoryNetwork::new(host_id());
    let mut host = start_host(
        &net,
        HostConfig {
            max_clients: 2,
            ..HostConfig::default()
        },
    );
    let mut admitted = start_client(&net, 1);
    let mut turned_away = start_client(&net, 2);

    admitted.connect(host_addr());
    run(&mut host, &mut [&mut admitted], 2);
    turned_away.connect(host_addr());
    run(&mut host, &mut [&mut admitted, &mut turned_away], 20);

    assert!(admitted.is_ready());
    assert_eq!(turned_away.state(), ConnectionState::Disconnected);
    assert_eq!(turned_away.last_rejection(), Some(REJECT_SERVER_FULL));
    assert_eq!(host.clients().len(), 2);
}

#[test]
fn timed_out_client_loses_its_tank_everywhere() {
    let net = MemoryNetwork::new(host_id());
    let mut host = start_host(&net, HostConfig::default());
    let mut leaving = start_client(&net, 1);
    let mut staying = start_client(&net, 2);
    leaving.connect(host_addr());
    staying.connect(host_addr());
    run(&mut host, &mut [&mut leaving, &mut staying], 20);

    let gone = leaving.local_tank().unwrap();
    assert!(staying.world().tank(gone).is_some());

    net.time_out(client_id(1));
    run(&mut host, &mut [&mut leaving, &mut staying], 6);

    assert_eq!(leaving.state(), ConnectionState::Disconnected);
    assert!(host.client(client_id(1)).is_none());
    assert!(!host.world().has_player(client_id(1)));
    assert!(host.world().has_player(client_id(2)));
    assert_eq!(host.stats().kills(client_id(1)), None);
    assert!(host.world().tank(gone).is_none());
    assert!(staying.world().tank(gone).is_none());
}

#[test]
fn host_shutdown_disconnects_clients() {
    let net = MemoryNetwork::new(host_id());
    let mut host = start_host(&net, HostConfig::default());
    let mut client = start_client(&net, 1);
    client.connect(host_addr());
    run(&mut host, &mut [&mut client], 20);

    let flush = host.shutdown("Host closed the game");
    tokio_test::block_on(async {
        assert!(flush.wait(Duration::from_millis(10)).await);
    });
    client.update(TICK_MS);

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!net.is_connected(client_id(1)));
}
