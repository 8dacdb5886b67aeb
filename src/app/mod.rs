//! Process wiring: the network manager and the async loops that tick it

mod manager;
mod state;

pub use manager::NetworkManager;
pub use state::{AppState, SharedStatus};

use std::future::Future;
use std::ops::ControlFlow;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::Config;
use crate::game::headless::{Authority, HeadlessWorld};
use crate::game::world::World;
use crate::http::build_router;
use crate::net::transport::{ClientTransport, HostTransport, UdpClient, UdpHost};
use crate::net::ConnectionState;
use crate::util::time::{tick_interval, Timer};

/// Seconds between discovery requests while no host has answered
const DISCOVERY_RETRY_SECS: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection rejected: {0}")]
    Rejected(String),
}

/// Host a match on UDP until `shutdown` resolves.
pub async fn run_host(config: Config, shutdown: impl Future<Output = ()>) -> Result<(), AppError> {
    let transport = UdpHost::bind(config.bind_socket())?;
    info!(addr = %transport.local_addr(), "Host listening");

    let state = AppState::new(config.clone());
    let mut manager: NetworkManager<UdpHost, UdpClient, HeadlessWorld> =
        NetworkManager::with_status(config.shutdown_grace, state.status.clone());
    manager
        .start_host(config.host.clone(), transport, HeadlessWorld::new(Authority::Host))
        .await;

    let (stop_http, http_stopped) = oneshot::channel::<()>();
    if let Some(addr) = config.status_addr {
        let listener = TcpListener::bind(addr).await?;
        info!("Status endpoint: http://{}/status", addr);
        tokio::spawn(async move {
            let shutdown = async {
                let _ = http_stopped.await;
            };
            if let Err(e) = axum::serve(listener, build_router(state))
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "Status endpoint failed");
            }
        });
    }

    drive(&mut manager, config.tick_rate, shutdown, |_| ControlFlow::Continue(())).await;

    manager.stop_host("Host shutting down").await;
    let _ = stop_http.send(());
    Ok(())
}

/// Join a host over UDP and mirror its world until disconnected or `shutdown`
/// resolves. Without a configured host, the first discovered one is joined.
pub async fn run_client(config: Config, shutdown: impl Future<Output = ()>) -> Result<(), AppError> {
    let transport = UdpClient::bind(config.bind_socket())?;
    info!(addr = %transport.local_addr(), "Client bound");

    let mut manager: NetworkManager<UdpHost, UdpClient, HeadlessWorld> =
        NetworkManager::new(config.shutdown_grace);
    manager
        .start_client(config.client.clone(), transport, HeadlessWorld::new(Authority::Client))
        .await;

    let mut joining = config.connect.is_some();
    match config.connect {
        Some(host) => manager.connect(host),
        None => manager.discover(config.port),
    };
    let retry_every = config.tick_rate.max(1) * DISCOVERY_RETRY_SECS;
    let mut ticks_since_request = 0u32;
    let mut was_ready = false;
    let mut rejection = None;

    drive(&mut manager, config.tick_rate, shutdown, |manager| {
        let Some(client) = manager.client_mut() else {
            return ControlFlow::Break(());
        };

        match client.state() {
            ConnectionState::Ready if !was_ready => {
                was_ready = true;
                info!(client_index = ?client.client_index(), tank = ?client.local_tank(), "Playing");
            }
            ConnectionState::Disconnected if joining => {
                rejection = client.last_rejection().map(str::to_string);
                return ControlFlow::Break(());
            }
            ConnectionState::Disconnected => match client.discovered_hosts().first().copied() {
                Some(host) => {
                    client.connect(host.addr().into());
                    joining = true;
                }
                None => {
                    ticks_since_request += 1;
                    if ticks_since_request >= retry_every {
                        ticks_since_request = 0;
                        client.discover(config.port);
                    }
                }
            },
            _ => {}
        }
        ControlFlow::Continue(())
    })
    .await;

    manager.stop_client("Quit").await;
    match rejection {
        Some(reason) => Err(AppError::Rejected(reason)),
        None => Ok(()),
    }
}

/// Tick `manager` at `tick_rate` until `shutdown` resolves or `on_tick` breaks.
///
/// Late ticks are skipped rather than bunched; the elapsed wall time is passed
/// to the sessions so timers stay accurate.
pub async fn drive<H, C, W>(
    manager: &mut NetworkManager<H, C, W>,
    tick_rate: u32,
    shutdown: impl Future<Output = ()>,
    mut on_tick: impl FnMut(&mut NetworkManager<H, C, W>) -> ControlFlow<()>,
) where
    H: HostTransport,
    C: ClientTransport,
    W: World,
{
    let mut ticks = interval(tick_interval(tick_rate));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut timer = Timer::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = ticks.tick() => {
                manager.update(timer.lap_ms());
                if on_tick(manager).is_break() {
                    info!("Session ended");
                    break;
                }
            }
        }
    }
}
