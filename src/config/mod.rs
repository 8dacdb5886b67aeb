//! Configuration module - environment variable parsing

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::game::entity::{GameMode, Team, MIN_TIME_BETWEEN_FIRES_MS};
use crate::util::time::DEFAULT_TICK_RATE;

/// Well-known UDP port of the game
pub const DEFAULT_PORT: u16 = 27388;

/// Which side of the session this process runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
        }
    }
}

/// Host session settings
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Capacity of the client table, the host's own record included
    pub max_clients: usize,
    /// Ticks between two state broadcasts
    pub broadcast_period: u32,
    pub mode: GameMode,
    /// Map announced to joining clients
    pub map_name: String,
    /// Name of the host's own player
    pub player_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_clients: 10,
            broadcast_period: 3,
            mode: GameMode::Deathmatch,
            map_name: "arena".to_string(),
            player_name: String::new(),
        }
    }
}

/// Client session settings
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub player_name: String,
    /// Team requested in team mode
    pub team: Team,
    /// Wait after connecting before the first handshake request
    pub settle_delay: Duration,
    /// Minimum gap between two fire requests
    pub fire_request_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_name: String::new(),
            team: 0,
            settle_delay: Duration::from_millis(500),
            fire_request_interval: Duration::from_millis((MIN_TIME_BETWEEN_FIRES_MS - 50) as u64),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub role: Role,
    /// UDP bind address
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Host to join; `None` means discover on the local network
    pub connect: Option<SocketAddr>,
    /// Where the host serves `/health` and `/status`
    pub status_addr: Option<SocketAddr>,
    /// Upper bound on waiting for the disconnect flush
    pub shutdown_grace: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub host: HostConfig,
    pub client: ClientConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let role = match lookup("ARENA_ROLE").as_deref() {
            None | Some("host") => Role::Host,
            Some("client") => Role::Client,
            Some(other) => return Err(ConfigError::invalid("ARENA_ROLE", other)),
        };

        let mode = match lookup("ARENA_MODE").as_deref() {
            None | Some("deathmatch") => GameMode::Deathmatch,
            Some("team") => GameMode::TeamRounds,
            Some(other) => return Err(ConfigError::invalid("ARENA_MODE", other)),
        };

        let port: u16 = parse_or(&lookup, "ARENA_PORT", DEFAULT_PORT)?;

        let connect = match lookup("ARENA_CONNECT") {
            None => None,
            Some(raw) => Some(parse_endpoint(&raw, port).ok_or_else(|| ConfigError::invalid("ARENA_CONNECT", &raw))?),
        };

        let status_addr = match lookup("ARENA_STATUS_ADDR") {
            None => None,
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| ConfigError::invalid("ARENA_STATUS_ADDR", &raw))?,
            ),
        };

        let player_name = lookup("ARENA_PLAYER_NAME").unwrap_or_default();
        if player_name.len() > u8::MAX as usize {
            return Err(ConfigError::invalid("ARENA_PLAYER_NAME", &player_name));
        }

        let max_clients: usize = parse_or(&lookup, "ARENA_MAX_CLIENTS", 10)?;
        if max_clients == 0 {
            return Err(ConfigError::invalid("ARENA_MAX_CLIENTS", "0"));
        }
        let broadcast_period: u32 = parse_or(&lookup, "ARENA_BROADCAST_PERIOD", 3)?;
        if broadcast_period == 0 {
            return Err(ConfigError::invalid("ARENA_BROADCAST_PERIOD", "0"));
        }

        let host = HostConfig {
            max_clients,
            broadcast_period,
            mode,
            map_name: lookup("ARENA_MAP").unwrap_or_else(|| "arena".to_string()),
            player_name: player_name.clone(),
        };

        let client = ClientConfig {
            player_name,
            team: parse_or(&lookup, "ARENA_TEAM", 0)?,
            ..ClientConfig::default()
        };

        Ok(Self {
            role,
            bind_addr: parse_or(&lookup, "ARENA_BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port,
            tick_rate: parse_or(&lookup, "ARENA_TICK_RATE", DEFAULT_TICK_RATE)?,
            connect,
            status_addr,
            shutdown_grace: Duration::from_millis(parse_or(&lookup, "ARENA_SHUTDOWN_GRACE_MS", 100)?),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            host,
            client,
        })
    }

    /// Socket address the transport binds
    pub fn bind_socket(&self) -> SocketAddr {
        match self.role {
            Role::Host => SocketAddr::new(self.bind_addr, self.port),
            // Clients take any free port
            Role::Client => SocketAddr::new(self.bind_addr, 0),
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::invalid(key, &raw)),
    }
}

/// `ip` or `ip:port`
fn parse_endpoint(raw: &str, default_port: u16) -> Option<SocketAddr> {
    raw.parse::<SocketAddr>()
        .ok()
        .or_else(|| raw.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, default_port)))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
        }
    }
}
