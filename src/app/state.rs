//! State shared between the simulation loop and the status endpoints

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::net::HostStatus;

/// Latest host snapshot, written by the simulation loop once per tick
pub type SharedStatus = Arc<RwLock<HostStatus>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub status: SharedStatus,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_status(config, SharedStatus::default())
    }

    pub fn with_status(config: Config, status: SharedStatus) -> Self {
        Self {
            config: Arc::new(config),
            status,
        }
    }
}
