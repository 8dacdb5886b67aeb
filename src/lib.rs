//! Tank arena network synchronization engine
//!
//! One peer hosts the authoritative match; clients connect over UDP, walk a
//! three-step snapshot handshake and then mirror the host's world from
//! periodic position ticks and event announcements.
//!
//! - [`protocol`]: message types and the byte codec
//! - [`game`]: entity indices, reconciliation, statistics and the world seam
//! - [`net`]: transports plus the host and client sessions
//! - [`app`]: the network manager and its tick loops

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod net;
pub mod protocol;
pub mod util;
