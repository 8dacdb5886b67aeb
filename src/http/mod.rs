//! Status endpoints for a running host

pub mod routes;

pub use routes::build_router;
