//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::net::HostStatus;
use crate::util::time::uptime_secs;

/// Build the status router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    role: &'static str,
    uptime_secs: u64,
    hosting: bool,
    connected_clients: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.read();

    Json(HealthResponse {
        status: "ok",
        role: state.config.role.as_str(),
        uptime_secs: uptime_secs(),
        hosting: status.running,
        // The host's own record is not a connection
        connected_clients: status.clients.len().saturating_sub(1),
    })
}

// ============================================================================
// Status endpoint
// ============================================================================

async fn status_handler(State(state): State<AppState>) -> Json<HostStatus> {
    Json(state.status.read().clone())
}
