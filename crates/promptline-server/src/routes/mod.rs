//! HTTP route handlers.

pub mod sessions;

use crate::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len(),
    })
}

/// The `/api` routes, without middleware.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(sessions::list).post(sessions::start))
        .route("/sessions/{id}", get(sessions::get).delete(sessions::remove))
        .route("/sessions/{id}/wait", post(sessions::wait_for_output))
        .route("/sessions/{id}/input", post(sessions::send_command))
        .route("/sessions/{id}/exit", post(sessions::exit))
        .route("/sessions/{id}/transcript", get(sessions::transcript))
        .route("/health", get(health))
}

/// Full application router with state applied.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new().nest("/api", api_router()).with_state(state)
}
