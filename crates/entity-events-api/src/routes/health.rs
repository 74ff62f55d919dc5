//! Liveness endpoint.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Body of GET /health.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: &'static str,
    /// Crate version of the server.
    pub version: &'static str,
    /// Instance whose queue this server publishes to.
    pub instance_id: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        instance_id: state.sink.instance_id().to_owned(),
    })
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
