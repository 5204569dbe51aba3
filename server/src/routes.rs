use axum::{extract::State, routing::get, Json, Router};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /api/health: liveness plus a few gauges.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.connections.len(),
        "stages": state.theatre.stage_count(),
        "members": state.theatre.member_count(),
    }))
}

/// Build the axum Router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/api/health", get(health))
        .with_state(state)
}
