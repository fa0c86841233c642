//! JSON API handlers for statistics and health

use axum::extract::State;
use axum::response::Json;
use chrono::Utc;
use lotus_core::streaming::StatsSnapshot;
use serde_json::json;

use crate::server::AppState;

pub async fn api_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.engine.stats().snapshot())
}

pub async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.engine.stats().snapshot();
    let uptime = Utc::now().signed_duration_since(snapshot.started_at);

    Json(json!({
        "status": "ok",
        "uptime_seconds": uptime.num_seconds(),
        "active_transfers": snapshot.active_transfers,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
