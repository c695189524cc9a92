//! `GET /api/health` (§4.9).

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime: state.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
