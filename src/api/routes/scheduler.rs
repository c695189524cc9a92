//! `GET /api/scheduler` (§4.9).

use axum::extract::State;
use axum::Json;

use crate::api::state::ApiState;
use crate::api::types::SchedulerResponse;

pub async fn get_scheduler(State(state): State<ApiState>) -> Json<SchedulerResponse> {
    let running = state.scheduler.is_running().await;
    let jobs = state.scheduler.statuses().await;
    Json(SchedulerResponse { running, jobs })
}
