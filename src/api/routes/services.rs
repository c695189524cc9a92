//! `GET /api/services`, `GET /api/services/:name`, `POST /api/services/:name/check`
//! (§4.9).

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{ServiceDetail, ServiceSnapshot};
use crate::model::HeartbeatResult;

pub async fn list_services(State(state): State<ApiState>) -> Json<Vec<ServiceSnapshot>> {
    let descriptors = state.all_descriptors();
    let snapshots = descriptors
        .iter()
        .map(|d| ServiceSnapshot::build(d, state.state_machine.snapshot(&d.name).as_ref()))
        .collect();
    Json(snapshots)
}

pub async fn get_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceDetail>> {
    let descriptor = state
        .descriptor(&name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown service '{name}'")))?;

    let snapshot = ServiceSnapshot::build(&descriptor, state.state_machine.snapshot(&name).as_ref());
    let summary = state.log_store.summary(&name);

    Ok(Json(ServiceDetail {
        snapshot,
        checks: descriptor.checks,
        summary,
    }))
}

pub async fn trigger_check(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<HeartbeatResult>>> {
    state
        .descriptor(&name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown service '{name}'")))?;

    let results = state.scheduler.trigger_check(&name).await;
    Ok(Json(results))
}
