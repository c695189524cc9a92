//! `GET /api/history/:name?hours=N` (§4.9).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::HistoryResponse;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_hours")]
    pub hours: u64,
}

fn default_hours() -> u64 {
    24
}

pub async fn get_history(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    state
        .descriptor(&name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown service '{name}'")))?;

    let entries = state.log_store.history(&name, query.hours);
    Ok(Json(HistoryResponse {
        service: name,
        hours: query.hours,
        entries,
    }))
}
