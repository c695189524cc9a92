//! `GET /api/alerts`, `POST /api/alerts/mute/:name`, `POST /api/alerts/unmute/:name`
//! (§4.9, §8).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::state::ApiState;
use crate::api::types::{AlertsResponse, MessageResponse};

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        alerts: state.alert_store.history(query.limit),
    })
}

pub async fn mute_alert(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Json<MessageResponse> {
    state.alert_store.mute(&name);
    Json(MessageResponse {
        success: true,
        message: format!("{name} muted"),
    })
}

pub async fn unmute_alert(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Json<MessageResponse> {
    state.alert_store.unmute(&name);
    Json(MessageResponse {
        success: true,
        message: format!("{name} unmuted"),
    })
}
