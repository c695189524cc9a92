//! Read API response DTOs (§4.9, §6).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::logstore::schema::Summary;
use crate::model::{AlertRecord, Check, PulseStatus, ServiceDescriptor, ServiceState, Tier};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub name: String,
    pub url: String,
    pub tier: Tier,
    pub probe_interval: u64,
    pub status: PulseStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub is_flatlined: bool,
    pub uptime: f64,
    pub http_status: Option<u16>,
}

impl ServiceSnapshot {
    pub fn build(descriptor: &ServiceDescriptor, state: Option<&ServiceState>) -> Self {
        let default_state = ServiceState::default();
        let state = state.unwrap_or(&default_state);
        ServiceSnapshot {
            name: descriptor.name.clone(),
            url: descriptor.url.clone(),
            tier: descriptor.tier,
            probe_interval: descriptor.probe_interval,
            status: state.current_status,
            last_check: state.last_check,
            last_success: state.last_success,
            consecutive_failures: state.consecutive_failures,
            is_flatlined: state.is_flatlined,
            uptime: state.uptime(),
            http_status: state.last_http_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetail {
    #[serde(flatten)]
    pub snapshot: ServiceSnapshot,
    pub checks: Vec<Check>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub service: String,
    pub hours: u64,
    pub entries: Vec<crate::logstore::HistoryItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerResponse {
    pub running: bool,
    pub jobs: Vec<crate::scheduler::ActivityStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertRecord>,
}
