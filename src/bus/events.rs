//! Tagged union of event kinds flowing through the [`super::EventBus`], one variant per
//! event name, each with a statically declared payload shape (§9 Design Notes).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{AlertRecord, FlatlineSeverity, HeartbeatResult, PulseStatus};

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatSent {
    pub service: String,
    pub check: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PulseChanged {
    pub service: String,
    pub old_status: PulseStatus,
    pub new_status: PulseStatus,
    pub response_time_ms: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlatlineDetected {
    pub service: String,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub time_since_last_success_ms: Option<i64>,
    pub severity: FlatlineSeverity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceRecovered {
    pub service: String,
    pub downtime_ms: i64,
    pub failure_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigUpdated {
    pub service: String,
    pub field: String,
    pub value: serde_json::Value,
}

/// One entry in the tagged union dispatched through `publish`. The `name()` of each
/// variant is the stable wire-contract string used by `subscribe`/`history` (§4.1,
/// §9 — implicit coupling via string event names is preserved as the wire contract).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    #[serde(rename = "heartbeat_sent")]
    HeartbeatSent(HeartbeatSent),
    #[serde(rename = "heartbeat_received")]
    HeartbeatReceived(HeartbeatResult),
    #[serde(rename = "heartbeat_failed")]
    HeartbeatFailed(HeartbeatResult),
    #[serde(rename = "pulse_changed")]
    PulseChanged(PulseChanged),
    #[serde(rename = "flatline_detected")]
    FlatlineDetected(FlatlineDetected),
    #[serde(rename = "service_recovered")]
    ServiceRecovered(ServiceRecovered),
    #[serde(rename = "alert_triggered")]
    AlertTriggered(AlertRecord),
    #[serde(rename = "config_updated")]
    ConfigUpdated(ConfigUpdated),
}

impl Event {
    pub const HEARTBEAT_SENT: &'static str = "heartbeat_sent";
    pub const HEARTBEAT_RECEIVED: &'static str = "heartbeat_received";
    pub const HEARTBEAT_FAILED: &'static str = "heartbeat_failed";
    pub const PULSE_CHANGED: &'static str = "pulse_changed";
    pub const FLATLINE_DETECTED: &'static str = "flatline_detected";
    pub const SERVICE_RECOVERED: &'static str = "service_recovered";
    pub const ALERT_TRIGGERED: &'static str = "alert_triggered";
    pub const CONFIG_UPDATED: &'static str = "config_updated";

    /// The stable event name used as the subscription / history key.
    pub fn name(&self) -> &'static str {
        match self {
            Event::HeartbeatSent(_) => Self::HEARTBEAT_SENT,
            Event::HeartbeatReceived(_) => Self::HEARTBEAT_RECEIVED,
            Event::HeartbeatFailed(_) => Self::HEARTBEAT_FAILED,
            Event::PulseChanged(_) => Self::PULSE_CHANGED,
            Event::FlatlineDetected(_) => Self::FLATLINE_DETECTED,
            Event::ServiceRecovered(_) => Self::SERVICE_RECOVERED,
            Event::AlertTriggered(_) => Self::ALERT_TRIGGERED,
            Event::ConfigUpdated(_) => Self::CONFIG_UPDATED,
        }
    }
}
