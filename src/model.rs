//! Core domain types shared across the probe, state, log-store and API layers.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service priority class. Controls the flatline threshold and the default probe
/// interval (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    Standard,
    Low,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Standard
    }
}

/// The pluggable means of performing one probe against a service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Basic,
    Authenticated,
    Query,
}

/// A named probe definition on a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    /// Per-check timeout in milliseconds; defaults to 10_000 when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Check {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms.unwrap_or(10_000))
    }
}

/// Static, per-config-reload description of a monitored service (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tier: Tier,
    /// Probe interval in seconds.
    pub probe_interval: u64,
    pub checks: Vec<Check>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Per-tier flatline threshold and latency bounds, resolved from `thresholds.json`
/// defaults plus tier overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTier {
    pub healthy_max_ms: u64,
    pub warning_max_ms: u64,
    pub sustained_count: usize,
    pub flatline_threshold: u32,
}

/// Produced by every probe strategy (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    /// true iff a transport-level response was received, regardless of HTTP status.
    pub has_response: bool,
    pub http_status: u16,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn transport_failure(error: impl Into<String>) -> Self {
        ProbeResult {
            success: false,
            has_response: false,
            http_status: 0,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// `healthy | warning | critical | flatline`. Only the state machine may emit
/// `Flatline`; the pulse evaluator only ever returns the first three (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    Healthy,
    Warning,
    Critical,
    Flatline,
}

/// `(latency, ProbeResult)` classified by the Pulse Evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pulse {
    pub status: PulseStatus,
    pub latency_ms: i64,
}

/// Assembled by the Probe Engine after invoking a strategy and the evaluator (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResult {
    pub service: String,
    pub check: String,
    pub timestamp: DateTime<Utc>,
    pub pulse: Pulse,
    pub response_time_ms: i64,
    pub success: bool,
    pub http_status: u16,
    pub error: Option<String>,
    pub has_response: bool,
}

/// One entry in a service's bounded response history ring (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: i64,
    pub status: PulseStatus,
    pub is_failure: bool,
}

/// Per-service, in-memory authoritative record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceState {
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub current_status: PulseStatus,
    pub is_flatlined: bool,
    pub flatline_start_time: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub failure_count: u64,
    pub response_history: VecDeque<ResponseHistoryEntry>,
    pub last_http_status: Option<u16>,
}

impl ServiceState {
    /// Initial state before any observation: `healthy`, all counters zero.
    pub fn new() -> Self {
        ServiceState {
            consecutive_failures: 0,
            last_success: None,
            last_failure: None,
            last_check: None,
            current_status: PulseStatus::Healthy,
            is_flatlined: false,
            flatline_start_time: None,
            success_count: 0,
            failure_count: 0,
            response_history: VecDeque::new(),
            last_http_status: None,
        }
    }

    /// `successCount / (successCount + failureCount) * 100`, defined as 100 when the
    /// denominator is 0 (§4.5).
    pub fn uptime(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            100.0
        } else {
            (self.success_count as f64 / total as f64) * 100.0
        }
    }

    pub fn push_history(&mut self, entry: ResponseHistoryEntry, sustained_count: usize) {
        self.response_history.push_back(entry);
        while self.response_history.len() > sustained_count.max(1) {
            self.response_history.pop_front();
        }
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Alert severity (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// `degraded | recovery | flatline` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Degraded,
    Recovery,
    Flatline,
}

/// Produced by the status-change observer; retained to a bounded history of 100 (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub kind: AlertKind,
    pub service: String,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Severity scale carried on `flatline_detected` events (§4.5, §9 Design Notes).
/// Derived once, at detection time, from the consecutive-failure count, and never
/// updated while the flatline persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlatlineSeverity {
    Warning,
    Critical,
    Catastrophic,
}

pub fn flatline_severity(consecutive_failures: u32) -> FlatlineSeverity {
    if consecutive_failures >= 10 {
        FlatlineSeverity::Catastrophic
    } else if consecutive_failures >= 5 {
        FlatlineSeverity::Critical
    } else {
        FlatlineSeverity::Warning
    }
}

impl From<FlatlineSeverity> for Severity {
    /// Alert records use the five-point `Severity` scale; flatline detections map onto
    /// it by collapsing `warning` into `medium` since a fresh flatline is notable but
    /// not yet alarming, while `critical`/`catastrophic` carry straight across.
    fn from(value: FlatlineSeverity) -> Self {
        match value {
            FlatlineSeverity::Warning => Severity::Medium,
            FlatlineSeverity::Critical => Severity::High,
            FlatlineSeverity::Catastrophic => Severity::Critical,
        }
    }
}
