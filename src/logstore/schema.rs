//! On-disk document shape for the per-service, per-day log file (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::PulseStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEntry {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: i64,
    pub status: PulseStatus,
    pub success: bool,
    pub http_status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEventEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub check_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_response_time_ms: f64,
    pub uptime: f64,
}

impl Summary {
    /// Zero-initialized summary used when a service has no document for the day yet
    /// (§4.7 `summary`).
    pub fn zero() -> Self {
        Summary {
            check_count: 0,
            success_count: 0,
            failure_count: 0,
            avg_response_time_ms: 0.0,
            uptime: 100.0,
        }
    }

    /// Folds one more heartbeat outcome into the running summary. Average latency is
    /// computed over successful entries with positive latency only (§4.7 `append`).
    fn record_heartbeat(&mut self, success: bool, latency_ms: i64) {
        self.check_count += 1;
        if success {
            self.success_count += 1;
            if latency_ms > 0 {
                let prior_successes_with_latency = self.success_count.saturating_sub(1) as f64;
                let total = self.avg_response_time_ms * prior_successes_with_latency + latency_ms as f64;
                let denom = prior_successes_with_latency + 1.0;
                self.avg_response_time_ms = total / denom;
            }
        } else {
            self.failure_count += 1;
        }
        let total = self.success_count + self.failure_count;
        self.uptime = if total == 0 {
            100.0
        } else {
            (self.success_count as f64 / total as f64) * 100.0
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDocument {
    pub service: String,
    pub date: String,
    pub heartbeats: Vec<HeartbeatEntry>,
    pub events: Vec<LogEventEntry>,
    pub summary: Summary,
}

impl LogDocument {
    pub fn new(service: impl Into<String>, date: impl Into<String>) -> Self {
        LogDocument {
            service: service.into(),
            date: date.into(),
            heartbeats: Vec::new(),
            events: Vec::new(),
            summary: Summary::zero(),
        }
    }

    pub fn append_heartbeat(&mut self, entry: HeartbeatEntry) {
        self.summary.record_heartbeat(entry.success, entry.latency_ms);
        self.heartbeats.push(entry);
    }

    pub fn append_event(&mut self, entry: LogEventEntry) {
        self.events.push(entry);
    }
}

/// `sanitize = replace(/\s+/, "_")` (§4.7 Addressing).
pub fn sanitize_service_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_whitespace_runs_to_single_underscore() {
        assert_eq!(sanitize_service_name("my   service name"), "my_service_name");
        assert_eq!(sanitize_service_name("svc"), "svc");
    }

    #[test]
    fn summary_average_latency_only_counts_successes() {
        let mut summary = Summary::zero();
        summary.record_heartbeat(true, 100);
        summary.record_heartbeat(false, 50);
        summary.record_heartbeat(true, 300);

        assert_eq!(summary.check_count, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert!((summary.avg_response_time_ms - 200.0).abs() < f64::EPSILON);
        assert!((summary.uptime - (2.0 / 3.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_summary_has_full_uptime() {
        let summary = Summary::zero();
        assert_eq!(summary.uptime, 100.0);
    }
}
