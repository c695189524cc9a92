//! Produces human-facing [`AlertRecord`]s from status-change events and tracks a
//! per-service mute set (§3, §6, §8).

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::bus::events::Event;
use crate::bus::EventBus;
use crate::model::{AlertKind, AlertRecord, PulseStatus, Severity};

/// Alert history ring is bounded to 100 entries regardless of service (§5 Resource
/// policy).
const ALERT_HISTORY_CAPACITY: usize = 100;

struct Inner {
    history: VecDeque<AlertRecord>,
    muted: HashSet<String>,
}

/// Subscribes to `pulse_changed`, `flatline_detected`, `service_recovered` and turns
/// each into an `AlertRecord`, published back onto the bus as `alert_triggered`.
/// Muted services still produce alerts for `history`/`alert_triggered`; muting only
/// affects how a consumer (e.g. the broadcaster) should present them, matching the
/// `isMuted` query used independently of alert generation (§6, §8).
#[derive(Clone)]
pub struct AlertStore {
    bus: EventBus,
    inner: Arc<Mutex<Inner>>,
}

impl AlertStore {
    pub fn new(bus: EventBus) -> Self {
        AlertStore {
            bus,
            inner: Arc::new(Mutex::new(Inner {
                history: VecDeque::new(),
                muted: HashSet::new(),
            })),
        }
    }

    pub fn wire(&self) {
        let store = self.clone();
        self.bus.subscribe(Event::PULSE_CHANGED, move |event| {
            if let Event::PulseChanged(payload) = event {
                store.on_pulse_changed(payload);
            }
        });

        let store = self.clone();
        self.bus.subscribe(Event::FLATLINE_DETECTED, move |event| {
            if let Event::FlatlineDetected(payload) = event {
                store.on_flatline_detected(payload);
            }
        });

        let store = self.clone();
        self.bus.subscribe(Event::SERVICE_RECOVERED, move |event| {
            if let Event::ServiceRecovered(payload) = event {
                store.on_service_recovered(payload);
            }
        });
    }

    fn on_pulse_changed(&self, payload: &crate::bus::events::PulseChanged) {
        // `flatline_detected`/`service_recovered` already cover the flatline↔healthy
        // transition with richer context; only degrade on warning/critical here to
        // avoid double-reporting the same transition twice.
        let (kind, severity, message) = match payload.new_status {
            PulseStatus::Warning => (
                AlertKind::Degraded,
                Severity::Low,
                format!("{} degraded to warning", payload.service),
            ),
            PulseStatus::Critical => (
                AlertKind::Degraded,
                Severity::High,
                format!("{} degraded to critical", payload.service),
            ),
            PulseStatus::Healthy if payload.old_status != PulseStatus::Flatline => (
                AlertKind::Recovery,
                Severity::Info,
                format!("{} recovered to healthy", payload.service),
            ),
            _ => return,
        };
        self.record(AlertRecord {
            kind,
            service: payload.service.clone(),
            severity,
            message,
            timestamp: payload.timestamp,
        });
    }

    fn on_flatline_detected(&self, payload: &crate::bus::events::FlatlineDetected) {
        self.record(AlertRecord {
            kind: AlertKind::Flatline,
            service: payload.service.clone(),
            severity: payload.severity.into(),
            message: format!(
                "{} has flatlined after {} consecutive failures",
                payload.service, payload.consecutive_failures
            ),
            timestamp: payload.timestamp,
        });
    }

    fn on_service_recovered(&self, payload: &crate::bus::events::ServiceRecovered) {
        self.record(AlertRecord {
            kind: AlertKind::Recovery,
            service: payload.service.clone(),
            severity: Severity::Info,
            message: format!(
                "{} recovered after {}ms of downtime",
                payload.service, payload.downtime_ms
            ),
            timestamp: payload.timestamp,
        });
    }

    fn record(&self, alert: AlertRecord) {
        {
            let mut inner = self.inner.lock().expect("alert store mutex poisoned");
            inner.history.push_back(alert.clone());
            while inner.history.len() > ALERT_HISTORY_CAPACITY {
                inner.history.pop_front();
            }
        }
        self.bus.publish(Event::AlertTriggered(alert));
    }

    /// Most recent `<= limit` alerts, newest last.
    pub fn history(&self, limit: usize) -> Vec<AlertRecord> {
        let inner = self.inner.lock().expect("alert store mutex poisoned");
        let start = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(start).cloned().collect()
    }

    pub fn mute(&self, service: &str) {
        self.inner
            .lock()
            .expect("alert store mutex poisoned")
            .muted
            .insert(service.to_string());
    }

    pub fn unmute(&self, service: &str) {
        self.inner
            .lock()
            .expect("alert store mutex poisoned")
            .muted
            .remove(service);
    }

    pub fn is_muted(&self, service: &str) -> bool {
        self.inner
            .lock()
            .expect("alert store mutex poisoned")
            .muted
            .contains(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::events::{FlatlineDetected, PulseChanged, ServiceRecovered};
    use crate::model::FlatlineSeverity;

    #[test]
    fn pulse_changed_to_critical_records_degraded_alert() {
        let bus = EventBus::new();
        let store = AlertStore::new(bus.clone());
        store.wire();

        bus.publish(Event::PulseChanged(PulseChanged {
            service: "svc".into(),
            old_status: PulseStatus::Healthy,
            new_status: PulseStatus::Critical,
            response_time_ms: Some(900),
            timestamp: Utc::now(),
        }));

        let history = store.history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, AlertKind::Degraded);
        assert_eq!(history[0].severity, Severity::High);
    }

    #[test]
    fn flatline_detected_maps_severity_through_from_impl() {
        let bus = EventBus::new();
        let store = AlertStore::new(bus.clone());
        store.wire();

        bus.publish(Event::FlatlineDetected(FlatlineDetected {
            service: "svc".into(),
            consecutive_failures: 12,
            last_success: None,
            time_since_last_success_ms: Some(60_000),
            severity: FlatlineSeverity::Catastrophic,
            timestamp: Utc::now(),
        }));

        let history = store.history(10);
        assert_eq!(history[0].kind, AlertKind::Flatline);
        assert_eq!(history[0].severity, Severity::Critical);
    }

    #[test]
    fn service_recovered_records_recovery_alert() {
        let bus = EventBus::new();
        let store = AlertStore::new(bus.clone());
        store.wire();

        bus.publish(Event::ServiceRecovered(ServiceRecovered {
            service: "svc".into(),
            downtime_ms: 42_000,
            failure_count: 7,
            timestamp: Utc::now(),
        }));

        let history = store.history(10);
        assert_eq!(history[0].kind, AlertKind::Recovery);
    }

    #[test]
    fn history_is_capped_at_100() {
        let bus = EventBus::new();
        let store = AlertStore::new(bus.clone());
        for i in 0..150 {
            store.record(AlertRecord {
                kind: AlertKind::Degraded,
                service: format!("svc-{i}"),
                severity: Severity::Low,
                message: "test".into(),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(store.history(1000).len(), ALERT_HISTORY_CAPACITY);
        assert_eq!(store.history(1000).first().unwrap().service, "svc-50");
    }

    #[test]
    fn mute_then_unmute_is_idempotent_round_trip() {
        let bus = EventBus::new();
        let store = AlertStore::new(bus);

        // Starting unmuted.
        assert!(!store.is_muted("svc"));
        store.mute("svc");
        store.unmute("svc");
        assert!(!store.is_muted("svc"));

        // Starting already muted.
        store.mute("svc");
        store.mute("svc");
        store.unmute("svc");
        assert!(!store.is_muted("svc"));
    }
}
