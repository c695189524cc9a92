//! Per-service counters, sustained-degradation detection, and flatline/recovery
//! transitions (§4.5). All mutations are serialized through a single mutex-guarded
//! map: the design note's alternative of one task per service was considered (see
//! DESIGN.md) but a shared mutex already gives the required per-service
//! linearizability and keeps the snapshot path (Read API, Broadcaster) lock-free of
//! channel round-trips.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::bus::events::{Event, FlatlineDetected, PulseChanged, ServiceRecovered};
use crate::bus::EventBus;
use crate::evaluator::PulseEvaluator;
use crate::model::{
    flatline_severity, HeartbeatResult, PulseStatus, ResponseHistoryEntry, ServiceDescriptor,
    ServiceState, Tier,
};

#[derive(Clone)]
pub struct ServiceStateMachine {
    bus: EventBus,
    evaluator: PulseEvaluator,
    states: Arc<Mutex<HashMap<String, ServiceState>>>,
    tiers: Arc<Mutex<HashMap<String, Tier>>>,
}

impl ServiceStateMachine {
    pub fn new(bus: EventBus, evaluator: PulseEvaluator, descriptors: &[ServiceDescriptor]) -> Self {
        let tiers = descriptors
            .iter()
            .map(|d| (d.name.clone(), d.tier))
            .collect();

        ServiceStateMachine {
            bus,
            evaluator,
            states: Arc::new(Mutex::new(HashMap::new())),
            tiers: Arc::new(Mutex::new(tiers)),
        }
    }

    /// Subscribes to `heartbeat_failed` and `heartbeat_received`. Must be called once
    /// before the scheduler starts producing events.
    pub fn wire(&self) {
        let on_failure = self.clone();
        self.bus
            .subscribe(Event::HEARTBEAT_FAILED, move |event| {
                if let Event::HeartbeatFailed(heartbeat) = event {
                    on_failure.handle_failure(heartbeat);
                }
            });

        let on_success = self.clone();
        self.bus
            .subscribe(Event::HEARTBEAT_RECEIVED, move |event| {
                if let Event::HeartbeatReceived(heartbeat) = event {
                    on_success.handle_success(heartbeat);
                }
            });
    }

    fn tier_of(&self, service: &str) -> Tier {
        self.tiers
            .lock()
            .expect("tiers lock poisoned")
            .get(service)
            .copied()
            .unwrap_or_default()
    }

    /// Registers a service's tier so lazily-created state uses the right thresholds;
    /// called on config reload when new services are added.
    pub fn register_service(&self, name: impl Into<String>, tier: Tier) {
        self.tiers
            .lock()
            .expect("tiers lock poisoned")
            .insert(name.into(), tier);
    }

    /// Drops a service's state and tier registration, per the "destroyed on... config
    /// reload that drops the service" lifecycle rule (§3).
    pub fn remove_service(&self, name: &str) {
        self.states.lock().expect("states lock poisoned").remove(name);
        self.tiers.lock().expect("tiers lock poisoned").remove(name);
    }

    pub fn snapshot(&self, service: &str) -> Option<ServiceState> {
        self.states
            .lock()
            .expect("states lock poisoned")
            .get(service)
            .cloned()
    }

    pub fn all(&self) -> Vec<(String, ServiceState)> {
        self.states
            .lock()
            .expect("states lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn handle_failure(&self, heartbeat: &HeartbeatResult) {
        let tier = self.tier_of(&heartbeat.service);
        let tier_config = self.evaluator.tier_config(tier);

        let mut states = self.states.lock().expect("states lock poisoned");
        let state = states.entry(heartbeat.service.clone()).or_default();

        state.consecutive_failures += 1;
        state.last_failure = Some(heartbeat.timestamp);
        state.last_check = Some(heartbeat.timestamp);
        state.failure_count += 1;
        state.last_http_status = Some(heartbeat.http_status);

        state.push_history(
            ResponseHistoryEntry {
                timestamp: heartbeat.timestamp,
                latency_ms: heartbeat.response_time_ms,
                status: PulseStatus::Critical,
                is_failure: true,
            },
            tier_config.sustained_count,
        );

        // An upstream HTTP error with a body is an "observable sick" state, not an
        // "unreachable" one, and never contributes to flatline (§7, Open Question 1).
        let counts_toward_flatline = !heartbeat.has_response;

        if counts_toward_flatline
            && state.consecutive_failures >= tier_config.flatline_threshold
            && !state.is_flatlined
        {
            state.is_flatlined = true;
            state.flatline_start_time = Some(heartbeat.timestamp);
            let severity = flatline_severity(state.consecutive_failures);
            let last_success = state.last_success;
            let time_since_last_success_ms =
                last_success.map(|ts| (heartbeat.timestamp - ts).num_milliseconds());

            let service = heartbeat.service.clone();
            let consecutive_failures = state.consecutive_failures;
            drop(states);

            self.bus.publish(Event::FlatlineDetected(FlatlineDetected {
                service,
                consecutive_failures,
                last_success,
                time_since_last_success_ms,
                severity,
                timestamp: heartbeat.timestamp,
            }));

            states = self.states.lock().expect("states lock poisoned");
        }

        let state = states.get_mut(&heartbeat.service).expect("state present");
        if state.is_flatlined && state.current_status != PulseStatus::Flatline {
            let old_status = state.current_status;
            state.current_status = PulseStatus::Flatline;
            let service = heartbeat.service.clone();
            let timestamp = heartbeat.timestamp;
            drop(states);

            self.bus.publish(Event::PulseChanged(PulseChanged {
                service,
                old_status,
                new_status: PulseStatus::Flatline,
                response_time_ms: None,
                timestamp,
            }));
        }
    }

    fn handle_success(&self, heartbeat: &HeartbeatResult) {
        let tier = self.tier_of(&heartbeat.service);
        let tier_config = self.evaluator.tier_config(tier);

        let mut states = self.states.lock().expect("states lock poisoned");
        let state = states.entry(heartbeat.service.clone()).or_default();

        if state.is_flatlined {
            let downtime_ms = state
                .flatline_start_time
                .map(|start| (heartbeat.timestamp - start).num_milliseconds())
                .unwrap_or(0);
            let failure_count = state.consecutive_failures;

            state.is_flatlined = false;
            state.flatline_start_time = None;

            let service = heartbeat.service.clone();
            let timestamp = heartbeat.timestamp;
            drop(states);

            self.bus
                .publish(Event::ServiceRecovered(ServiceRecovered {
                    service,
                    downtime_ms,
                    failure_count,
                    timestamp,
                }));

            states = self.states.lock().expect("states lock poisoned");
        }

        let state = states.get_mut(&heartbeat.service).expect("state present");
        state.consecutive_failures = 0;
        state.success_count += 1;
        state.last_success = Some(heartbeat.timestamp);
        state.last_check = Some(heartbeat.timestamp);
        state.last_http_status = Some(heartbeat.http_status);

        state.push_history(
            ResponseHistoryEntry {
                timestamp: heartbeat.timestamp,
                latency_ms: heartbeat.response_time_ms,
                status: heartbeat.pulse.status,
                is_failure: false,
            },
            tier_config.sustained_count,
        );

        let new_status = match heartbeat.pulse.status {
            PulseStatus::Critical => PulseStatus::Critical,
            PulseStatus::Healthy => PulseStatus::Healthy,
            PulseStatus::Warning => {
                let sustained = tier_config.sustained_count;
                let window: Vec<&ResponseHistoryEntry> =
                    state.response_history.iter().rev().take(sustained).collect();
                let all_sustained_warning = window.len() == sustained
                    && window
                        .iter()
                        .all(|e| !e.is_failure && e.status == PulseStatus::Warning);
                if all_sustained_warning {
                    PulseStatus::Warning
                } else {
                    PulseStatus::Healthy
                }
            }
            PulseStatus::Flatline => PulseStatus::Healthy, // unreachable: evaluator never emits Flatline
        };

        if new_status != state.current_status {
            let old_status = state.current_status;
            state.current_status = new_status;
            let service = heartbeat.service.clone();
            let response_time_ms = Some(heartbeat.response_time_ms);
            let timestamp = heartbeat.timestamp;
            drop(states);

            self.bus.publish(Event::PulseChanged(PulseChanged {
                service,
                old_status,
                new_status,
                response_time_ms,
                timestamp,
            }));
        }
    }
}
