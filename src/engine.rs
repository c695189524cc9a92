//! Orchestrates one probe: emits lifecycle events, invokes a strategy, classifies the
//! outcome, and routes the resulting event onto the bus (§4.4).

use std::time::Instant;

use chrono::Utc;

use crate::bus::events::{Event, HeartbeatSent};
use crate::bus::EventBus;
use crate::evaluator::PulseEvaluator;
use crate::model::{Check, HeartbeatResult, ProbeResult, Pulse, PulseStatus, ServiceDescriptor};
use crate::probe::ProbeStrategyRegistry;

#[derive(Clone)]
pub struct ProbeEngine {
    bus: EventBus,
    registry: ProbeStrategyRegistry,
    evaluator: PulseEvaluator,
    client: reqwest::Client,
}

impl ProbeEngine {
    pub fn new(
        bus: EventBus,
        registry: ProbeStrategyRegistry,
        evaluator: PulseEvaluator,
        client: reqwest::Client,
    ) -> Self {
        ProbeEngine {
            bus,
            registry,
            evaluator,
            client,
        }
    }

    /// Runs steps 1-8 of §4.4 for one `(service, check)` pair and returns the
    /// assembled result. Always emits exactly one outcome event (`heartbeat_received`
    /// or `heartbeat_failed`) in addition to the leading `heartbeat_sent`.
    pub async fn run_probe(&self, service: &ServiceDescriptor, check: &Check) -> HeartbeatResult {
        let timestamp = Utc::now();
        self.bus.publish(Event::HeartbeatSent(HeartbeatSent {
            service: service.name.clone(),
            check: check.name.clone(),
            timestamp,
        }));

        let start = Instant::now();

        let Some(strategy) = self.registry.get(check.strategy) else {
            let result = self.finish(
                service,
                check,
                start.elapsed().as_millis() as i64,
                ProbeResult::transport_failure(format!("unknown strategy {:?}", check.strategy)),
                Some(PulseStatus::Flatline),
            );
            return result;
        };

        let client = self.client.clone();
        let service_owned = service.clone();
        let check_owned = check.clone();
        let probe_outcome = tokio::spawn(async move {
            strategy.probe(&client, &service_owned, &check_owned).await
        })
        .await;

        let latency_ms = start.elapsed().as_millis() as i64;

        let (result, forced_status) = match probe_outcome {
            Ok(result) => (result, None),
            Err(join_err) => (
                ProbeResult::transport_failure(format!("strategy panicked: {join_err}")),
                Some(PulseStatus::Flatline),
            ),
        };

        self.finish(service, check, latency_ms, result, forced_status)
    }

    fn finish(
        &self,
        service: &ServiceDescriptor,
        check: &Check,
        latency_ms: i64,
        result: ProbeResult,
        forced_status: Option<PulseStatus>,
    ) -> HeartbeatResult {
        let pulse = match forced_status {
            Some(status) => Pulse { status, latency_ms },
            None => self.evaluator.evaluate(service.tier, latency_ms, &result),
        };

        let timestamp = Utc::now();
        let heartbeat = HeartbeatResult {
            service: service.name.clone(),
            check: check.name.clone(),
            timestamp,
            pulse,
            response_time_ms: latency_ms,
            success: result.success,
            http_status: result.http_status,
            error: result.error,
            has_response: result.has_response,
        };

        // A non-2xx response with a body is a failure but not a flatline candidate;
        // the state machine distinguishes transport loss from upstream error via
        // `has_response`.
        if heartbeat.success && heartbeat.http_status == 200 {
            self.bus
                .publish(Event::HeartbeatReceived(heartbeat.clone()));
        } else {
            self.bus.publish(Event::HeartbeatFailed(heartbeat.clone()));
        }

        heartbeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolvedTier, StrategyKind, Tier};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn thresholds() -> HashMap<Tier, ResolvedTier> {
        let mut map = HashMap::new();
        map.insert(
            Tier::Standard,
            ResolvedTier {
                healthy_max_ms: 200,
                warning_max_ms: 500,
                sustained_count: 3,
                flatline_threshold: 3,
            },
        );
        map
    }

    fn service(url: String) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "svc".into(),
            url,
            tier: Tier::Standard,
            probe_interval: 60,
            checks: vec![],
            auth_token: None,
        }
    }

    fn check() -> Check {
        Check {
            name: "health".into(),
            strategy: StrategyKind::Basic,
            query: None,
            variables: None,
            timeout_ms: Some(2000),
        }
    }

    #[tokio::test]
    async fn routes_received_on_200_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
            .mount(&server)
            .await;

        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(0));
        let failed = Arc::new(Mutex::new(0));
        let r = received.clone();
        bus.subscribe(Event::HEARTBEAT_RECEIVED, move |_| *r.lock().unwrap() += 1);
        let f = failed.clone();
        bus.subscribe(Event::HEARTBEAT_FAILED, move |_| *f.lock().unwrap() += 1);

        let engine = ProbeEngine::new(
            bus,
            ProbeStrategyRegistry::with_defaults(),
            PulseEvaluator::new(thresholds()),
            reqwest::Client::new(),
        );

        let result = engine.run_probe(&service(server.uri()), &check()).await;

        assert!(result.success);
        assert_eq!(*received.lock().unwrap(), 1);
        assert_eq!(*failed.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn routes_failed_on_non_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let bus = EventBus::new();
        let failed = Arc::new(Mutex::new(0));
        let f = failed.clone();
        bus.subscribe(Event::HEARTBEAT_FAILED, move |_| *f.lock().unwrap() += 1);

        let engine = ProbeEngine::new(
            bus,
            ProbeStrategyRegistry::with_defaults(),
            PulseEvaluator::new(thresholds()),
            reqwest::Client::new(),
        );

        let result = engine.run_probe(&service(server.uri()), &check()).await;

        assert!(!result.success);
        assert!(result.has_response);
        assert_eq!(*failed.lock().unwrap(), 1);
    }
}
