//! End-to-end wiring: probe engine -> evaluator -> state machine -> log store ->
//! broadcaster, driven against a real (mocked) upstream.

use pulsewatch::alerts::AlertStore;
use pulsewatch::broadcaster::Broadcaster;
use pulsewatch::bus::EventBus;
use pulsewatch::engine::ProbeEngine;
use pulsewatch::evaluator::PulseEvaluator;
use pulsewatch::logstore::LogStore;
use pulsewatch::model::{StrategyKind, Tier};
use pulsewatch::probe::ProbeStrategyRegistry;
use pulsewatch::state::ServiceStateMachine;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{descriptor, thresholds_with};

#[tokio::test]
async fn flatline_then_recovery_reaches_log_store_and_broadcaster() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
        .mount(&server)
        .await;

    let bus = EventBus::new();
    let evaluator = PulseEvaluator::new(thresholds_with(Tier::Critical, 200, 500, 2));
    let engine = ProbeEngine::new(
        bus.clone(),
        ProbeStrategyRegistry::with_defaults(),
        evaluator.clone(),
        reqwest::Client::new(),
    );
    let desc = descriptor("svc", server.uri(), Tier::Critical, "default", StrategyKind::Basic);

    let state_machine = ServiceStateMachine::new(bus.clone(), evaluator, std::slice::from_ref(&desc));
    state_machine.wire();

    let log_dir = tempfile::tempdir().unwrap();
    let log_store = LogStore::new(log_dir.path(), 24).unwrap();
    log_store.wire(&bus);

    let alert_store = AlertStore::new(bus.clone());
    alert_store.wire();

    let broadcaster = Broadcaster::new(bus.clone());
    broadcaster.wire();
    let (_id, mut outbound) = broadcaster.connect();
    assert_eq!(outbound.recv().await.unwrap().kind, "connected");

    let check = desc.checks[0].clone();

    // Transport failures #1, #2 trip the flatline at threshold 2.
    engine.run_probe(&desc, &check).await;
    engine.run_probe(&desc, &check).await;
    assert!(state_machine.snapshot("svc").unwrap().is_flatlined);

    // Third probe succeeds, triggering recovery.
    engine.run_probe(&desc, &check).await;
    assert!(!state_machine.snapshot("svc").unwrap().is_flatlined);

    // The flatline and recovery each fan out through a chain of nested bus
    // publishes (flatline/recovery -> alert -> broadcaster), so the exact
    // interleaving with the plain heartbeat_update frames isn't load-bearing;
    // only the per-kind counts are.
    let mut kinds = Vec::new();
    for _ in 0..9 {
        kinds.push(outbound.recv().await.unwrap().kind);
    }
    assert_eq!(kinds.iter().filter(|k| **k == "heartbeat_update").count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == "alert").count(), 2);
    assert_eq!(kinds.iter().filter(|k| **k == "flatline").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "service_recovered").count(), 1);
    assert_eq!(kinds.iter().filter(|k| **k == "pulse_changed").count(), 2);

    let history = log_store.history("svc", 1);
    assert_eq!(
        history.len(),
        5,
        "three heartbeats plus flatline_detected and service_recovered event entries"
    );

    let alerts = alert_store.history(10);
    assert!(alerts.iter().any(|a| matches!(a.kind, pulsewatch::model::AlertKind::Flatline)));
    assert!(alerts.iter().any(|a| matches!(a.kind, pulsewatch::model::AlertKind::Recovery)));
}
