//! Integration tests for the read API: a really-bound server driven with a
//! real `reqwest::Client`, not in-process `tower::ServiceExt` dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pulsewatch::alerts::AlertStore;
use pulsewatch::api::{spawn_api_server, ApiState};
use pulsewatch::broadcaster::Broadcaster;
use pulsewatch::bus::EventBus;
use pulsewatch::engine::ProbeEngine;
use pulsewatch::evaluator::PulseEvaluator;
use pulsewatch::logstore::LogStore;
use pulsewatch::model::{ResolvedTier, StrategyKind, Tier};
use pulsewatch::probe::ProbeStrategyRegistry;
use pulsewatch::scheduler::SchedulerHandle;
use pulsewatch::state::ServiceStateMachine;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{all_tier_thresholds, descriptor};

async fn spawn_test_api() -> (std::net::SocketAddr, MockServer, tempfile::TempDir) {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
        .mount(&upstream)
        .await;

    let bus = EventBus::new();
    let evaluator = PulseEvaluator::new(all_tier_thresholds());
    let desc = descriptor("svc", upstream.uri(), Tier::Standard, "default", StrategyKind::Basic);
    let descriptors = vec![desc];

    let state_machine = ServiceStateMachine::new(bus.clone(), evaluator.clone(), &descriptors);
    state_machine.wire();

    let log_dir = tempfile::tempdir().unwrap();
    let log_store = LogStore::new(log_dir.path(), 24).unwrap();
    log_store.wire(&bus);

    let alert_store = AlertStore::new(bus.clone());
    alert_store.wire();

    let broadcaster = Broadcaster::new(bus.clone());
    broadcaster.wire();

    let engine = ProbeEngine::new(
        bus.clone(),
        ProbeStrategyRegistry::with_defaults(),
        evaluator.clone(),
        reqwest::Client::new(),
    );
    let scheduler = SchedulerHandle::spawn(descriptors.clone(), engine, bus.clone());

    let config_dir = tempfile::tempdir().unwrap();

    let state = ApiState {
        bus,
        scheduler,
        state_machine,
        evaluator,
        log_store,
        alert_store,
        broadcaster,
        descriptors: Arc::new(Mutex::new(descriptors)),
        config_dir: config_dir.path().to_path_buf(),
        audio_enabled: true,
        started_at: chrono::Utc::now(),
    };

    let addr = spawn_api_server(0, state).await.unwrap();
    (addr, upstream, config_dir)
}

#[tokio::test]
async fn health_endpoint_reports_uptime() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["uptime"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn list_services_includes_configured_service() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("http://{addr}/api/services"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let services = body.as_array().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0]["name"], "svc");
}

#[tokio::test]
async fn get_unknown_service_is_404() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/api/services/does-not-exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn trigger_check_runs_probe_and_returns_heartbeat() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/services/svc/check"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["service"], "svc");
    assert_eq!(results[0]["success"], true);
}

#[tokio::test]
async fn alerts_mute_then_unmute_round_trips() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let muted: Value = client
        .post(format!("http://{addr}/api/alerts/mute/svc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(muted["success"], true);

    let unmuted: Value = client
        .post(format!("http://{addr}/api/alerts/unmute/svc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unmuted["success"], true);
}

#[tokio::test]
async fn config_thresholds_post_then_get_round_trips() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/config/thresholds"))
        .json(&serde_json::json!({"healthy": 111, "warning": 222, "degraded": 7}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let fetched: Value = client
        .get(format!("http://{addr}/api/config/thresholds"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // The flat triple round-trips byte-for-byte...
    assert_eq!(fetched["healthy"], 111);
    assert_eq!(fetched["warning"], 222);
    assert_eq!(fetched["degraded"], 7);

    // ...and every tier was updated uniformly underneath it.
    let tiers: HashMap<Tier, ResolvedTier> =
        serde_json::from_value(fetched["tiers"].clone()).unwrap();
    for tier in [Tier::Critical, Tier::Standard, Tier::Low] {
        let tier_config = &tiers[&tier];
        assert_eq!(tier_config.healthy_max_ms, 111);
        assert_eq!(tier_config.warning_max_ms, 222);
        assert_eq!(tier_config.flatline_threshold, 7);
    }
}

#[tokio::test]
async fn config_thresholds_post_with_non_numeric_field_is_400() {
    let (addr, _upstream, _config_dir) = spawn_test_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/config/thresholds"))
        .json(&serde_json::json!({"healthy": "abc", "warning": 500, "degraded": 3}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("healthy"));
}
