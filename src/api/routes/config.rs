//! `GET /api/config*`, `POST /api/config/services`, `POST /api/config/thresholds`
//! (§4.9, §12).

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::MessageResponse;
use crate::config::{RawCheck, RawService, ServicesFile};
use crate::model::{ResolvedTier, ServiceDescriptor, StrategyKind, Tier};

pub async fn get_config(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(json!({
        "services": state.all_descriptors(),
        "thresholds": state.evaluator.all_thresholds(),
        "audio": state.audio_enabled,
    }))
}

pub async fn get_config_services(State(state): State<ApiState>) -> Json<Vec<ServiceDescriptor>> {
    Json(state.all_descriptors())
}

/// Surfaces the flat `{healthy, warning, degraded}` triple a caller last posted
/// (derived from the tier every `POST` applies it to uniformly) alongside the full
/// resolved per-tier map, so a `POST` followed by this `GET` round-trips the posted
/// fields byte-for-byte (§8).
#[derive(Debug, Serialize)]
pub struct ThresholdsResponse {
    pub healthy: u64,
    pub warning: u64,
    pub degraded: u32,
    pub tiers: HashMap<Tier, ResolvedTier>,
}

pub async fn get_config_thresholds(State(state): State<ApiState>) -> Json<ThresholdsResponse> {
    let tiers = state.evaluator.all_thresholds();
    let representative = tiers.get(&Tier::default()).or_else(|| tiers.values().next());
    let (healthy, warning, degraded) = representative
        .map(|t| (t.healthy_max_ms, t.warning_max_ms, t.flatline_threshold))
        .unwrap_or((0, 0, 0));
    Json(ThresholdsResponse {
        healthy,
        warning,
        degraded,
        tiers,
    })
}

#[derive(Debug, Serialize)]
struct AudioResponse {
    audio: bool,
}

pub async fn get_config_audio(State(state): State<ApiState>) -> Json<AudioResponse> {
    Json(AudioResponse {
        audio: state.audio_enabled,
    })
}

#[derive(Debug, Deserialize)]
pub struct PostedServices {
    pub services: Vec<PostedService>,
}

#[derive(Debug, Deserialize)]
pub struct PostedService {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tier: Tier,
    #[serde(rename = "heartbeatInterval")]
    pub heartbeat_interval: u64,
    pub checks: Vec<PostedCheck>,
    #[serde(default, rename = "authToken")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostedCheck {
    pub name: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Validates the posted array and persists it to `services.json`. Does not
/// hot-reload the running scheduler's intervals (§12, Open Question 3) — the
/// response communicates that a restart is required for the new set to take effect.
pub async fn post_config_services(
    State(state): State<ApiState>,
    Json(body): Json<PostedServices>,
) -> ApiResult<Json<MessageResponse>> {
    if body.services.is_empty() {
        return Err(ApiError::InvalidRequest(
            "services array must not be empty".into(),
        ));
    }

    let file = ServicesFile {
        services: body
            .services
            .into_iter()
            .map(|s| RawService {
                name: s.name,
                url: s.url,
                tier: s.tier,
                heartbeat_interval: s.heartbeat_interval,
                checks: s
                    .checks
                    .into_iter()
                    .map(|c| RawCheck {
                        name: c.name,
                        strategy: c.strategy,
                        query: c.query,
                        variables: c.variables,
                        timeout: c.timeout,
                    })
                    .collect(),
                auth_token: s.auth_token,
            })
            .collect(),
    };

    let text = serde_json::to_string_pretty(&RawServicesForDisk {
        services: &file.services,
    })
    .map_err(|e| ApiError::Internal(e.into()))?;
    std::fs::write(state.config_dir.join("services.json"), text)
        .map_err(|e| ApiError::Internal(e.into()))?;

    let descriptors: Vec<ServiceDescriptor> = file.resolve();
    *state.descriptors.lock().expect("descriptors lock poisoned") = descriptors;

    Ok(Json(MessageResponse {
        success: true,
        message: "services.json updated; restart required for interval changes to take effect"
            .into(),
    }))
}

#[derive(Serialize)]
struct RawServicesForDisk<'a> {
    services: &'a [RawService],
}

impl Serialize for RawService {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Shadow<'a> {
            name: &'a str,
            url: &'a str,
            tier: Tier,
            heartbeat_interval: u64,
            checks: &'a [RawCheck],
            #[serde(skip_serializing_if = "Option::is_none")]
            auth_token: &'a Option<String>,
        }
        Shadow {
            name: &self.name,
            url: &self.url,
            tier: self.tier,
            heartbeat_interval: self.heartbeat_interval,
            checks: &self.checks,
            auth_token: &self.auth_token,
        }
        .serialize(serializer)
    }
}

impl Serialize for RawCheck {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Shadow<'a> {
            name: &'a str,
            strategy: StrategyKind,
            #[serde(skip_serializing_if = "Option::is_none")]
            query: &'a Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            variables: &'a Option<serde_json::Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            timeout: &'a Option<u64>,
        }
        Shadow {
            name: &self.name,
            strategy: self.strategy,
            query: &self.query,
            variables: &self.variables,
            timeout: &self.timeout,
        }
        .serialize(serializer)
    }
}

/// `{healthy, warning, degraded}` applied uniformly across all three tiers —
/// `sustainedCount` per tier is left untouched.
#[derive(Debug)]
pub struct PostedThresholds {
    pub healthy: u64,
    pub warning: u64,
    pub degraded: u32,
}

impl PostedThresholds {
    /// Parses from a generic JSON value rather than deriving `Deserialize` directly
    /// on the body, because axum's `Json<T>` extractor turns a wrong-typed field into
    /// a 422 (`JsonDataError`); §4.9/§6 require a 400 for non-numeric input, so each
    /// field is checked here and reported via `ApiError::InvalidRequest`.
    fn from_json(body: &Value) -> ApiResult<Self> {
        let healthy = body
            .get("healthy")
            .and_then(Value::as_u64)
            .ok_or_else(|| ApiError::InvalidRequest("healthy must be a non-negative integer".into()))?;
        let warning = body
            .get("warning")
            .and_then(Value::as_u64)
            .ok_or_else(|| ApiError::InvalidRequest("warning must be a non-negative integer".into()))?;
        let degraded = body
            .get("degraded")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ApiError::InvalidRequest("degraded must be a non-negative integer".into()))?;

        Ok(PostedThresholds {
            healthy,
            warning,
            degraded,
        })
    }
}

pub async fn post_config_thresholds(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<MessageResponse>> {
    let body = PostedThresholds::from_json(&body)?;

    let mut thresholds = state.evaluator.all_thresholds();
    for tier in [Tier::Critical, Tier::Standard, Tier::Low] {
        let entry = thresholds.entry(tier).or_insert(ResolvedTier {
            healthy_max_ms: body.healthy,
            warning_max_ms: body.warning,
            sustained_count: 3,
            flatline_threshold: body.degraded,
        });
        entry.healthy_max_ms = body.healthy;
        entry.warning_max_ms = body.warning;
        entry.flatline_threshold = body.degraded;
    }
    state.evaluator.update_thresholds(thresholds.clone());

    let text = serde_json::to_string_pretty(&json!({
        "default": {
            "healthy": { "max": body.healthy },
            "warning": { "max": body.warning },
            "critical": { "consecutiveFailures": body.degraded },
        },
        "tiers": {},
    }))
    .map_err(|e| ApiError::Internal(e.into()))?;
    std::fs::write(state.config_dir.join("thresholds.json"), text)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(MessageResponse {
        success: true,
        message: "thresholds hot-applied and persisted".into(),
    }))
}
