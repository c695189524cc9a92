//! Two-phase configuration: raw JSON shapes deserialized from the config directory,
//! resolved into the runtime forms the engine actually consumes (§12).

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use tracing::trace;

use crate::model::{Check, ResolvedTier, ServiceDescriptor, StrategyKind, Tier};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawCheck {
    pub name: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawService {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tier: Tier,
    #[serde(rename = "heartbeatInterval")]
    pub heartbeat_interval: u64,
    pub checks: Vec<RawCheck>,
    #[serde(default, rename = "authToken")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServicesFile {
    pub services: Vec<RawService>,
}

impl ServicesFile {
    /// Resolves each raw check's `timeout` (seconds, as written by operators) to the
    /// evaluator's millisecond-resolution default of 10_000ms when absent.
    pub fn resolve(self) -> Vec<ServiceDescriptor> {
        self.services
            .into_iter()
            .map(|service| ServiceDescriptor {
                name: service.name,
                url: service.url,
                tier: service.tier,
                probe_interval: service.heartbeat_interval,
                checks: service
                    .checks
                    .into_iter()
                    .map(|check| Check {
                        name: check.name,
                        strategy: check.strategy,
                        query: check.query,
                        variables: check.variables,
                        timeout_ms: check.timeout.map(|secs| secs * 1000),
                    })
                    .collect(),
                auth_token: service.auth_token,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawHealthyBand {
    #[serde(rename = "max")]
    pub max: u64,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawWarningBand {
    #[serde(rename = "max")]
    pub max: u64,
    #[serde(rename = "sustainedCount")]
    pub sustained_count: Option<usize>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawCriticalBand {
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: Option<u32>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawThresholdBand {
    pub healthy: Option<RawHealthyBand>,
    pub warning: Option<RawWarningBand>,
    pub critical: Option<RawCriticalBand>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ThresholdsFile {
    pub default: RawThresholdBand,
    #[serde(default)]
    pub tiers: HashMap<String, RawThresholdBand>,
}

/// Hardcoded fallback when a `thresholds.json` supplies no `default` band at all for a
/// given field (the file format requires `default` to be present, but individual bands
/// within it are all optional).
const FALLBACK_HEALTHY_MAX_MS: u64 = 200;
const FALLBACK_WARNING_MAX_MS: u64 = 500;
const FALLBACK_SUSTAINED_COUNT: usize = 3;
const FALLBACK_FLATLINE_THRESHOLD: u32 = 3;

impl ThresholdsFile {
    /// Merges `default` with any `tiers.<tier>` override for each of the three known
    /// tiers, producing a fully-populated entry per tier regardless of how sparse the
    /// file is.
    pub fn resolve(self) -> anyhow::Result<HashMap<Tier, ResolvedTier>> {
        for name in self.tiers.keys() {
            if !matches!(name.as_str(), "critical" | "standard" | "low") {
                anyhow::bail!("thresholds.json: unknown tier name '{name}'");
            }
        }

        let mut resolved = HashMap::new();
        for (tier, key) in [
            (Tier::Critical, "critical"),
            (Tier::Standard, "standard"),
            (Tier::Low, "low"),
        ] {
            let overlay = self.tiers.get(key).cloned().unwrap_or_default();
            resolved.insert(
                tier,
                ResolvedTier {
                    healthy_max_ms: overlay
                        .healthy
                        .map(|h| h.max)
                        .or(self.default.healthy.as_ref().map(|h| h.max))
                        .unwrap_or(FALLBACK_HEALTHY_MAX_MS),
                    warning_max_ms: overlay
                        .warning
                        .as_ref()
                        .map(|w| w.max)
                        .or(self.default.warning.as_ref().map(|w| w.max))
                        .unwrap_or(FALLBACK_WARNING_MAX_MS),
                    sustained_count: overlay
                        .warning
                        .as_ref()
                        .and_then(|w| w.sustained_count)
                        .or(self
                            .default
                            .warning
                            .as_ref()
                            .and_then(|w| w.sustained_count))
                        .unwrap_or(FALLBACK_SUSTAINED_COUNT),
                    flatline_threshold: overlay
                        .critical
                        .as_ref()
                        .and_then(|c| c.consecutive_failures)
                        .or(self
                            .default
                            .critical
                            .as_ref()
                            .and_then(|c| c.consecutive_failures))
                        .unwrap_or(FALLBACK_FLATLINE_THRESHOLD),
                },
            );
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawServerSettings {
    pub port: u16,
    #[serde(rename = "websocketPort")]
    pub websocket_port: Option<u16>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawMonitoringSettings {
    #[serde(rename = "logPath")]
    pub log_path: String,
    #[serde(rename = "historyRetention")]
    pub history_retention_hours: u64,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawAlertSettings {
    #[serde(default)]
    pub audio: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerSettingsFile {
    pub server: RawServerSettings,
    pub monitoring: RawMonitoringSettings,
    #[serde(default)]
    pub alerts: RawAlertSettings,
}

/// Runtime server settings after CLI overrides (`--port`, `--log-dir`) are applied on
/// top of `config.json` (§10, §12).
#[derive(Debug, Clone)]
pub struct ResolvedServerSettings {
    pub port: u16,
    pub websocket_port: Option<u16>,
    pub log_path: String,
    pub history_retention_hours: u64,
    pub audio_enabled: bool,
}

impl ServerSettingsFile {
    pub fn resolve(self) -> ResolvedServerSettings {
        ResolvedServerSettings {
            port: self.server.port,
            websocket_port: self.server.websocket_port,
            log_path: self.monitoring.log_path,
            history_retention_hours: self.monitoring.history_retention_hours,
            audio_enabled: self.alerts.audio,
        }
    }
}

/// Reads and parses one JSON config file, chaining context through `anyhow` so a
/// startup failure reports which file and what went wrong (§12).
pub fn read_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("parsing config file {} as JSON", path.display()))?;
    trace!(path = %path.display(), "loaded config file");
    Ok(value)
}

/// Loads `services.json`, `thresholds.json`, `config.json` from `config_dir`, applying
/// the `--port`/`--log-dir` CLI overrides to the server settings (§10 step 2).
pub fn load_all(
    config_dir: &Path,
    port_override: Option<u16>,
    log_dir_override: Option<String>,
) -> anyhow::Result<(
    Vec<ServiceDescriptor>,
    HashMap<Tier, ResolvedTier>,
    ResolvedServerSettings,
)> {
    let services: ServicesFile = read_config_file(&config_dir.join("services.json"))
        .context("loading services.json")?;
    let thresholds: ThresholdsFile = read_config_file(&config_dir.join("thresholds.json"))
        .context("loading thresholds.json")?;
    let server: ServerSettingsFile = read_config_file(&config_dir.join("config.json"))
        .context("loading config.json")?;

    let descriptors = services.resolve();
    let resolved_thresholds = thresholds.resolve().context("resolving thresholds.json")?;
    let mut resolved_server = server.resolve();

    if let Some(port) = port_override {
        resolved_server.port = port;
    }
    if let Some(log_dir) = log_dir_override {
        resolved_server.log_path = log_dir;
    }

    Ok((descriptors, resolved_thresholds, resolved_server))
}
