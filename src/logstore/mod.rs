//! Per-service per-day append-only file with summary, bounded retention, and
//! rotation at local midnight (§4.7).

pub mod schema;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::bus::events::Event;
use crate::bus::EventBus;
use crate::model::HeartbeatResult;

use schema::{sanitize_service_name, HeartbeatEntry, LogDocument, LogEventEntry, Summary};

/// One merged, JSON-serializable entry as returned by `history()`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum HistoryItem {
    #[serde(rename = "heartbeat")]
    Heartbeat {
        timestamp: DateTime<Utc>,
        latency_ms: i64,
        status: crate::model::PulseStatus,
        success: bool,
        http_status: u16,
    },
    #[serde(rename = "event")]
    Event {
        timestamp: DateTime<Utc>,
        event_type: String,
        payload: Value,
    },
}

impl HistoryItem {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HistoryItem::Heartbeat { timestamp, .. } => *timestamp,
            HistoryItem::Event { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Clone)]
pub struct LogStore {
    dir: PathBuf,
    retention_hours: u64,
    cache: Arc<Mutex<HashMap<String, LogDocument>>>,
}

impl LogStore {
    /// Creates the log directory synchronously; failure is fatal at startup (§4.7,
    /// §7). Must be called, and must succeed, before the bus subscriptions in
    /// [`LogStore::wire`] are wired.
    pub fn new(dir: impl Into<PathBuf>, retention_hours: u64) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("failed to create log directory {:?}: {e}", dir))?;
        Ok(LogStore {
            dir,
            retention_hours,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Subscribes to `heartbeat_received`, `heartbeat_failed`, `flatline_detected`,
    /// `service_recovered`.
    pub fn wire(&self, bus: &EventBus) {
        let store = self.clone();
        bus.subscribe(Event::HEARTBEAT_RECEIVED, move |event| {
            if let Event::HeartbeatReceived(heartbeat) = event {
                store.on_heartbeat(heartbeat);
            }
        });

        let store = self.clone();
        bus.subscribe(Event::HEARTBEAT_FAILED, move |event| {
            if let Event::HeartbeatFailed(heartbeat) = event {
                store.on_heartbeat(heartbeat);
            }
        });

        let store = self.clone();
        bus.subscribe(Event::FLATLINE_DETECTED, move |event| {
            if let Event::FlatlineDetected(payload) = event {
                store.on_event(&payload.service, "flatline_detected", payload, payload.timestamp);
            }
        });

        let store = self.clone();
        bus.subscribe(Event::SERVICE_RECOVERED, move |event| {
            if let Event::ServiceRecovered(payload) = event {
                store.on_event(&payload.service, "service_recovered", payload, payload.timestamp);
            }
        });
    }

    fn on_heartbeat(&self, heartbeat: &HeartbeatResult) {
        let entry = HeartbeatEntry {
            timestamp: heartbeat.timestamp,
            latency_ms: heartbeat.response_time_ms,
            status: heartbeat.pulse.status,
            success: heartbeat.success,
            http_status: heartbeat.http_status,
        };
        if let Err(e) = self.append_heartbeat(&heartbeat.service, entry) {
            error!(service = %heartbeat.service, error = %e, "log store write failed");
        }
    }

    fn on_event(
        &self,
        service: &str,
        kind: &str,
        payload: &impl Serialize,
        timestamp: DateTime<Utc>,
    ) {
        let entry = LogEventEntry {
            timestamp,
            kind: kind.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        };
        if let Err(e) = self.append_event(service, entry) {
            error!(service, error = %e, "log store write failed");
        }
    }

    fn doc_key(service: &str, date: &str) -> String {
        format!("{}-{}", sanitize_service_name(service), date)
    }

    fn doc_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn today() -> String {
        Local::now().format("%Y-%m-%d").to_string()
    }

    fn load_or_create(&self, service: &str, date: &str) -> anyhow::Result<()> {
        let key = Self::doc_key(service, date);
        let mut cache = self.cache.lock().expect("log store cache poisoned");
        if cache.contains_key(&key) {
            return Ok(());
        }
        let path = self.doc_path(&key);
        let doc = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)
                .unwrap_or_else(|_| LogDocument::new(service, date))
        } else {
            LogDocument::new(service, date)
        };
        cache.insert(key, doc);
        Ok(())
    }

    fn persist(&self, key: &str) -> anyhow::Result<()> {
        let cache = self.cache.lock().expect("log store cache poisoned");
        let doc = cache.get(key).expect("document must be cached before persist");
        let text = serde_json::to_string_pretty(doc)?;
        fs::write(self.doc_path(key), text)?;
        Ok(())
    }

    /// For `heartbeat`: increments check/success/failure counters, updates average
    /// latency, recomputes uptime. For `event`: appends without summary mutation.
    pub fn append_heartbeat(&self, service: &str, entry: HeartbeatEntry) -> anyhow::Result<()> {
        let date = Self::today();
        self.load_or_create(service, &date)?;
        let key = Self::doc_key(service, &date);
        {
            let mut cache = self.cache.lock().expect("log store cache poisoned");
            let doc = cache.get_mut(&key).expect("just loaded");
            doc.append_heartbeat(entry);
        }
        self.persist(&key)
    }

    pub fn append_event(&self, service: &str, entry: LogEventEntry) -> anyhow::Result<()> {
        let date = Self::today();
        self.load_or_create(service, &date)?;
        let key = Self::doc_key(service, &date);
        {
            let mut cache = self.cache.lock().expect("log store cache poisoned");
            let doc = cache.get_mut(&key).expect("just loaded");
            doc.append_event(entry);
        }
        self.persist(&key)
    }

    /// Reads the required daily documents (`ceil(hours/24)` back), filters to entries
    /// newer than `now - hours`, returns entries sorted ascending by timestamp.
    pub fn history(&self, service: &str, hours: u64) -> Vec<HistoryItem> {
        let days_back = (hours as f64 / 24.0).ceil().max(1.0) as i64;
        let cutoff = Utc::now() - ChronoDuration::hours(hours as i64);
        let mut items = Vec::new();

        for offset in 0..days_back {
            let date = (Local::now() - ChronoDuration::days(offset))
                .format("%Y-%m-%d")
                .to_string();
            if self.load_or_create(service, &date).is_err() {
                continue;
            }
            let key = Self::doc_key(service, &date);
            let cache = self.cache.lock().expect("log store cache poisoned");
            if let Some(doc) = cache.get(&key) {
                for h in &doc.heartbeats {
                    if h.timestamp >= cutoff {
                        items.push(HistoryItem::Heartbeat {
                            timestamp: h.timestamp,
                            latency_ms: h.latency_ms,
                            status: h.status,
                            success: h.success,
                            http_status: h.http_status,
                        });
                    }
                }
                for e in &doc.events {
                    if e.timestamp >= cutoff {
                        items.push(HistoryItem::Event {
                            timestamp: e.timestamp,
                            event_type: e.kind.clone(),
                            payload: e.payload.clone(),
                        });
                    }
                }
            }
        }

        items.sort_by_key(|i| i.timestamp());
        items
    }

    /// Returns today's summary, or a zero-initialized summary (uptime=100) if the
    /// service has no document for today.
    pub fn summary(&self, service: &str) -> Summary {
        let date = Self::today();
        let key = Self::doc_key(service, &date);
        {
            let cache = self.cache.lock().expect("log store cache poisoned");
            if let Some(doc) = cache.get(&key) {
                return doc.summary.clone();
            }
        }
        if self.load_or_create(service, &date).is_ok() {
            let cache = self.cache.lock().expect("log store cache poisoned");
            if let Some(doc) = cache.get(&key) {
                return doc.summary.clone();
            }
        }
        Summary::zero()
    }

    /// Deletes files whose mtime is older than the retention window; evicts the
    /// matching cache entry for every file removed.
    pub fn rotate(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "log store rotate: cannot read directory");
                return;
            }
        };

        let cutoff = std::time::SystemTime::now()
            - std::time::Duration::from_secs(self.retention_hours * 3600);

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified < cutoff {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = ?path, error = %e, "log store rotate: failed to remove file");
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    self.cache
                        .lock()
                        .expect("log store cache poisoned")
                        .remove(stem);
                }
                info!(path = ?path, "log store rotated out expired file");
            }
        }
    }

    /// Spawns the background task that runs `rotate()` at the next local midnight and
    /// every 24 hours thereafter.
    pub fn spawn_rotation(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let initial = Self::duration_until_next_midnight();
            tokio::time::sleep(initial).await;
            loop {
                self.rotate();
                tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
            }
        })
    }

    fn duration_until_next_midnight() -> std::time::Duration {
        let now = Local::now();
        let tomorrow_midnight = (now.date_naive() + ChronoDuration::days(1))
            .and_hms_opt(0, 0, 0)
            .expect("valid time");
        let next = Local
            .from_local_datetime(&tomorrow_midnight)
            .single()
            .unwrap_or_else(|| now + ChronoDuration::days(1));
        (next - now).to_std().unwrap_or(std::time::Duration::from_secs(24 * 3600))
    }
}
