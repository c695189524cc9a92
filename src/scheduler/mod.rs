//! Per-service periodic tickers, on-demand trigger, pause/resume, and graceful
//! shutdown (§4.6).
//!
//! Each `(service, check)` pair owns one task running a strictly sequential
//! tick-probe-sleep loop. Because a tick is never issued until the previous probe for
//! that pair has finished (bounded by the check's own timeout), an overlapping tick
//! cannot occur within a pair — this is the chosen resolution of §4.6's
//! skip-vs-coalesce open question: ticks are effectively skipped by construction
//! rather than requiring a separate in-flight flag. Different services' tasks run
//! fully concurrently and a stuck one cannot delay another (§4.6 failure isolation).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::bus::events::{ConfigUpdated, Event};
use crate::bus::EventBus;
use crate::engine::ProbeEngine;
use crate::model::{HeartbeatResult, ServiceDescriptor};

/// `{key, nextInvocation}` as returned by `statuses()` (§4.6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatus {
    pub key: String,
    pub next_invocation: DateTime<Utc>,
}

/// Initial per-activity delay before the first probe, chosen to avoid a synchronized
/// thundering herd across many services starting at once (§4.6).
const INITIAL_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

struct Activity {
    task: JoinHandle<()>,
    next_invocation: Arc<Mutex<DateTime<Utc>>>,
    interval_secs: Arc<AtomicU64>,
}

enum Command {
    Start,
    Stop(oneshot::Sender<()>),
    UpdateInterval {
        service: String,
        seconds: u64,
    },
    Pause(String),
    Resume(String),
    Trigger {
        service: String,
        reply: oneshot::Sender<Vec<HeartbeatResult>>,
    },
    Statuses(oneshot::Sender<Vec<ActivityStatus>>),
    IsRunning(oneshot::Sender<bool>),
}

struct SchedulerActor {
    rx: mpsc::Receiver<Command>,
    engine: ProbeEngine,
    bus: EventBus,
    descriptors: HashMap<String, ServiceDescriptor>,
    activities: HashMap<(String, String), Activity>,
    paused: HashSet<String>,
    started: bool,
}

impl SchedulerActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Start => self.start(),
                Command::Stop(ack) => {
                    self.stop().await;
                    let _ = ack.send(());
                    break;
                }
                Command::UpdateInterval { service, seconds } => {
                    self.update_interval(&service, seconds);
                }
                Command::Pause(service) => self.pause(&service),
                Command::Resume(service) => self.resume(&service),
                Command::Trigger { service, reply } => {
                    let results = self.trigger(&service).await;
                    let _ = reply.send(results);
                }
                Command::Statuses(reply) => {
                    let _ = reply.send(self.statuses());
                }
                Command::IsRunning(reply) => {
                    let _ = reply.send(self.started);
                }
            }
        }
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let names: Vec<String> = self.descriptors.keys().cloned().collect();
        for name in names {
            self.spawn_service_activities(&name);
        }
        info!(services = self.descriptors.len(), "scheduler started");
    }

    fn spawn_service_activities(&mut self, service_name: &str) {
        if self.paused.contains(service_name) {
            return;
        }
        let Some(descriptor) = self.descriptors.get(service_name).cloned() else {
            return;
        };
        for check in descriptor.checks.clone() {
            let key = (descriptor.name.clone(), check.name.clone());
            if self.activities.contains_key(&key) {
                continue;
            }
            let interval_secs = Arc::new(AtomicU64::new(descriptor.probe_interval.max(1)));
            let next_invocation = Arc::new(Mutex::new(Utc::now() + ChronoDuration::seconds(1)));
            let engine = self.engine.clone();
            let service = descriptor.clone();
            let interval_for_task = interval_secs.clone();
            let next_for_task = next_invocation.clone();

            let task = tokio::spawn(async move {
                tokio::time::sleep(INITIAL_DELAY).await;
                loop {
                    engine.run_probe(&service, &check).await;
                    let secs = interval_for_task.load(Ordering::Relaxed).max(1);
                    *next_for_task.lock().expect("next_invocation poisoned") =
                        Utc::now() + ChronoDuration::seconds(secs as i64);
                    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                }
            });

            self.activities.insert(
                key,
                Activity {
                    task,
                    next_invocation,
                    interval_secs,
                },
            );
        }
    }

    async fn stop(&mut self) {
        for (_, activity) in self.activities.drain() {
            activity.task.abort();
            let _ = activity.task.await;
        }
        self.started = false;
        info!("scheduler stopped");
    }

    #[instrument(skip(self))]
    fn update_interval(&mut self, service: &str, seconds: u64) {
        if let Some(descriptor) = self.descriptors.get_mut(service) {
            descriptor.probe_interval = seconds;
        } else {
            warn!(service, "update_interval: unknown service");
            return;
        }
        for ((svc, _check), activity) in self.activities.iter() {
            if svc == service {
                activity.interval_secs.store(seconds, Ordering::Relaxed);
            }
        }
        self.bus.publish(Event::ConfigUpdated(ConfigUpdated {
            service: service.to_string(),
            field: "probeInterval".to_string(),
            value: serde_json::json!(seconds),
        }));
    }

    fn pause(&mut self, service: &str) {
        self.paused.insert(service.to_string());
        let keys: Vec<(String, String)> = self
            .activities
            .keys()
            .filter(|(svc, _)| svc == service)
            .cloned()
            .collect();
        for key in keys {
            if let Some(activity) = self.activities.remove(&key) {
                activity.task.abort();
            }
        }
        info!(service, "service paused");
    }

    fn resume(&mut self, service: &str) {
        self.paused.remove(service);
        self.spawn_service_activities(service);
        info!(service, "service resumed");
    }

    async fn trigger(&self, service: &str) -> Vec<HeartbeatResult> {
        let Some(descriptor) = self.descriptors.get(service) else {
            return Vec::new();
        };
        let futures = descriptor
            .checks
            .iter()
            .map(|check| self.engine.run_probe(descriptor, check));
        futures::future::join_all(futures).await
    }

    fn statuses(&self) -> Vec<ActivityStatus> {
        self.activities
            .iter()
            .map(|((service, check), activity)| ActivityStatus {
                key: format!("{service}:{check}"),
                next_invocation: *activity.next_invocation.lock().expect("poisoned"),
            })
            .collect()
    }
}

/// Typed handle to the scheduler actor, matching the teacher repo's actor/handle
/// convention: cheap to clone, every method round-trips through the actor's command
/// channel.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    pub fn spawn(descriptors: Vec<ServiceDescriptor>, engine: ProbeEngine, bus: EventBus) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let actor = SchedulerActor {
            rx,
            engine,
            bus,
            descriptors: descriptors.into_iter().map(|d| (d.name.clone(), d)).collect(),
            activities: HashMap::new(),
            paused: HashSet::new(),
            started: false,
        };
        tokio::spawn(actor.run());
        SchedulerHandle { tx }
    }

    /// Idempotent; begins periodic execution for every configured `(service, check)`.
    pub async fn start(&self) {
        let _ = self.tx.send(Command::Start).await;
    }

    /// Cancels all pending and in-flight periodic activities; blocks until none
    /// remain.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Stop(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub async fn update_interval(&self, service: impl Into<String>, seconds: u64) {
        let _ = self
            .tx
            .send(Command::UpdateInterval {
                service: service.into(),
                seconds,
            })
            .await;
    }

    pub async fn pause_service(&self, service: impl Into<String>) {
        let _ = self.tx.send(Command::Pause(service.into())).await;
    }

    pub async fn resume_service(&self, service: impl Into<String>) {
        let _ = self.tx.send(Command::Resume(service.into())).await;
    }

    /// Runs every check for `service` once immediately, concurrently across checks of
    /// the same service, without displacing periodic cadence.
    pub async fn trigger_check(&self, service: impl Into<String>) -> Vec<HeartbeatResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let service = service.into();
        if self
            .tx
            .send(Command::Trigger {
                service,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn statuses(&self) -> Vec<ActivityStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Statuses(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// `true` once `start()` has run and before `stop()` completes; backs `GET
    /// /api/scheduler`'s `running` field.
    pub async fn is_running(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::IsRunning(reply_tx)).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}
