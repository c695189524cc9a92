//! Shared handles bundled behind axum's `State` extractor (§4.9).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::alerts::AlertStore;
use crate::broadcaster::Broadcaster;
use crate::bus::EventBus;
use crate::evaluator::PulseEvaluator;
use crate::logstore::LogStore;
use crate::model::ServiceDescriptor;
use crate::scheduler::SchedulerHandle;
use crate::state::ServiceStateMachine;

#[derive(Clone)]
pub struct ApiState {
    pub bus: EventBus,
    pub scheduler: SchedulerHandle,
    pub state_machine: ServiceStateMachine,
    pub evaluator: PulseEvaluator,
    pub log_store: LogStore,
    pub alert_store: AlertStore,
    pub broadcaster: Broadcaster,
    pub descriptors: Arc<Mutex<Vec<ServiceDescriptor>>>,
    pub config_dir: PathBuf,
    pub audio_enabled: bool,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn descriptor(&self, name: &str) -> Option<ServiceDescriptor> {
        self.descriptors
            .lock()
            .expect("descriptors lock poisoned")
            .iter()
            .find(|d| d.name == name)
            .cloned()
    }

    pub fn all_descriptors(&self) -> Vec<ServiceDescriptor> {
        self.descriptors
            .lock()
            .expect("descriptors lock poisoned")
            .clone()
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
