//! In-process publish/subscribe hub with bounded event history and isolated
//! subscriber failures (§4.1).
//!
//! Dispatch is synchronous and single-threaded per `publish` call: every registered
//! handler for an event runs in insertion order, on the caller's task, before
//! `publish` returns. Handlers that need to do real async work (mutate actor state,
//! write to disk) do so by forwarding the event onto their own `mpsc` channel from
//! inside a synchronous handler closure — the bus itself never awaits anything.

pub mod events;

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

pub use events::Event;

/// Overall history ring is bounded to 100 entries regardless of how many distinct
/// event names are in play (§4.1, §5 Resource policy).
const HISTORY_CAPACITY: usize = 100;

/// Default `history(event?, limit)` page size when the caller doesn't specify one.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Opaque handle returned by `subscribe`/`subscribe_once`, used to `unsubscribe` one
/// exact handler reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type HandlerFn = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registration {
    id: HandlerId,
    handler: HandlerFn,
    once: bool,
}

/// `{event, payload, timestamp}` as returned by `history` (§4.1).
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub event: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    handlers: HashMap<&'static str, Vec<Registration>>,
    history: VecDeque<HistoryEntry>,
    next_id: u64,
}

/// A process-local publish/subscribe hub. Cheap to clone; every clone shares the same
/// handler table and history ring.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            inner: Arc::new(Mutex::new(Inner {
                handlers: HashMap::new(),
                history: VecDeque::new(),
                next_id: 0,
            })),
        }
    }

    /// Registers `handler` for `event`. Multiple handlers per event are allowed;
    /// insertion order is preserved for dispatch.
    pub fn subscribe<F>(&self, event: &'static str, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(event, handler, false)
    }

    /// `handler` is auto-removed immediately after its first invocation, even if that
    /// invocation panics.
    pub fn subscribe_once<F>(&self, event: &'static str, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(event, handler, true)
    }

    fn register<F>(&self, event: &'static str, handler: F, once: bool) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        inner.next_id += 1;
        let id = HandlerId(inner.next_id);
        inner.handlers.entry(event).or_default().push(Registration {
            id,
            handler: Arc::new(handler),
            once,
        });
        id
    }

    /// Removes one exact handler reference; no-op if not present.
    pub fn unsubscribe(&self, event: &str, id: HandlerId) {
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        if let Some(list) = inner.handlers.get_mut(event) {
            list.retain(|r| r.id != id);
        }
    }

    /// Invokes every registered handler for `event.name()` in insertion order,
    /// synchronously, with the same payload. A handler failure does not prevent
    /// subsequent handlers from running and does not propagate to the publisher;
    /// failures are logged.
    pub fn publish(&self, event: Event) {
        let name = event.name();

        let (to_invoke, once_ids) = {
            let inner = self.inner.lock().expect("event bus mutex poisoned");
            match inner.handlers.get(name) {
                Some(list) => {
                    let once_ids: Vec<HandlerId> =
                        list.iter().filter(|r| r.once).map(|r| r.id).collect();
                    (
                        list.iter().map(|r| (r.id, r.handler.clone())).collect::<Vec<_>>(),
                        once_ids,
                    )
                }
                None => (Vec::new(), Vec::new()),
            }
        };

        self.record_history(name, &event);

        if to_invoke.is_empty() {
            trace!(event = name, "publish: no subscribers");
        }

        for (id, handler) in &to_invoke {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if let Err(panic) = result {
                let reason = panic_message(&panic);
                warn!(event = name, handler = id.0, error = %reason, "event bus handler failed");
            }
        }

        if !once_ids.is_empty() {
            let mut inner = self.inner.lock().expect("event bus mutex poisoned");
            if let Some(list) = inner.handlers.get_mut(name) {
                list.retain(|r| !once_ids.contains(&r.id));
            }
        }
    }

    fn record_history(&self, name: &'static str, event: &Event) {
        let payload = payload_value(event);
        let mut inner = self.inner.lock().expect("event bus mutex poisoned");
        inner.history.push_back(HistoryEntry {
            event: name.to_string(),
            payload,
            timestamp: Utc::now(),
        });
        while inner.history.len() > HISTORY_CAPACITY {
            inner.history.pop_front();
        }
    }

    /// Returns the last `<= limit` entries, optionally filtered by event name.
    pub fn history(&self, event: Option<&str>, limit: usize) -> Vec<HistoryEntry> {
        let inner = self.inner.lock().expect("event bus mutex poisoned");
        let filtered: Vec<&HistoryEntry> = match event {
            Some(name) => inner.history.iter().filter(|e| e.event == name).collect(),
            None => inner.history.iter().collect(),
        };
        let start = filtered.len().saturating_sub(limit);
        filtered[start..].iter().map(|e| (*e).clone()).collect()
    }

    /// Number of live handlers currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        let inner = self.inner.lock().expect("event bus mutex poisoned");
        inner.handlers.get(event).map(Vec::len).unwrap_or(0)
    }

    /// Names of every event with at least one live handler.
    pub fn events(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("event bus mutex poisoned");
        inner
            .handlers
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.to_string())
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn payload_value(event: &Event) -> Value {
    let result = match event {
        Event::HeartbeatSent(p) => serde_json::to_value(p),
        Event::HeartbeatReceived(p) => serde_json::to_value(p),
        Event::HeartbeatFailed(p) => serde_json::to_value(p),
        Event::PulseChanged(p) => serde_json::to_value(p),
        Event::FlatlineDetected(p) => serde_json::to_value(p),
        Event::ServiceRecovered(p) => serde_json::to_value(p),
        Event::AlertTriggered(p) => serde_json::to_value(p),
        Event::ConfigUpdated(p) => serde_json::to_value(p),
    };
    result.unwrap_or(Value::Null)
}
