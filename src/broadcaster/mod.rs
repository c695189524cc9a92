//! Transport-agnostic fan-out to connected streaming subscribers (§4.8).
//!
//! This module owns only the subscriber set and the event-to-message translation; the
//! actual WebSocket framing lives in `api::websocket`, which drives a [`Broadcaster`]
//! subscription with whatever transport the `api` feature provides.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::events::Event;
use crate::bus::EventBus;

/// Bound on each subscriber's outbound queue. A subscriber that can't keep up is
/// dropped rather than allowed to apply backpressure to the event bus (§4.8, §5).
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// One frame sent to a subscriber: `{type, timestamp, urgent?, data}` (§4.8). Cloned
/// once per live subscriber during fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgent: Option<bool>,
    pub data: Value,
}

impl OutboundMessage {
    fn new(kind: &'static str, data: Value) -> Self {
        OutboundMessage {
            kind,
            timestamp: Utc::now(),
            urgent: None,
            data,
        }
    }

    fn urgent(mut self) -> Self {
        self.urgent = Some(true);
        self
    }
}

struct Inner {
    subscribers: HashMap<SubscriberId, mpsc::Sender<OutboundMessage>>,
    next_id: u64,
}

/// Subscribes to the service-health events and fans them out to every connected
/// subscriber. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    bus: EventBus,
    inner: Arc<Mutex<Inner>>,
}

impl Broadcaster {
    pub fn new(bus: EventBus) -> Self {
        Broadcaster {
            bus,
            inner: Arc::new(Mutex::new(Inner {
                subscribers: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    pub fn wire(&self) {
        let broadcaster = self.clone();
        self.bus.subscribe(Event::HEARTBEAT_RECEIVED, move |event| {
            if let Event::HeartbeatReceived(heartbeat) = event {
                broadcaster.fan_out(OutboundMessage::new(
                    "heartbeat_update",
                    serde_json::to_value(heartbeat).unwrap_or(Value::Null),
                ));
            }
        });

        let broadcaster = self.clone();
        self.bus.subscribe(Event::HEARTBEAT_FAILED, move |event| {
            if let Event::HeartbeatFailed(heartbeat) = event {
                broadcaster.fan_out(OutboundMessage::new(
                    "heartbeat_update",
                    serde_json::to_value(heartbeat).unwrap_or(Value::Null),
                ));
            }
        });

        let broadcaster = self.clone();
        self.bus.subscribe(Event::FLATLINE_DETECTED, move |event| {
            if let Event::FlatlineDetected(payload) = event {
                broadcaster.fan_out(
                    OutboundMessage::new(
                        "flatline",
                        serde_json::to_value(payload).unwrap_or(Value::Null),
                    )
                    .urgent(),
                );
            }
        });

        let broadcaster = self.clone();
        self.bus.subscribe(Event::PULSE_CHANGED, move |event| {
            if let Event::PulseChanged(payload) = event {
                broadcaster.fan_out(OutboundMessage::new(
                    "pulse_changed",
                    serde_json::to_value(payload).unwrap_or(Value::Null),
                ));
            }
        });

        let broadcaster = self.clone();
        self.bus.subscribe(Event::SERVICE_RECOVERED, move |event| {
            if let Event::ServiceRecovered(payload) = event {
                broadcaster.fan_out(OutboundMessage::new(
                    "service_recovered",
                    serde_json::to_value(payload).unwrap_or(Value::Null),
                ));
            }
        });

        let broadcaster = self.clone();
        self.bus.subscribe(Event::ALERT_TRIGGERED, move |event| {
            if let Event::AlertTriggered(alert) = event {
                broadcaster.fan_out(OutboundMessage::new(
                    "alert",
                    serde_json::to_value(alert).unwrap_or(Value::Null),
                ));
            }
        });
    }

    /// Registers a new subscriber and immediately enqueues its `connected` frame.
    /// Returns the id (used for `handle_ping`/`disconnect`) and the receiving half of
    /// its outbound queue.
    pub fn connect(&self) -> (SubscriberId, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = {
            let mut inner = self.inner.lock().expect("broadcaster mutex poisoned");
            inner.next_id += 1;
            let id = SubscriberId(inner.next_id);
            inner.subscribers.insert(id, tx.clone());
            id
        };

        let _ = tx.try_send(OutboundMessage::new(
            "connected",
            serde_json::json!({ "message": "connected" }),
        ));

        (id, rx)
    }

    pub fn disconnect(&self, id: SubscriberId) {
        self.inner
            .lock()
            .expect("broadcaster mutex poisoned")
            .subscribers
            .remove(&id);
    }

    /// Inbound `{type:"ping"}` gets an immediate `pong`; anything else is ignored
    /// (§4.8). Drops the subscriber if its queue is full rather than blocking.
    pub fn handle_ping(&self, id: SubscriberId) {
        let sender = {
            let inner = self.inner.lock().expect("broadcaster mutex poisoned");
            inner.subscribers.get(&id).cloned()
        };
        if let Some(sender) = sender {
            if sender
                .try_send(OutboundMessage::new("pong", Value::Null))
                .is_err()
            {
                self.disconnect(id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("broadcaster mutex poisoned").subscribers.len()
    }

    fn fan_out(&self, message: OutboundMessage) {
        let mut dead = Vec::new();
        {
            let inner = self.inner.lock().expect("broadcaster mutex poisoned");
            for (id, sender) in inner.subscribers.iter() {
                if sender.try_send(message.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut inner = self.inner.lock().expect("broadcaster mutex poisoned");
            for id in dead {
                inner.subscribers.remove(&id);
            }
        }
    }
}
