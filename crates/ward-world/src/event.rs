//! Event hub: push channel from the simulation to subscribed clients.
//!
//! Events describe what happened during a committed tick. Delivery is
//! best effort and happens outside the atomic commit: losing an event on
//! a crash or a slow consumer is acceptable, ordering within one
//! subscriber matches emission order.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Per-subscriber channel capacity. A subscriber that falls this far
/// behind starts losing events.
const SUBSCRIBER_BUFFER: usize = 256;

/// One event as it goes over the wire: `{"message": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub message: String,
}

impl Event {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// What the hub does with emitted events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EventMode {
    /// Fan out to subscribers.
    #[default]
    Broadcast,
    /// Only log; no delivery. For headless and test deployments.
    LoggingOnly,
}

/// Fan-out point between the tick executor and event consumers.
pub struct EventHub {
    mode: EventMode,
    subscribers: RwLock<Vec<Sender<Event>>>,
    closed: AtomicBool,
}

impl EventHub {
    #[must_use]
    pub fn new(mode: EventMode) -> Self {
        Self {
            mode,
            subscribers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a subscriber. The receiver disconnects when the hub
    /// closes.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_BUFFER);
        if !self.closed.load(Ordering::SeqCst) {
            self.subscribers.write().push(tx);
        }
        rx
    }

    /// Deliver a committed tick's events. Slow subscribers lose events,
    /// disconnected ones are dropped.
    pub fn emit_batch(&self, events: &[Event]) {
        if events.is_empty() || self.closed.load(Ordering::SeqCst) {
            return;
        }
        match self.mode {
            EventMode::LoggingOnly => {
                for event in events {
                    tracing::info!(message = %event.message, "event");
                }
            }
            EventMode::Broadcast => {
                let mut subscribers = self.subscribers.write();
                subscribers.retain(|tx| {
                    for event in events {
                        match tx.try_send(event.clone()) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::debug!("dropping event for slow subscriber");
                            }
                            Err(TrySendError::Disconnected(_)) => return false,
                        }
                    }
                    true
                });
            }
        }
    }

    /// Close the hub and disconnect every subscriber. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.subscribers.write().clear();
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
