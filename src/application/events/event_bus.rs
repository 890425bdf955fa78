//! Event Bus for broadcasting EVSE events to subscribers
//!
//! Two kinds of consumers are supported: async subscribers reading from a
//! tokio broadcast channel, and synchronous [`EventSink`]s invoked inline on
//! publish. A failing or panicking sink is logged and skipped; publishing
//! itself never fails.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::events::{Event, EventMessage};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
#[error("Event sink {sink} failed: {message}")]
pub struct SinkError {
    pub sink: String,
    pub message: String,
}

impl SinkError {
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// Synchronous event consumer (billing hook, status cache, audit log, ...)
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;
    fn deliver(&self, message: &EventMessage) -> Result<(), SinkError>;
}

/// Event bus for broadcasting events to all subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn publish(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let evse_id = message.event.evse_id().clone();

        self.deliver_to_sinks(&message);

        match self.sender.send(message) {
            Ok(count) => {
                debug!(event_type, %evse_id, subscribers = count, "Event published");
            }
            Err(_) => {
                debug!(event_type, %evse_id, "Event published (no subscribers)");
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.publish(event);
        }
    }

    fn deliver_to_sinks(&self, message: &EventMessage) {
        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.read().clone();
        for sink in sinks {
            match catch_unwind(AssertUnwindSafe(|| sink.deliver(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(sink = sink.name(), error = %e, "Event sink delivery failed");
                }
                Err(_) => {
                    warn!(sink = sink.name(), "Event sink panicked during delivery");
                }
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        let count = self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(total = count, "New event subscriber");

        EventSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        info!(sink = sink.name(), "Event sink registered");
        self.sinks.write().push(sink);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event subscriber that receives events from the bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "Subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(missed = count, "Subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<EventMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        debug!(remaining = prev.saturating_sub(1), "Event subscriber disconnected");
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

/// Create a shared event bus
pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
