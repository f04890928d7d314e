//! Event sink trait and implementations.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, Level};

use super::OrchestrationEvent;

/// Trait for event sinks that can receive events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: OrchestrationEvent);

    /// Tries to emit an event without blocking.
    ///
    /// This method must never fail. Errors are logged but suppressed.
    fn try_emit(&self, event: OrchestrationEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: OrchestrationEvent) {}

    fn try_emit(&self, _event: OrchestrationEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level to use.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &OrchestrationEvent) {
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                execution_id = %event.execution_id,
                subject_id = %event.subject_id,
                event_data = ?event.data,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                event_type = %event.event_type,
                execution_id = %event.execution_id,
                subject_id = %event.subject_id,
                event_data = ?event.data,
                "Event: {}", event.event_type
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: OrchestrationEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: OrchestrationEvent) {
        self.log_event(&event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<OrchestrationEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<OrchestrationEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.is_a(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: OrchestrationEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: OrchestrationEvent) {
        self.events.write().push(event);
    }
}

/// Fans events out to any number of subscribers.
///
/// Bridges the engine to streaming clients (SSE, pub/sub). Slow
/// subscribers lag and lose the oldest events; the engine never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<OrchestrationEvent>,
}

impl BroadcastEventSink {
    /// Creates a sink buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, event: OrchestrationEvent) {
        self.try_emit(event);
    }

    fn try_emit(&self, event: OrchestrationEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}
