//! Orchestration events for observers.
//!
//! The engine emits one [`OrchestrationEvent`] per lifecycle step of an
//! execution. Sinks decide what to do with them: drop, log, collect for
//! tests, or fan out to streaming clients.

mod event;
mod sink;

pub use event::{event_types, OrchestrationEvent};
pub use sink::{BroadcastEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
