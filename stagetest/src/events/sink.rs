//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use crate::core::StageEvent;

/// Trait for event sinks that receive stage events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: &StageEvent);

    /// Emits an event without awaiting.
    ///
    /// Must never fail; errors are logged and suppressed.
    fn try_emit(&self, event: &StageEvent);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StageEvent) {}

    fn try_emit(&self, _event: &StageEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
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

    fn log_event(&self, event: &StageEvent) {
        let stage = event.stage().unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                stage = %stage,
                event_data = ?event.data,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                event_type = %event.event_type,
                stage = %stage,
                event_data = ?event.data,
                "Event: {}", event.event_type
            );
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StageEvent) {
        self.log_event(event);
    }
}

/// A sink that keeps every event, for inspecting stage transitions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StageEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
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

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns every event about one stage.
    #[must_use]
    pub fn events_for_stage(&self, stage: &str) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.stage() == Some(stage))
            .cloned()
            .collect()
    }

    /// Returns `(event_type, stage)` pairs in emission order.
    #[must_use]
    pub fn timeline(&self) -> Vec<(String, String)> {
        self.events
            .read()
            .iter()
            .map(|e| (e.event_type.clone(), e.stage().unwrap_or_default().to_string()))
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }
}
