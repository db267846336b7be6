//! Event sink trait and implementations.

use super::{EventKind, PipelineEvent};
use crate::utils::format_timestamp;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Trait for sinks that receive lifecycle events.
///
/// `publish` must never block or panic; errors are the sink's to swallow.
pub trait EventSink: Send + Sync {
    /// Publishes an event.
    fn publish(&self, event: &PipelineEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn publish(&self, _event: &PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// Failures are always logged at `WARN`, everything else at the configured
/// level.
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
}

impl EventSink for LoggingEventSink {
    fn publish(&self, event: &PipelineEvent) {
        let stage = event.stage.as_deref().unwrap_or("-");
        let task = event.task.as_deref().unwrap_or("-");
        let at = format_timestamp(&event.at);
        if matches!(event.kind, EventKind::StageFailed | EventKind::TaskFailed) {
            warn!(pipeline = %event.pipeline, stage, task, at = %at, data = %event.data, "Event: {}", event.kind);
        } else if self.level == Level::DEBUG {
            debug!(pipeline = %event.pipeline, stage, task, at = %at, data = %event.data, "Event: {}", event.kind);
        } else {
            info!(pipeline = %event.pipeline, stage, task, at = %at, data = %event.data, "Event: {}", event.kind);
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
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

    /// Returns events of one kind, in publication order.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Position of the first event matching `kind` and `stage`.
    #[must_use]
    pub fn position(&self, kind: EventKind, stage: &str) -> Option<usize> {
        self.events
            .read()
            .iter()
            .position(|e| e.kind == kind && e.stage.as_deref() == Some(stage))
    }
}

impl EventSink for CollectingEventSink {
    fn publish(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
