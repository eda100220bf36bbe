//! Event collector for testing.
//!
//! `EventCollector` accumulates events for later inspection and assertion.

use parking_lot::Mutex;

use crate::inspector::events::{DigestEvent, DigestTrace, EventKind};
use crate::inspector::sink::EventSink;

/// Event collector for testing - accumulates events for assertions.
///
/// # Example
///
/// ```
/// use scope_flow::inspector::{EventCollector, EventKind, EventSinkTracer};
/// use scope_flow::Scope;
/// use std::sync::Arc;
///
/// let collector = Arc::new(EventCollector::new());
/// let scope = Scope::builder()
///     .tracer(EventSinkTracer::new(collector.clone()))
///     .build();
///
/// scope.digest().unwrap();
///
/// assert_eq!(collector.kinds().first(), Some(&EventKind::DigestStart));
/// assert_eq!(collector.kinds().last(), Some(&EventKind::DigestEnd));
/// ```
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<DigestEvent>>,
}

impl EventCollector {
    /// Create a new empty event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected events as a trace.
    pub fn trace(&self) -> DigestTrace {
        DigestTrace {
            events: self.events.lock().clone(),
        }
    }

    /// Get collected events as a vector.
    pub fn events(&self) -> Vec<DigestEvent> {
        self.events.lock().clone()
    }

    /// Get the kinds of the collected events, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(EventKind::from).collect()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Take collected events, clearing the collector.
    pub fn take(&self) -> Vec<DigestEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Get the number of collected events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if no events have been collected.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventCollector {
    fn emit(&self, event: DigestEvent) {
        self.events.lock().push(event);
    }
}
