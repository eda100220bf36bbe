//! Event types recorded while a digest runs.

use serde::{Deserialize, Serialize};

use crate::error::{CallbackKind, Phase};
use crate::scope::ScopeId;
use crate::watcher::WatcherId;

/// Events emitted during digest execution, one per [`Tracer`](crate::Tracer) hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestEvent {
    // === Digest Lifecycle ===
    /// A digest entered its phase.
    DigestStart { scope: ScopeId },

    /// Pending `apply_async` work was run.
    ApplyAsyncFlush { scope: ScopeId, count: usize },

    /// The `eval_async` queue was drained at the top of a pass.
    EvalAsyncDrain { scope: ScopeId, count: usize },

    /// A pass over the subtree finished.
    PassEnd {
        scope: ScopeId,
        /// 1-based pass number within this digest.
        pass: usize,
        dirty: bool,
    },

    /// The digest settled.
    DigestEnd { scope: ScopeId, passes: usize },

    // === Watchers ===
    /// A watcher's value changed and its listener ran.
    WatcherDirty { scope: ScopeId, watcher: WatcherId },

    /// A pass stopped at the last dirty watcher.
    ShortCircuit { scope: ScopeId, watcher: WatcherId },

    // === Failures ===
    /// The digest did not settle in time.
    TtlExceeded { scope: ScopeId, ttl: usize },

    /// A phase was refused.
    PhaseConflict { active: Phase, requested: Phase },

    /// A callback failed and the digest carried on.
    CallbackError {
        scope: ScopeId,
        kind: CallbackKind,
        /// The error's display string.
        message: String,
    },
}

impl DigestEvent {
    /// The kind of this event, without its payload.
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    /// The scope the event was reported for, if any.
    pub fn scope(&self) -> Option<ScopeId> {
        match self {
            DigestEvent::DigestStart { scope }
            | DigestEvent::ApplyAsyncFlush { scope, .. }
            | DigestEvent::EvalAsyncDrain { scope, .. }
            | DigestEvent::PassEnd { scope, .. }
            | DigestEvent::DigestEnd { scope, .. }
            | DigestEvent::WatcherDirty { scope, .. }
            | DigestEvent::ShortCircuit { scope, .. }
            | DigestEvent::TtlExceeded { scope, .. }
            | DigestEvent::CallbackError { scope, .. } => Some(*scope),
            DigestEvent::PhaseConflict { .. } => None,
        }
    }
}

/// Event kind for comparison (without ids or counts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DigestStart,
    ApplyAsyncFlush,
    EvalAsyncDrain,
    PassEnd { dirty: bool },
    DigestEnd,
    WatcherDirty,
    ShortCircuit,
    TtlExceeded,
    PhaseConflict,
    CallbackError { kind: CallbackKind },
}

impl From<&DigestEvent> for EventKind {
    fn from(event: &DigestEvent) -> Self {
        match event {
            DigestEvent::DigestStart { .. } => EventKind::DigestStart,
            DigestEvent::ApplyAsyncFlush { .. } => EventKind::ApplyAsyncFlush,
            DigestEvent::EvalAsyncDrain { .. } => EventKind::EvalAsyncDrain,
            DigestEvent::PassEnd { dirty, .. } => EventKind::PassEnd { dirty: *dirty },
            DigestEvent::DigestEnd { .. } => EventKind::DigestEnd,
            DigestEvent::WatcherDirty { .. } => EventKind::WatcherDirty,
            DigestEvent::ShortCircuit { .. } => EventKind::ShortCircuit,
            DigestEvent::TtlExceeded { .. } => EventKind::TtlExceeded,
            DigestEvent::PhaseConflict { .. } => EventKind::PhaseConflict,
            DigestEvent::CallbackError { kind, .. } => EventKind::CallbackError { kind: *kind },
        }
    }
}

/// A sequence of recorded events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestTrace {
    pub events: Vec<DigestEvent>,
}

impl DigestTrace {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: DigestEvent) {
        self.events.push(event);
    }

    /// The kinds of all events, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(EventKind::from).collect()
    }

    /// Number of events of the given kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Events reported for a specific scope.
    pub fn events_for_scope(&self, scope: ScopeId) -> Vec<&DigestEvent> {
        self.events
            .iter()
            .filter(|e| e.scope() == Some(scope))
            .collect()
    }

    /// Get all callback failures as `(kind, message)`.
    pub fn errors(&self) -> impl Iterator<Item = (CallbackKind, &str)> {
        self.events.iter().filter_map(|e| match e {
            DigestEvent::CallbackError { kind, message, .. } => Some((*kind, message.as_str())),
            _ => None,
        })
    }

    /// Check if any event matches a predicate.
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&DigestEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }
}
