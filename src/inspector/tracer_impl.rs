//! EventSinkTracer - Bridge between the `Tracer` hooks and an `EventSink`.

use std::sync::Arc;

use crate::error::{CallbackKind, Phase};
use crate::inspector::events::DigestEvent;
use crate::inspector::sink::EventSink;
use crate::scope::ScopeId;
use crate::tracer::Tracer;
use crate::watcher::WatcherId;

/// A `Tracer` implementation that forwards events to an `EventSink`.
///
/// The sink is flushed whenever a digest settles or gives up.
pub struct EventSinkTracer {
    sink: Arc<dyn EventSink>,
}

impl EventSinkTracer {
    /// Create a new EventSinkTracer wrapping the given sink.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

impl Tracer for EventSinkTracer {
    #[inline]
    fn on_digest_start(&self, scope: ScopeId) {
        self.sink.emit(DigestEvent::DigestStart { scope });
    }

    #[inline]
    fn on_apply_async_flush(&self, scope: ScopeId, count: usize) {
        self.sink.emit(DigestEvent::ApplyAsyncFlush { scope, count });
    }

    #[inline]
    fn on_eval_async_drain(&self, scope: ScopeId, count: usize) {
        self.sink.emit(DigestEvent::EvalAsyncDrain { scope, count });
    }

    #[inline]
    fn on_watcher_dirty(&self, scope: ScopeId, watcher: WatcherId) {
        self.sink.emit(DigestEvent::WatcherDirty { scope, watcher });
    }

    #[inline]
    fn on_short_circuit(&self, scope: ScopeId, watcher: WatcherId) {
        self.sink.emit(DigestEvent::ShortCircuit { scope, watcher });
    }

    #[inline]
    fn on_pass_end(&self, scope: ScopeId, pass: usize, dirty: bool) {
        self.sink.emit(DigestEvent::PassEnd { scope, pass, dirty });
    }

    #[inline]
    fn on_digest_end(&self, scope: ScopeId, passes: usize) {
        self.sink.emit(DigestEvent::DigestEnd { scope, passes });
        self.sink.flush();
    }

    #[inline]
    fn on_ttl_exceeded(&self, scope: ScopeId, ttl: usize) {
        self.sink.emit(DigestEvent::TtlExceeded { scope, ttl });
        self.sink.flush();
    }

    #[inline]
    fn on_phase_conflict(&self, active: Phase, requested: Phase) {
        self.sink
            .emit(DigestEvent::PhaseConflict { active, requested });
    }

    #[inline]
    fn on_callback_error(&self, scope: ScopeId, kind: CallbackKind, error: &anyhow::Error) {
        self.sink.emit(DigestEvent::CallbackError {
            scope,
            kind,
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::collector::EventCollector;
    use crate::inspector::events::EventKind;

    #[test]
    fn test_hooks_map_to_events() {
        let collector = Arc::new(EventCollector::new());
        let tracer = EventSinkTracer::new(collector.clone());

        tracer.on_digest_start(ScopeId(0));
        tracer.on_watcher_dirty(ScopeId(0), WatcherId(4));
        tracer.on_callback_error(ScopeId(2), CallbackKind::PostDigest, &anyhow::anyhow!("nope"));
        tracer.on_digest_end(ScopeId(0), 2);

        assert_eq!(
            collector.kinds(),
            vec![
                EventKind::DigestStart,
                EventKind::WatcherDirty,
                EventKind::CallbackError {
                    kind: CallbackKind::PostDigest
                },
                EventKind::DigestEnd,
            ]
        );
        assert_eq!(
            collector.events()[2],
            DigestEvent::CallbackError {
                scope: ScopeId(2),
                kind: CallbackKind::PostDigest,
                message: "nope".to_string(),
            }
        );
    }
}
