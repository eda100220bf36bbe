//! Tracer trait for observing digest execution.
//!
//! This module defines the [`Tracer`] trait and its two built-in
//! implementations. [`TracingTracer`] is the default and forwards every hook to
//! the `tracing` crate; [`NoopTracer`] discards everything.
//!
//! # Example
//!
//! ```
//! use scope_flow::{CallbackKind, Scope, ScopeId, Tracer};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct ErrorCounter(AtomicUsize);
//!
//! impl Tracer for ErrorCounter {
//!     fn on_callback_error(&self, _scope: ScopeId, _kind: CallbackKind, _error: &anyhow::Error) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(ErrorCounter::default());
//! let scope = Scope::builder().tracer(counter.clone()).build();
//! scope.watch(|_| anyhow::bail!("broken"), |_, _, _| Ok(()));
//! scope.digest().unwrap();
//! assert_eq!(counter.0.load(Ordering::Relaxed), 1);
//! ```

use crate::error::{CallbackKind, Phase};
use crate::scope::ScopeId;
use crate::watcher::WatcherId;

/// Tracer trait for observing digest execution.
///
/// All methods have default empty implementations, so you only need to
/// override the events you're interested in.
pub trait Tracer: Send + Sync + 'static {
    /// Called after the digest phase has been entered.
    #[inline]
    fn on_digest_start(&self, _scope: ScopeId) {}

    /// Called when a digest flushes the pending `apply_async` queue.
    #[inline]
    fn on_apply_async_flush(&self, _scope: ScopeId, _count: usize) {}

    /// Called after the `eval_async` queue was drained at the top of a pass.
    #[inline]
    fn on_eval_async_drain(&self, _scope: ScopeId, _count: usize) {}

    /// Called when a watcher is found dirty.
    #[inline]
    fn on_watcher_dirty(&self, _scope: ScopeId, _watcher: WatcherId) {}

    /// Called when a pass stops early at the last dirty watcher.
    #[inline]
    fn on_short_circuit(&self, _scope: ScopeId, _watcher: WatcherId) {}

    /// Called after every tree pass. `pass` starts at 1.
    #[inline]
    fn on_pass_end(&self, _scope: ScopeId, _pass: usize, _dirty: bool) {}

    /// Called when a digest settles, after post-digest tasks have run.
    #[inline]
    fn on_digest_end(&self, _scope: ScopeId, _passes: usize) {}

    /// Called when a digest gives up.
    #[inline]
    fn on_ttl_exceeded(&self, _scope: ScopeId, _ttl: usize) {}

    /// Called when a phase is refused because another one is active.
    #[inline]
    fn on_phase_conflict(&self, _active: Phase, _requested: Phase) {}

    /// Called when a callback fails. The failure is not propagated.
    #[inline]
    fn on_callback_error(&self, _scope: ScopeId, _kind: CallbackKind, _error: &anyhow::Error) {}
}

/// Tracer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Tracer that forwards events to the `tracing` crate.
///
/// This is the default tracer for [`Scope`](crate::Scope). Callback failures
/// are logged at `error`, fatal digest conditions at `warn`, digest lifecycle
/// at `debug` and per-watcher events at `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn on_digest_start(&self, scope: ScopeId) {
        tracing::debug!(scope = scope.0, "digest started");
    }

    fn on_apply_async_flush(&self, scope: ScopeId, count: usize) {
        tracing::debug!(scope = scope.0, count, "flushed apply_async queue");
    }

    fn on_eval_async_drain(&self, scope: ScopeId, count: usize) {
        tracing::trace!(scope = scope.0, count, "drained eval_async queue");
    }

    fn on_watcher_dirty(&self, scope: ScopeId, watcher: WatcherId) {
        tracing::trace!(scope = scope.0, watcher = watcher.0, "watcher dirty");
    }

    fn on_short_circuit(&self, scope: ScopeId, watcher: WatcherId) {
        tracing::trace!(scope = scope.0, watcher = watcher.0, "pass short-circuited");
    }

    fn on_pass_end(&self, scope: ScopeId, pass: usize, dirty: bool) {
        tracing::trace!(scope = scope.0, pass, dirty, "pass finished");
    }

    fn on_digest_end(&self, scope: ScopeId, passes: usize) {
        tracing::debug!(scope = scope.0, passes, "digest settled");
    }

    fn on_ttl_exceeded(&self, scope: ScopeId, ttl: usize) {
        tracing::warn!(scope = scope.0, ttl, "digest iterations exceeded");
    }

    fn on_phase_conflict(&self, active: Phase, requested: Phase) {
        tracing::warn!(%active, %requested, "phase already in progress");
    }

    fn on_callback_error(&self, scope: ScopeId, kind: CallbackKind, error: &anyhow::Error) {
        tracing::error!(scope = scope.0, ?kind, error = %error, "callback failed");
    }
}

impl<T: Tracer + ?Sized> Tracer for std::sync::Arc<T> {
    fn on_digest_start(&self, scope: ScopeId) {
        (**self).on_digest_start(scope)
    }

    fn on_apply_async_flush(&self, scope: ScopeId, count: usize) {
        (**self).on_apply_async_flush(scope, count)
    }

    fn on_eval_async_drain(&self, scope: ScopeId, count: usize) {
        (**self).on_eval_async_drain(scope, count)
    }

    fn on_watcher_dirty(&self, scope: ScopeId, watcher: WatcherId) {
        (**self).on_watcher_dirty(scope, watcher)
    }

    fn on_short_circuit(&self, scope: ScopeId, watcher: WatcherId) {
        (**self).on_short_circuit(scope, watcher)
    }

    fn on_pass_end(&self, scope: ScopeId, pass: usize, dirty: bool) {
        (**self).on_pass_end(scope, pass, dirty)
    }

    fn on_digest_end(&self, scope: ScopeId, passes: usize) {
        (**self).on_digest_end(scope, passes)
    }

    fn on_ttl_exceeded(&self, scope: ScopeId, ttl: usize) {
        (**self).on_ttl_exceeded(scope, ttl)
    }

    fn on_phase_conflict(&self, active: Phase, requested: Phase) {
        (**self).on_phase_conflict(active, requested)
    }

    fn on_callback_error(&self, scope: ScopeId, kind: CallbackKind, error: &anyhow::Error) {
        (**self).on_callback_error(scope, kind, error)
    }
}
