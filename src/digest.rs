//! The digest loop: repeated dirty-checking passes over a scope subtree until
//! nothing changes.

use std::ops::ControlFlow;

use crate::error::{CallbackKind, Phase, ScopeError};
use crate::scope::Scope;
use crate::watcher::{Check, CheckError};

impl Scope {
    /// Run watchers on this scope and its descendants until they settle.
    ///
    /// Each pass first drains the `eval_async` queue, then walks the subtree
    /// pre-order, checking watchers in registration order. A pass stops early
    /// when it comes back around to the last watcher that was dirty and finds
    /// it clean. The digest ends when a pass is clean and no `eval_async` work
    /// is pending, then runs this scope's `post_digest` tasks.
    ///
    /// Pending `apply_async` work is flushed before the first pass and its
    /// timer cancelled. A fallback digest armed by `eval_async` is cancelled
    /// too.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::PhaseInProgress`] if called while a digest or `apply`
    ///   is already running anywhere in the tree.
    /// - [`ScopeError::TtlExceeded`] if the tree is still changing after the
    ///   configured number of passes. The phase is cleared before returning.
    pub fn digest(&self) -> Result<(), ScopeError> {
        let root = self.root_state();
        root.begin_phase(Phase::Digest)?;
        root.last_dirty_watcher.set(None);
        root.tracer.on_digest_start(self.id());

        if let Some(timer) = root.apply_async_pending.get() {
            root.scheduler.cancel(timer);
            self.flush_apply_async();
        }
        // This digest drains the queue the fallback was armed for.
        if let Some(fallback) = root.eval_async_pending.take() {
            root.scheduler.cancel(fallback);
        }

        let mut pass = 1;
        loop {
            self.drain_eval_async();
            let dirty = self.digest_once();
            root.tracer.on_pass_end(self.id(), pass, dirty);

            let pending = !root.async_queue.borrow().is_empty();
            if !dirty && !pending {
                break;
            }
            if pass > root.ttl {
                root.clear_phase();
                root.tracer.on_ttl_exceeded(self.id(), root.ttl);
                return Err(ScopeError::TtlExceeded { ttl: root.ttl });
            }
            pass += 1;
        }

        root.clear_phase();
        self.drain_post_digest();
        root.tracer.on_digest_end(self.id(), pass);
        Ok(())
    }

    /// One pass over the subtree. Returns true if any watcher was dirty.
    fn digest_once(&self) -> bool {
        let mut dirty = false;
        match self.check_subtree(&mut dirty) {
            ControlFlow::Continue(()) => dirty,
            ControlFlow::Break(()) => false,
        }
    }

    fn check_subtree(&self, dirty: &mut bool) -> ControlFlow<()> {
        let root = self.root_state();

        // Callbacks may register or deregister watchers while we iterate.
        let watchers = self.inner.watchers.borrow().clone();
        for watcher in watchers {
            if watcher.is_removed() {
                continue;
            }
            match watcher.check(self) {
                Ok(Check::Changed) => {
                    root.tracer.on_watcher_dirty(self.id(), watcher.id);
                    *dirty = true;
                }
                Ok(Check::Unchanged) => {
                    if root.last_dirty_watcher.get() == Some(watcher.id) {
                        root.tracer.on_short_circuit(self.id(), watcher.id);
                        return ControlFlow::Break(());
                    }
                }
                Err(CheckError::Watch(error)) => {
                    root.tracer
                        .on_callback_error(self.id(), CallbackKind::Watch, &error);
                }
                Err(CheckError::Listener(error)) => {
                    root.tracer.on_watcher_dirty(self.id(), watcher.id);
                    root.tracer
                        .on_callback_error(self.id(), CallbackKind::Listener, &error);
                    *dirty = true;
                }
            }
        }

        let children = self.inner.children.borrow().clone();
        for child in children {
            if child.is_destroyed() {
                continue;
            }
            child.check_subtree(dirty)?;
        }
        ControlFlow::Continue(())
    }

    fn drain_eval_async(&self) {
        let root = self.root_state();
        let mut count = 0;
        loop {
            // Tasks may queue more tasks; pop one at a time until empty.
            let next = root.async_queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            count += 1;
            root.run_task(task, CallbackKind::EvalAsync);
        }
        if count > 0 {
            root.tracer.on_eval_async_drain(self.id(), count);
        }
    }

    fn drain_post_digest(&self) {
        let root = self.root_state();
        loop {
            let next = self.inner.post_digest_queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            if let Err(error) = task() {
                root.tracer
                    .on_callback_error(self.id(), CallbackKind::PostDigest, &error);
            }
        }
    }
}
