//! Evaluation entry points and the asynchronous task queues.
//!
//! - `eval_async` work is shared by the whole tree and drained at the start of
//!   every digest pass.
//! - `apply_async` work is coalesced: any number of calls in one turn produce a
//!   single deferred `apply`, unless a digest flushes them first.
//! - `post_digest` work belongs to one scope and runs once after that scope's
//!   next digest settles.

use std::rc::Rc;

use crate::error::{CallbackKind, Phase, ScopeError};
use crate::scope::{AsyncTask, RootState, Scope};
use crate::value::Value;

impl RootState {
    /// Run a queued task against its scope, reporting failure to the tracer.
    ///
    /// Tasks whose scope has been dropped are skipped.
    pub(crate) fn run_task(&self, task: AsyncTask, kind: CallbackKind) {
        let Some(inner) = task.scope.upgrade() else {
            return;
        };
        let scope = Scope::from_inner(inner);
        if let Err(error) = (task.expr)(&scope) {
            self.tracer.on_callback_error(scope.id(), kind, &error);
        }
    }
}

impl Scope {
    /// Evaluate `expr` against this scope, synchronously.
    pub fn eval<T, F>(&self, expr: F) -> T
    where
        F: FnOnce(&Scope) -> T,
    {
        expr(self)
    }

    /// Evaluate `expr` against this scope with extra local values.
    pub fn eval_with<T, F>(&self, expr: F, locals: &Value) -> T
    where
        F: FnOnce(&Scope, &Value) -> T,
    {
        expr(self, locals)
    }

    /// Evaluate `expr`, then digest the whole tree from its root.
    ///
    /// The digest runs even if `expr` fails; the expression's error is
    /// returned afterwards as [`ScopeError::Expression`].
    ///
    /// # Errors
    ///
    /// - [`ScopeError::PhaseInProgress`] if a digest or `apply` is already
    ///   running. Nothing is evaluated in that case.
    /// - Any error from the follow-up [`Scope::digest`]. If `expr` failed as
    ///   well, its error is reported to the tracer as [`CallbackKind::Apply`].
    /// - [`ScopeError::Expression`] if `expr` failed and the digest succeeded.
    pub fn apply<T, F>(&self, expr: F) -> Result<T, ScopeError>
    where
        F: FnOnce(&Scope) -> anyhow::Result<T>,
    {
        let root = self.root_state();
        root.begin_phase(Phase::Apply)?;
        let result = self.eval(expr);
        root.clear_phase();
        if let Err(digest_error) = self.root().digest() {
            if let Err(error) = &result {
                root.tracer
                    .on_callback_error(self.id(), CallbackKind::Apply, error);
            }
            return Err(digest_error);
        }
        result.map_err(ScopeError::Expression)
    }

    /// Queue `expr` to run against this scope during the current digest, or
    /// the next one.
    ///
    /// If no digest is running and nothing else is queued, a root digest is
    /// also scheduled on the host so the task runs even if nobody digests.
    /// Any digest that starts first cancels that fallback.
    /// Failures are reported as [`CallbackKind::EvalAsync`].
    pub fn eval_async<F>(&self, expr: F)
    where
        F: FnOnce(&Scope) -> anyhow::Result<()> + 'static,
    {
        let root = self.root_state();
        let idle = root.phase.get().is_none() && root.eval_async_pending.get().is_none();
        if idle && root.async_queue.borrow().is_empty() {
            let tree = root.scope.clone();
            let fallback = root.scheduler.defer(Box::new(move || {
                let Some(inner) = tree.upgrade() else {
                    return;
                };
                let root = Scope::from_inner(inner);
                root.root_state().eval_async_pending.set(None);
                if !root.root_state().async_queue.borrow().is_empty() {
                    // Failures were already reported to the tracer.
                    let _ = root.digest();
                }
            }));
            root.eval_async_pending.set(Some(fallback));
        }
        root.async_queue.borrow_mut().push_back(AsyncTask {
            scope: Rc::downgrade(&self.inner),
            expr: Box::new(expr),
        });
    }

    /// Queue `expr` to run in a later `apply`, coalesced with other calls.
    ///
    /// Never runs within the call chain that queued it. All tasks queued before
    /// the host timer fires run in one `apply` (one digest). A digest that
    /// starts first cancels the timer and runs them itself. Failures are
    /// reported as [`CallbackKind::ApplyAsync`].
    ///
    /// # Example
    ///
    /// ```
    /// use scope_flow::{ManualScheduler, Scope, Value};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let scheduler = Rc::new(ManualScheduler::new());
    /// let scope = Scope::builder().scheduler(scheduler.clone()).build();
    ///
    /// let digests = Rc::new(Cell::new(0));
    /// let counter = digests.clone();
    /// scope.watch(
    ///     |scope| Ok(scope.get("name")),
    ///     move |_, _, _| {
    ///         counter.set(counter.get() + 1);
    ///         Ok(())
    ///     },
    /// );
    /// scope.digest().unwrap();
    ///
    /// scope.apply_async(|scope| {
    ///     scope.set("name", "Jane");
    ///     Ok(())
    /// });
    /// scope.apply_async(|scope| {
    ///     scope.set("name", "Joe");
    ///     Ok(())
    /// });
    /// assert_eq!(digests.get(), 1);
    ///
    /// scheduler.run_until_idle();
    /// assert_eq!(digests.get(), 2);
    /// assert_eq!(scope.get("name"), Value::from("Joe"));
    /// ```
    pub fn apply_async<F>(&self, expr: F)
    where
        F: FnOnce(&Scope) -> anyhow::Result<()> + 'static,
    {
        let root = self.root_state();
        root.apply_async_queue.borrow_mut().push_back(AsyncTask {
            scope: Rc::downgrade(&self.inner),
            expr: Box::new(expr),
        });
        if root.apply_async_pending.get().is_none() {
            let tree = root.scope.clone();
            let timer = root.scheduler.defer(Box::new(move || {
                let Some(inner) = tree.upgrade() else {
                    return;
                };
                let root = Scope::from_inner(inner);
                let _ = root.apply(|scope| {
                    scope.flush_apply_async();
                    Ok(())
                });
            }));
            root.apply_async_pending.set(Some(timer));
        }
    }

    /// Run every queued `apply_async` task, including ones queued meanwhile.
    pub(crate) fn flush_apply_async(&self) {
        let root = self.root_state();
        let mut count = 0;
        loop {
            let next = root.apply_async_queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            count += 1;
            root.run_task(task, CallbackKind::ApplyAsync);
        }
        root.apply_async_pending.set(None);
        root.tracer.on_apply_async_flush(self.id(), count);
    }

    /// Queue `task` to run once, after this scope's next digest settles.
    ///
    /// The task runs outside the digest phase but does not trigger another
    /// digest. Failures are reported as [`CallbackKind::PostDigest`].
    pub fn post_digest<F>(&self, task: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.inner
            .post_digest_queue
            .borrow_mut()
            .push_back(Box::new(task));
    }
}
