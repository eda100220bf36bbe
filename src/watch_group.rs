//! Watching several expressions with one listener.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::scope::Scope;
use crate::value::Value;
use crate::watcher::{WatchFn, WatchHandle};

struct GroupState {
    new_values: Vec<Value>,
    old_values: Vec<Value>,
    scheduled: bool,
    first_run: bool,
}

impl Scope {
    /// Watch several expressions and call `listener` once per digest pass in
    /// which any of them changed.
    ///
    /// The listener receives `(new_values, old_values, scope)` with one slot per
    /// watch function, in the order given. On its first call both slices are
    /// the same slice. With no watch functions the listener is called once, on
    /// the next digest, with empty slices.
    ///
    /// The listener runs through [`Scope::eval_async`], so its failures are
    /// reported as [`CallbackKind::EvalAsync`](crate::CallbackKind::EvalAsync).
    /// Deregistering removes every underlying watcher and cancels a call that
    /// is already queued.
    ///
    /// # Example
    ///
    /// ```
    /// use scope_flow::{Scope, Value, WatchFn};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let scope = Scope::new();
    /// scope.set("a", 1);
    /// scope.set("b", 2);
    ///
    /// let calls = Rc::new(Cell::new(0));
    /// let counter = calls.clone();
    /// let watch_fns: Vec<WatchFn> = vec![
    ///     Box::new(|scope| Ok(scope.get("a"))),
    ///     Box::new(|scope| Ok(scope.get("b"))),
    /// ];
    /// scope.watch_group(watch_fns, move |new, _old, _scope| {
    ///     assert_eq!(new, &[Value::from(1), Value::from(2)]);
    ///     counter.set(counter.get() + 1);
    ///     Ok(())
    /// });
    ///
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 1);
    /// ```
    pub fn watch_group<L>(&self, watch_fns: Vec<WatchFn>, listener: L) -> WatchHandle
    where
        L: Fn(&[Value], &[Value], &Scope) -> anyhow::Result<()> + 'static,
    {
        let active = Rc::new(Cell::new(true));

        if watch_fns.is_empty() {
            let still_active = active.clone();
            self.eval_async(move |scope| {
                if still_active.get() {
                    listener(&[], &[], scope)?;
                }
                Ok(())
            });
            return WatchHandle::group(active, Vec::new());
        }

        let slots = watch_fns.len();
        let listener = Rc::new(listener);
        let state = Rc::new(RefCell::new(GroupState {
            new_values: vec![Value::Undefined; slots],
            old_values: vec![Value::Undefined; slots],
            scheduled: false,
            first_run: true,
        }));

        let members = watch_fns
            .into_iter()
            .enumerate()
            .map(|(slot, watch_fn)| {
                let state = state.clone();
                let listener = listener.clone();
                let active = active.clone();
                self.watch(watch_fn, move |new, old, scope| {
                    {
                        let mut group = state.borrow_mut();
                        group.new_values[slot] = new.clone();
                        group.old_values[slot] = old.clone();
                        if group.scheduled {
                            return Ok(());
                        }
                        group.scheduled = true;
                    }
                    let state = state.clone();
                    let listener = listener.clone();
                    let active = active.clone();
                    scope.eval_async(move |scope| {
                        fire_group(&state, listener.as_ref(), &active, scope)
                    });
                    Ok(())
                })
            })
            .collect();

        WatchHandle::group(active, members)
    }
}

fn fire_group<L>(
    state: &RefCell<GroupState>,
    listener: &L,
    active: &Cell<bool>,
    scope: &Scope,
) -> anyhow::Result<()>
where
    L: Fn(&[Value], &[Value], &Scope) -> anyhow::Result<()>,
{
    let (new_values, old_values, first_run) = {
        let mut group = state.borrow_mut();
        group.scheduled = false;
        let first_run = std::mem::replace(&mut group.first_run, false);
        (group.new_values.clone(), group.old_values.clone(), first_run)
    };
    if !active.get() {
        return Ok(());
    }
    if first_run {
        listener(&new_values, &new_values, scope)
    } else {
        listener(&new_values, &old_values, scope)
    }
}
