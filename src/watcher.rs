//! Watcher registry: registration, deregistration and the per-watcher dirty check.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::equality::Comparison;
use crate::scope::{Scope, ScopeInner};
use crate::value::Value;

/// Identifier of a watcher, unique within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatcherId(pub u64);

/// A boxed watch function.
pub type WatchFn = Box<dyn Fn(&Scope) -> anyhow::Result<Value>>;

/// A boxed listener function, called with `(new_value, old_value, scope)`.
pub type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope) -> anyhow::Result<()>>;

/// Outcome of checking one watcher.
pub(crate) enum Check {
    Changed,
    Unchanged,
}

/// Which callback of a watcher failed.
pub(crate) enum CheckError {
    Watch(anyhow::Error),
    /// The watcher was dirty, but its listener failed.
    Listener(anyhow::Error),
}

pub(crate) struct Watcher {
    pub(crate) id: WatcherId,
    watch_fn: WatchFn,
    listener_fn: ListenerFn,
    comparison: Comparison,
    /// `None` until the first check, so the first comparison always mismatches.
    last_value: RefCell<Option<Value>>,
    removed: Cell<bool>,
}

impl Watcher {
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.get()
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.set(true);
    }

    /// Evaluate the watch function and fire the listener if the value changed.
    pub(crate) fn check(&self, scope: &Scope) -> Result<Check, CheckError> {
        let new_value = (self.watch_fn)(scope).map_err(CheckError::Watch)?;
        let old_value = self.last_value.borrow().clone();

        let unchanged = old_value
            .as_ref()
            .is_some_and(|old| self.comparison.are_equal(&new_value, old));
        if unchanged {
            return Ok(Check::Unchanged);
        }

        scope.root_state().last_dirty_watcher.set(Some(self.id));
        *self.last_value.borrow_mut() = Some(self.comparison.snapshot(&new_value));
        let old_value = old_value.unwrap_or_else(|| new_value.clone());
        (self.listener_fn)(&new_value, &old_value, scope).map_err(CheckError::Listener)?;
        Ok(Check::Changed)
    }
}

/// Description of a watcher to register.
///
/// `Watch::new()` describes a bare watcher: both functions are no-ops, the
/// comparison is by reference. It still takes a slot in the digest.
///
/// # Example
///
/// ```
/// use scope_flow::{Scope, Value, Watch};
///
/// let scope = Scope::new();
/// scope.set("items", Value::array([1, 2]));
/// scope.watch_with(
///     Watch::new()
///         .watch_fn(|scope| Ok(scope.get("items")))
///         .listener(|new, _old, scope| {
///             scope.set("count", new.as_array().map_or(0, |a| a.len() as u32));
///             Ok(())
///         })
///         .by_value(),
/// );
/// scope.digest().unwrap();
/// assert_eq!(scope.get("count"), Value::from(2));
/// ```
pub struct Watch {
    watch_fn: WatchFn,
    listener_fn: ListenerFn,
    comparison: Comparison,
}

impl Default for Watch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("comparison", &self.comparison)
            .finish_non_exhaustive()
    }
}

impl Watch {
    /// A watcher with no-op functions and reference comparison.
    pub fn new() -> Self {
        Self {
            watch_fn: Box::new(|_| Ok(Value::Undefined)),
            listener_fn: Box::new(|_, _, _| Ok(())),
            comparison: Comparison::Reference,
        }
    }

    /// Set the watch function.
    pub fn watch_fn<W>(mut self, watch_fn: W) -> Self
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
    {
        self.watch_fn = Box::new(watch_fn);
        self
    }

    /// Set the listener function.
    pub fn listener<L>(mut self, listener_fn: L) -> Self
    where
        L: Fn(&Value, &Value, &Scope) -> anyhow::Result<()> + 'static,
    {
        self.listener_fn = Box::new(listener_fn);
        self
    }

    /// Set the comparison strategy.
    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Compare by structural value instead of by reference.
    pub fn by_value(self) -> Self {
        self.comparison(Comparison::Structural)
    }
}

/// Capability to deregister a watcher (or every watcher of a watch group).
///
/// Cloning is cheap, and deregistering is idempotent: calling it again, or
/// after the owning scope is gone, does nothing. It is safe to call from
/// inside any watch or listener function, including the one it removes.
#[derive(Clone)]
pub struct WatchHandle {
    kind: HandleKind,
}

#[derive(Clone)]
enum HandleKind {
    Single {
        scope: Weak<ScopeInner>,
        watcher: WatcherId,
    },
    Group {
        active: Rc<Cell<bool>>,
        members: Rc<[WatchHandle]>,
    },
}

impl WatchHandle {
    pub(crate) fn group(active: Rc<Cell<bool>>, members: Vec<WatchHandle>) -> Self {
        Self {
            kind: HandleKind::Group {
                active,
                members: members.into(),
            },
        }
    }

    /// Remove the watcher(s) behind this handle.
    pub fn deregister(&self) {
        match &self.kind {
            HandleKind::Single { scope, watcher } => {
                if let Some(inner) = scope.upgrade() {
                    Scope::from_inner(inner).remove_watcher(*watcher);
                }
            }
            HandleKind::Group { active, members } => {
                active.set(false);
                for member in members.iter() {
                    member.deregister();
                }
            }
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HandleKind::Single { watcher, .. } => {
                f.debug_tuple("WatchHandle").field(watcher).finish()
            }
            HandleKind::Group { members, .. } => f
                .debug_struct("WatchHandle")
                .field("members", &members.len())
                .finish(),
        }
    }
}

impl Scope {
    /// Register a watcher with reference comparison.
    ///
    /// The listener fires on the first digest after registration, with the old
    /// value equal to the new one, and afterwards whenever the watched value
    /// changes.
    pub fn watch<W, L>(&self, watch_fn: W, listener_fn: L) -> WatchHandle
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
        L: Fn(&Value, &Value, &Scope) -> anyhow::Result<()> + 'static,
    {
        self.watch_with(Watch::new().watch_fn(watch_fn).listener(listener_fn))
    }

    /// Register a watcher with structural comparison.
    pub fn watch_by_value<W, L>(&self, watch_fn: W, listener_fn: L) -> WatchHandle
    where
        W: Fn(&Scope) -> anyhow::Result<Value> + 'static,
        L: Fn(&Value, &Value, &Scope) -> anyhow::Result<()> + 'static,
    {
        self.watch_with(
            Watch::new()
                .watch_fn(watch_fn)
                .listener(listener_fn)
                .by_value(),
        )
    }

    /// Register a watcher described by `watch`.
    pub fn watch_with(&self, watch: Watch) -> WatchHandle {
        let root = self.root_state();
        let id = root.next_watcher_id();
        let watcher = Rc::new(Watcher {
            id,
            watch_fn: watch.watch_fn,
            listener_fn: watch.listener_fn,
            comparison: watch.comparison,
            last_value: RefCell::new(None),
            removed: Cell::new(false),
        });
        self.inner.watchers.borrow_mut().push(watcher);
        root.last_dirty_watcher.set(None);
        WatchHandle {
            kind: HandleKind::Single {
                scope: Rc::downgrade(&self.inner),
                watcher: id,
            },
        }
    }

    fn remove_watcher(&self, id: WatcherId) {
        let removed = {
            let mut watchers = self.inner.watchers.borrow_mut();
            watchers
                .iter()
                .position(|w| w.id == id)
                .map(|index| watchers.remove(index))
        };
        if let Some(watcher) = removed {
            watcher.mark_removed();
            self.root_state().last_dirty_watcher.set(None);
        }
    }
}
