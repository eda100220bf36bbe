//! Scope tree: nodes, property storage and tree-wide bookkeeping.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::error::{Phase, ScopeError};
use crate::scheduler::{ManualScheduler, Scheduler, TaskId};
use crate::tracer::{Tracer, TracingTracer};
use crate::value::Value;
use crate::watcher::{Watcher, WatcherId};

/// Default number of digest iterations allowed before giving up.
pub const DEFAULT_TTL: usize = 10;

/// Identifier of a scope, unique within its tree. The root is always `ScopeId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u64);

/// A task queued against a particular scope.
pub(crate) type ScopeTask = Box<dyn FnOnce(&Scope) -> anyhow::Result<()>>;

/// A queued task together with the scope it is evaluated against.
pub(crate) struct AsyncTask {
    pub(crate) scope: Weak<ScopeInner>,
    pub(crate) expr: ScopeTask,
}

/// Tree-wide bookkeeping.
///
/// Owned by the root and shared by every descendant through its cached
/// reference. Never duplicated per node.
pub(crate) struct RootState {
    pub(crate) scope: Weak<ScopeInner>,
    pub(crate) ttl: usize,
    pub(crate) phase: Cell<Option<Phase>>,
    pub(crate) last_dirty_watcher: Cell<Option<WatcherId>>,
    pub(crate) async_queue: RefCell<VecDeque<AsyncTask>>,
    /// Fallback digest armed by `eval_async` while idle.
    pub(crate) eval_async_pending: Cell<Option<TaskId>>,
    pub(crate) apply_async_queue: RefCell<VecDeque<AsyncTask>>,
    pub(crate) apply_async_pending: Cell<Option<TaskId>>,
    pub(crate) scheduler: Rc<dyn Scheduler>,
    pub(crate) tracer: Box<dyn Tracer>,
    next_scope_id: Cell<u64>,
    next_watcher_id: Cell<u64>,
}

impl RootState {
    pub(crate) fn begin_phase(&self, requested: Phase) -> Result<(), ScopeError> {
        if let Some(active) = self.phase.get() {
            self.tracer.on_phase_conflict(active, requested);
            return Err(ScopeError::PhaseInProgress { active, requested });
        }
        self.phase.set(Some(requested));
        Ok(())
    }

    pub(crate) fn clear_phase(&self) {
        self.phase.set(None);
    }

    pub(crate) fn next_watcher_id(&self) -> WatcherId {
        let id = self.next_watcher_id.get();
        self.next_watcher_id.set(id + 1);
        WatcherId(id)
    }

    fn next_scope_id(&self) -> ScopeId {
        let id = self.next_scope_id.get();
        self.next_scope_id.set(id + 1);
        ScopeId(id)
    }
}

pub(crate) struct ScopeInner {
    pub(crate) id: ScopeId,
    pub(crate) root: Rc<RootState>,
    /// Lookup and root discovery only. Parents own their children, not the other way round.
    parent: Option<Weak<ScopeInner>>,
    isolated: bool,
    destroyed: Cell<bool>,
    properties: RefCell<HashMap<String, Value, ahash::RandomState>>,
    /// Registration order; the digest visits them front to back.
    pub(crate) watchers: RefCell<Vec<Rc<Watcher>>>,
    pub(crate) children: RefCell<Vec<Scope>>,
    pub(crate) post_digest_queue: RefCell<VecDeque<Box<dyn FnOnce() -> anyhow::Result<()>>>>,
}

impl ScopeInner {
    fn new(
        id: ScopeId,
        root: Rc<RootState>,
        parent: Option<Weak<ScopeInner>>,
        isolated: bool,
    ) -> Self {
        Self {
            id,
            root,
            parent,
            isolated,
            destroyed: Cell::new(false),
            properties: RefCell::new(HashMap::with_hasher(ahash::RandomState::new())),
            watchers: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            post_digest_queue: RefCell::new(VecDeque::new()),
        }
    }
}

/// A node in the observable-state tree.
///
/// This is cheap to clone: a `Scope` is a handle, and clones refer to the same
/// node. Scopes are single-threaded (`!Send`); every piece of digest state lives
/// on one thread by construction.
///
/// # Example
///
/// ```
/// use scope_flow::{Scope, Value};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let scope = Scope::new();
/// scope.set("name", "Jane");
///
/// let calls = Rc::new(Cell::new(0));
/// let counter = calls.clone();
/// scope.watch(
///     |scope| Ok(scope.get("name")),
///     move |_new, _old, _scope| {
///         counter.set(counter.get() + 1);
///         Ok(())
///     },
/// );
///
/// scope.digest().unwrap();
/// scope.digest().unwrap();
/// assert_eq!(calls.get(), 1);
///
/// scope.apply(|scope| {
///     scope.set("name", "Joe");
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(calls.get(), 2);
/// ```
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Rc<ScopeInner>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("isolated", &self.inner.isolated)
            .field("watchers", &self.watcher_count())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

impl Scope {
    /// Create a root scope with default settings.
    ///
    /// The default scheduler is never driven: `eval_async` and `apply_async`
    /// work waits for the next explicit [`Scope::digest`] or [`Scope::apply`].
    /// Use [`Scope::builder`] with a host [`Scheduler`] for deferred delivery.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a root scope with a custom iteration bound.
    pub fn with_ttl(ttl: usize) -> Self {
        Self::builder().ttl(ttl).build()
    }

    /// Create a builder for customizing the root scope.
    ///
    /// # Example
    ///
    /// ```
    /// use scope_flow::{ManualScheduler, NoopTracer, Scope};
    /// use std::rc::Rc;
    ///
    /// let scheduler = Rc::new(ManualScheduler::new());
    /// let scope = Scope::builder()
    ///     .ttl(20)
    ///     .scheduler(scheduler.clone())
    ///     .tracer(NoopTracer)
    ///     .build();
    /// assert_eq!(scope.ttl(), 20);
    /// ```
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub(crate) fn from_inner(inner: Rc<ScopeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn root_state(&self) -> &RootState {
        &self.inner.root
    }

    /// Identifier of this scope within its tree.
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// The iteration bound shared by the whole tree.
    pub fn ttl(&self) -> usize {
        self.inner.root.ttl
    }

    /// The phase the tree is currently in, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.inner.root.phase.get()
    }

    /// Returns true if this scope has no parent.
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Returns true if this scope does not inherit its parent's properties.
    pub fn is_isolated(&self) -> bool {
        self.inner.isolated
    }

    /// Returns true if [`Scope::destroy`] was called on this scope or an ancestor.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// The parent scope, if it is still alive.
    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Scope::from_inner)
    }

    /// The root of the tree.
    ///
    /// If the root has already been dropped, the topmost ancestor that is still
    /// alive acts as the root.
    pub fn root(&self) -> Scope {
        if let Some(root) = self.inner.root.scope.upgrade() {
            return Scope::from_inner(root);
        }
        let mut top = self.clone();
        while let Some(parent) = top.parent() {
            top = parent;
        }
        top
    }

    /// Direct children, in creation order.
    pub fn children(&self) -> Vec<Scope> {
        self.inner.children.borrow().clone()
    }

    /// Number of watchers registered on this scope.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// The scheduler used for deferred work.
    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.inner.root.scheduler.clone()
    }

    /// Create a child scope.
    ///
    /// A non-isolated child reads through to its parent's properties; an
    /// isolated one starts with an empty, unlinked property set. Both are
    /// digested with their parent and bubble `apply`/`eval_async` to the root.
    pub fn create_child(&self, isolated: bool) -> Scope {
        let root = self.inner.root.clone();
        let id = root.next_scope_id();
        let child = Scope::from_inner(Rc::new(ScopeInner::new(
            id,
            root,
            Some(Rc::downgrade(&self.inner)),
            isolated,
        )));
        self.inner.children.borrow_mut().push(child.clone());
        child
    }

    /// Create a non-isolated child scope.
    pub fn new_child(&self) -> Scope {
        self.create_child(false)
    }

    /// Create an isolated child scope.
    pub fn new_isolated_child(&self) -> Scope {
        self.create_child(true)
    }

    /// Detach this scope from the tree and drop its watchers and children.
    ///
    /// The scope is never digested again and deregistration handles pointing
    /// into it become no-ops. Destroying the root clears it in place.
    pub fn destroy(&self) {
        if let Some(parent) = self.parent() {
            parent
                .inner
                .children
                .borrow_mut()
                .retain(|child| child != self);
        }
        self.clear_subtree();
        self.inner.root.last_dirty_watcher.set(None);
    }

    fn clear_subtree(&self) {
        self.inner.destroyed.set(!self.is_root());
        let watchers = std::mem::take(&mut *self.inner.watchers.borrow_mut());
        for watcher in watchers {
            watcher.mark_removed();
        }
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children {
            child.clear_subtree();
        }
        self.inner.post_digest_queue.borrow_mut().clear();
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Read a property.
    ///
    /// Checks this scope first, then (unless isolated) its parent, and so on up
    /// the chain. Returns [`Value::Undefined`] when nothing is found.
    pub fn get(&self, name: &str) -> Value {
        if let Some(value) = self.inner.properties.borrow().get(name) {
            return value.clone();
        }
        if self.inner.isolated {
            return Value::Undefined;
        }
        self.parent()
            .map_or(Value::Undefined, |parent| parent.get(name))
    }

    /// Write a property on this scope. Never writes through to a parent.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .properties
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Returns true if this scope itself holds the property.
    pub fn has_own(&self, name: &str) -> bool {
        self.inner.properties.borrow().contains_key(name)
    }

    /// Remove a property from this scope, returning its value.
    ///
    /// An inherited value becomes visible again afterwards.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.inner.properties.borrow_mut().remove(name)
    }

    /// Names of the properties held by this scope itself.
    pub fn own_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.properties.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a root [`Scope`].
pub struct ScopeBuilder {
    ttl: usize,
    scheduler: Option<Rc<dyn Scheduler>>,
    tracer: Box<dyn Tracer>,
}

impl Default for ScopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            scheduler: None,
            tracer: Box::new(TracingTracer),
        }
    }

    /// Set the digest iteration bound. Defaults to [`DEFAULT_TTL`].
    ///
    /// A digest runs at most `ttl + 1` passes; it fails if the last allowed
    /// pass is still dirty or leaves `eval_async` work behind.
    pub fn ttl(mut self, ttl: usize) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the host scheduler used by `eval_async` and `apply_async`.
    ///
    /// **Defaults to a private [`ManualScheduler`] that nothing drives.**
    /// Without a host scheduler, `eval_async` and `apply_async` work never
    /// runs on its own: it waits for the next explicit `digest` or `apply`,
    /// which also cancels the fallback it armed. Embedders that rely on
    /// deferred delivery must supply a scheduler they drive.
    pub fn scheduler<S: Scheduler + 'static>(mut self, scheduler: Rc<S>) -> Self {
        self.scheduler = Some(scheduler as Rc<dyn Scheduler>);
        self
    }

    /// Set the tracer. Defaults to [`TracingTracer`].
    pub fn tracer<T: Tracer>(mut self, tracer: T) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Build the root scope.
    pub fn build(self) -> Scope {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(ManualScheduler::new()));
        let tracer = self.tracer;
        let ttl = self.ttl;
        let inner = Rc::new_cyclic(|weak| {
            let root = Rc::new(RootState {
                scope: weak.clone(),
                ttl,
                phase: Cell::new(None),
                last_dirty_watcher: Cell::new(None),
                async_queue: RefCell::new(VecDeque::new()),
                eval_async_pending: Cell::new(None),
                apply_async_queue: RefCell::new(VecDeque::new()),
                apply_async_pending: Cell::new(None),
                scheduler,
                tracer,
                next_scope_id: Cell::new(1),
                next_watcher_id: Cell::new(0),
            });
            ScopeInner::new(ScopeId(0), root, None, false)
        });
        Scope::from_inner(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_reads_through_to_parent() {
        let parent = Scope::new();
        let child = parent.new_child();

        parent.set("a", 1);
        assert_eq!(child.get("a"), Value::from(1));
        assert!(!child.has_own("a"));

        child.set("a", 2);
        assert_eq!(child.get("a"), Value::from(2));
        assert_eq!(parent.get("a"), Value::from(1));

        child.remove("a");
        assert_eq!(child.get("a"), Value::from(1));
    }

    #[test]
    fn test_isolated_child_does_not_inherit() {
        let parent = Scope::new();
        parent.set("a", 1);
        let child = parent.new_isolated_child();
        assert!(child.get("a").is_undefined());
        assert!(child.is_isolated());
        assert_eq!(child.parent(), Some(parent));
    }

    #[test]
    fn test_ids_and_root() {
        let root = Scope::new();
        let a = root.new_child();
        let b = a.new_isolated_child();

        assert_eq!(root.id(), ScopeId(0));
        assert_ne!(a.id(), b.id());
        assert!(root.is_root());
        assert!(!b.is_root());
        assert_eq!(b.root(), root);
        assert_eq!(root.children(), vec![a.clone()]);
        assert_eq!(a.children(), vec![b]);
    }

    #[test]
    fn test_destroy_detaches_subtree() {
        let root = Scope::new();
        let a = root.new_child();
        let b = a.new_child();

        a.destroy();
        assert!(root.children().is_empty());
        assert!(a.is_destroyed());
        assert!(b.is_destroyed());
        assert!(a.children().is_empty());
        assert!(!root.is_destroyed());
    }

    #[test]
    fn test_own_keys_are_sorted() {
        let scope = Scope::new();
        scope.set("b", 1);
        scope.set("a", 2);
        assert_eq!(scope.own_keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
