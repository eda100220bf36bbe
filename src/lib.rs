//! Scope-Flow: a dirty-checking change-propagation engine.
//!
//! State lives in a tree of [`Scope`]s. Watchers registered on a scope observe
//! a computed [`Value`] and react when it changes. A [`digest`](Scope::digest)
//! re-evaluates every watcher in a subtree, pass after pass, until nothing
//! changes or the iteration bound is hit.
//!
//! # Key Features
//!
//! - **Property inheritance**: child scopes read through to their parent unless isolated
//! - **Short-circuit passes**: a pass stops once it comes back to the last dirty watcher clean
//! - **Bounded digests**: a digest that never settles fails with [`ScopeError::TtlExceeded`]
//! - **Async queues**: `eval_async`, coalesced `apply_async` and per-scope `post_digest`
//! - **Watch groups**: one listener call per pass for several watched expressions
//! - **Pluggable host timer**: deferred work goes through a [`Scheduler`]
//! - **Observability**: every step is reported to a [`Tracer`]
//!
//! # Example
//!
//! ```
//! use scope_flow::{Scope, Value};
//!
//! let root = Scope::new();
//! root.set("first", "Jane");
//! root.set("last", "Doe");
//!
//! let child = root.new_child();
//! child.watch(
//!     |scope| {
//!         let first = scope.get("first");
//!         let last = scope.get("last");
//!         Ok(Value::from(format!(
//!             "{} {}",
//!             first.as_str().unwrap_or_default(),
//!             last.as_str().unwrap_or_default()
//!         )))
//!     },
//!     |full, _old, scope| {
//!         scope.set("full", full.clone());
//!         Ok(())
//!     },
//! );
//!
//! root.apply(|scope| {
//!     scope.set("first", "John");
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(child.get("full"), Value::from("John Doe"));
//! ```
//!
//! # Errors
//!
//! Only two conditions are fatal: a digest that does not settle, and starting
//! a digest or `apply` while one is running. Failures inside watch functions,
//! listeners and queued tasks are reported to the [`Tracer`] (by default, the
//! `tracing` crate) and the digest carries on.
//!
//! See the [`tracer`] and [`inspector`] modules for observing digests.

mod digest;
pub mod equality;
mod error;
pub mod inspector;
mod queue;
mod scheduler;
mod scope;
pub mod tracer;
mod value;
mod watch_group;
mod watcher;

pub use equality::Comparison;
pub use error::{CallbackKind, Phase, ScopeError};
pub use scheduler::{DeferredTask, ManualScheduler, Scheduler, TaskId};
pub use scope::{Scope, ScopeBuilder, ScopeId, DEFAULT_TTL};
pub use tracer::{NoopTracer, Tracer, TracingTracer};
pub use value::{Array, Object, Value};
pub use watcher::{ListenerFn, Watch, WatchFn, WatchHandle, WatcherId};
