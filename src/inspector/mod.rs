//! Inspector: recording digest activity as structured events.
//!
//! - **EventCollector**: collects events for testing and assertion
//! - **FilterSink**: forwards only the events a predicate accepts
//! - **JsonLinesSink**: writes events as JSON lines for later analysis
//! - **EventSinkTracer**: plugs any sink into a [`Scope`](crate::Scope) as its tracer

mod collector;
mod events;
mod sink;
mod tracer_impl;

pub use collector::EventCollector;
pub use events::{DigestEvent, DigestTrace, EventKind};
pub use sink::{EventSink, FilterSink, JsonLinesSink};
pub use tracer_impl::EventSinkTracer;
