//! Event sink trait and implementations.
//!
//! The `EventSink` trait defines the interface for receiving digest events.
//! Implementations can collect events for testing, filter them, or write them
//! out as JSON lines.

use std::io::{self, Write};

use parking_lot::Mutex;

use crate::inspector::events::DigestEvent;

/// Trait for receiving digest events.
///
/// # Example
///
/// ```
/// use scope_flow::inspector::{DigestEvent, EventSink};
///
/// struct PrintSink;
///
/// impl EventSink for PrintSink {
///     fn emit(&self, event: DigestEvent) {
///         println!("{:?}", event);
///     }
/// }
/// ```
pub trait EventSink: Send + Sync + 'static {
    /// Called when an event occurs.
    fn emit(&self, event: DigestEvent);

    /// Called when a digest settles or fails, to flush buffered events.
    ///
    /// The default implementation does nothing.
    fn flush(&self) {}
}

/// Writes each event as one line of JSON.
///
/// Suitable for exporting digest traces to a file for later analysis. Write
/// failures are logged and the event is dropped; they never reach the digest.
///
/// # Example
///
/// ```
/// use scope_flow::inspector::{EventSinkTracer, JsonLinesSink};
/// use scope_flow::Scope;
/// use std::sync::Arc;
///
/// let sink = Arc::new(JsonLinesSink::new(Vec::new()));
/// let scope = Scope::builder()
///     .tracer(EventSinkTracer::new(sink.clone()))
///     .build();
/// scope.digest().unwrap();
///
/// let lines = sink.with_writer(|out| String::from_utf8_lossy(out).lines().count());
/// assert_eq!(lines, 3);
/// ```
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Run `f` with exclusive access to the underlying writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut writer = self.writer.lock();
        f(&mut *writer)
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_line(writer: &mut W, event: &DigestEvent) -> io::Result<()> {
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")
    }
}

impl<W: Write + Send + 'static> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: DigestEvent) {
        let mut writer = self.writer.lock();
        if let Err(error) = Self::write_line(&mut *writer, &event) {
            tracing::warn!(%error, "failed to write digest event");
        }
    }

    fn flush(&self) {
        if let Err(error) = self.writer.lock().flush() {
            tracing::warn!(%error, "failed to flush digest events");
        }
    }
}

/// A sink that filters events before forwarding.
pub struct FilterSink<F, S>
where
    F: Fn(&DigestEvent) -> bool + Send + Sync + 'static,
    S: EventSink,
{
    filter: F,
    inner: S,
}

impl<F, S> FilterSink<F, S>
where
    F: Fn(&DigestEvent) -> bool + Send + Sync + 'static,
    S: EventSink,
{
    pub fn new(filter: F, inner: S) -> Self {
        Self { filter, inner }
    }

    /// The sink events are forwarded to.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<F, S> EventSink for FilterSink<F, S>
where
    F: Fn(&DigestEvent) -> bool + Send + Sync + 'static,
    S: EventSink,
{
    fn emit(&self, event: DigestEvent) {
        if (self.filter)(&event) {
            self.inner.emit(event);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, event: DigestEvent) {
        (**self).emit(event)
    }

    fn flush(&self) {
        (**self).flush()
    }
}
