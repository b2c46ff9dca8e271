//! Tracing layer that forwards events into a table logger

use crate::schema::LogRecord;
use crate::store::StoreFactory;
use crate::table_logger::TableLogger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;

/// A tracing layer that turns every event into a [`LogRecord`] row
///
/// Each event is enqueued on its own task of the current tokio runtime, so
/// emitting an event never waits on the store. Events emitted outside a
/// runtime are dropped, as are events from this crate, which would otherwise
/// feed the logger's own failure reports back into it.
pub struct TableLoggerLayer<F> {
    logger: Arc<TableLogger<LogRecord, F>>,
    cancel: CancellationToken,
}

impl<F> TableLoggerLayer<F> {
    pub fn new(logger: Arc<TableLogger<LogRecord, F>>) -> Self {
        Self {
            logger,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop flushing from tasks spawned by this layer
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<S, F> Layer<S> for TableLoggerLayer<F>
where
    S: Subscriber,
    F: StoreFactory<LogRecord> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target.starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));

        let mut record = LogRecord::new(metadata.level().to_string().to_uppercase(), message)
            .with_source(target);
        if let (Some(file), Some(line)) = (metadata.file(), metadata.line()) {
            record = record.with_stack_trace(format!("{}:{}", file, line));
        }

        let logger = Arc::clone(&self.logger);
        let cancel = self.cancel.clone();
        handle.spawn(async move {
            // Failures already went to the logger's error sink
            let _ = logger.enqueue(record, &cancel).await;
        });
    }
}

/// A visitor for extracting the message from tracing events
struct MessageVisitor<'a>(&'a mut String);

impl MessageVisitor<'_> {
    fn separate(&mut self) {
        if !self.0.is_empty() {
            self.0.push_str(", ");
        }
    }
}

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        if field.name() == "message" {
            let _ = write!(self.0, "{:?}", value);
        } else {
            self.separate();
            let _ = write!(self.0, "{} = {:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        } else {
            self.separate();
            self.0.push_str(&format!("{} = \"{}\"", field.name(), value));
        }
    }
}
