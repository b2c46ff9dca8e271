//! Common test utilities and helpers

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use table_logger::{StoreError, TableStore};
use tokio::sync::Notify;

/// Row type with the fields of a typical application log table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestLog {
    pub message: String,
    pub stack_trace: Option<String>,
    pub source: Option<String>,
}

impl TestLog {
    pub fn new(i: usize) -> Self {
        Self {
            message: format!("Log {}", i),
            stack_trace: Some(format!("StackTrace {}", i)),
            source: Some(format!("Test{}", i)),
        }
    }
}

/// Pauses the first batch write until released
#[allow(dead_code)]
pub struct Hold {
    pub started: Notify,
    pub release: Notify,
}

#[derive(Default)]
struct Shared {
    batches: Mutex<Vec<Vec<TestLog>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hold: Mutex<Option<Arc<Hold>>>,
}

/// Store double that records every batch it receives
///
/// Handles opened from one `RecordingStore` share their state, so the test
/// can inspect batches written through any of them.
#[derive(Clone, Default)]
pub struct RecordingStore {
    shared: Arc<Shared>,
    delay: Option<Duration>,
    failure: Option<String>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every write
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every batch with this message
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Block the next write until `hold.release` is notified
    pub fn hold_next_write(&self) -> Arc<Hold> {
        let hold = Arc::new(Hold {
            started: Notify::new(),
            release: Notify::new(),
        });
        *self.shared.hold.lock() = Some(hold.clone());
        hold
    }

    pub fn factory(&self) -> impl Fn() -> Result<RecordingStore, StoreError> + Send + Sync + 'static {
        let store = self.clone();
        move || Ok(store.clone())
    }

    pub fn batches(&self) -> Vec<Vec<TestLog>> {
        self.shared.batches.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.shared.batches.lock().iter().map(Vec::len).collect()
    }

    pub fn rows(&self) -> Vec<TestLog> {
        self.shared.batches.lock().iter().flatten().cloned().collect()
    }

    /// Number of insert calls, including failed ones
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableStore<TestLog> for RecordingStore {
    async fn insert_batch(&mut self, batch: Vec<TestLog>) -> Result<(), StoreError> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let hold = self.shared.hold.lock().take();
        if let Some(hold) = hold {
            hold.started.notify_one();
            hold.release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match &self.failure {
            Some(message) => Err(StoreError::Rejected(message.clone())),
            None => {
                self.shared.batches.lock().push(batch);
                Ok(())
            }
        };

        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Error sink that keeps every report
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl table_logger::ErrorSink for RecordingSink {
    fn report(&self, error: &StoreError) {
        self.reports.lock().push(error.to_string());
    }
}
