//! Batching table logger
//!
//! Producers append to a lock-free queue and then probe a single-permit
//! flush gate without waiting. Whoever wins the gate drains the queue in
//! batches of at most `batch_size` rows, one store round-trip per batch.
//! There is no background worker: the flush runs on the winning caller's
//! task, and everyone else returns as soon as their entry is queued.

use crate::error::{LoggerError, Result, StoreError};
use crate::error_sink::{ErrorSink, StderrSink};
use crate::store::{StoreFactory, TableStore};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Rows drained per store round-trip unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// What a single enqueue or flush call did with the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush held the gate; the entry stays queued for it.
    Skipped,
    /// This call held the gate and persisted these batches.
    Drained { batches: usize, entries: usize },
}

impl FlushOutcome {
    /// Entries persisted by this call
    pub fn entries(&self) -> usize {
        match self {
            FlushOutcome::Skipped => 0,
            FlushOutcome::Drained { entries, .. } => *entries,
        }
    }
}

#[derive(Default)]
struct Totals {
    batches: usize,
    entries: usize,
}

/// Queues log rows from any number of concurrent callers and writes them to
/// a table in bounded batches, with at most one flush in flight.
pub struct TableLogger<L, F> {
    factory: F,
    sender: Sender<L>,
    receiver: Receiver<L>,
    gate: Semaphore,
    batch_size: usize,
    sink: Arc<dyn ErrorSink>,
}

impl<L, F> TableLogger<L, F>
where
    L: Send + 'static,
    F: StoreFactory<L>,
{
    /// Create a logger that opens a fresh store from `factory` per batch.
    pub fn new(factory: F) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            factory,
            sender,
            receiver,
            gate: Semaphore::new(1),
            batch_size: DEFAULT_BATCH_SIZE,
            sink: Arc::new(StderrSink),
        }
    }

    /// Set the maximum rows per batch. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replace the default stderr failure report.
    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rows queued and not yet drained
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Queue `entry` and try to flush.
    ///
    /// Returns [`FlushOutcome::Skipped`] right away when another caller is
    /// already flushing; that flush (or a later one) will persist the entry.
    /// A triggered `cancel` fails the call with
    /// [`LoggerError::OperationCancelled`] and leaves the entry queued.
    pub async fn enqueue(
        &self,
        entry: impl Into<Option<L>>,
        cancel: &CancellationToken,
    ) -> Result<FlushOutcome> {
        let entry = entry
            .into()
            .ok_or(LoggerError::InvalidArgument("log entry must not be empty"))?;

        // Both ends live in self, so the channel is never disconnected.
        let _ = self.sender.send(entry);

        self.try_flush(cancel).await
    }

    /// Wait for the gate and drain everything queued.
    ///
    /// Unlike [`enqueue`](Self::enqueue) this waits for an in-progress flush
    /// to finish instead of skipping, which makes it suitable for shutdown.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<FlushOutcome> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoggerError::OperationCancelled),
            permit = self.gate.acquire() => permit,
        };

        match permit {
            Ok(permit) => self.drain_holding(permit, cancel).await,
            // The gate is never closed
            Err(_) => Ok(FlushOutcome::Skipped),
        }
    }

    async fn try_flush(&self, cancel: &CancellationToken) -> Result<FlushOutcome> {
        if cancel.is_cancelled() {
            return Err(LoggerError::OperationCancelled);
        }

        match self.gate.try_acquire() {
            Ok(permit) => self.drain_holding(permit, cancel).await,
            Err(_) => {
                trace!("flush already in progress, entry left queued");
                Ok(FlushOutcome::Skipped)
            }
        }
    }

    /// Drain while holding the gate, then re-probe it once released.
    ///
    /// A producer that enqueued after our last emptiness check saw the gate
    /// taken and returned, so its entry is ours to pick up.
    async fn drain_holding(
        &self,
        mut permit: SemaphorePermit<'_>,
        cancel: &CancellationToken,
    ) -> Result<FlushOutcome> {
        let mut totals = Totals::default();

        loop {
            self.drain(cancel, &mut totals).await?;
            drop(permit);

            if self.receiver.is_empty() {
                break;
            }
            permit = match self.gate.try_acquire() {
                Ok(permit) => permit,
                Err(_) => break,
            };
        }

        if totals.batches > 0 {
            debug!(
                batches = totals.batches,
                entries = totals.entries,
                "flush finished"
            );
        }

        Ok(FlushOutcome::Drained {
            batches: totals.batches,
            entries: totals.entries,
        })
    }

    async fn drain(&self, cancel: &CancellationToken, totals: &mut Totals) -> Result<()> {
        while !self.receiver.is_empty() {
            if cancel.is_cancelled() {
                return Err(LoggerError::OperationCancelled);
            }

            let batch: Vec<L> = self.receiver.try_iter().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let count = batch.len();
            if let Err(source) = self.write_batch(batch).await {
                let dropped = count.saturating_sub(source.persisted());
                self.sink.report(&source);
                error!(error = %source, dropped, "batch write failed");
                return Err(LoggerError::LoggingFailure { dropped, source });
            }

            totals.batches += 1;
            totals.entries += count;
        }

        Ok(())
    }

    async fn write_batch(&self, batch: Vec<L>) -> Result<(), StoreError> {
        // The handle lives for this one write and is dropped on every path
        let mut store = self.factory.open()?;
        store.insert_batch(batch).await
    }
}
