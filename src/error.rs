//! Error types for the table logger and its stores

use thiserror::Error;

/// Errors surfaced to the caller that drove an enqueue or a flush.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The caller passed no log entry.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The caller's cancellation token was triggered.
    #[error("operation cancelled")]
    OperationCancelled,

    /// A drained batch could not be persisted. The `dropped` entries left the
    /// queue with that batch and are not re-enqueued.
    #[error("critical failure while logging ({dropped} entries dropped)")]
    LoggingFailure {
        dropped: usize,
        #[source]
        source: StoreError,
    },
}

impl LoggerError {
    /// The store error behind a `LoggingFailure`, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            LoggerError::LoggingFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures reported by a [`TableStore`](crate::store::TableStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Store-defined failure.
    #[error("store rejected batch: {0}")]
    Rejected(String),

    /// The first `persisted` rows of the batch were written before `source`
    /// stopped the rest.
    #[error("batch partially written ({persisted} rows persisted): {source}")]
    PartialWrite {
        persisted: usize,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Rows of the failed batch that reached the table anyway
    pub fn persisted(&self) -> usize {
        match self {
            StoreError::PartialWrite { persisted, .. } => *persisted,
            _ => 0,
        }
    }
}

pub type Result<T, E = LoggerError> = std::result::Result<T, E>;
