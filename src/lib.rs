//! Table Logger library components
//!
//! A batching logger that queues rows from concurrent callers and persists
//! them to a table in bounded batches, plus the stores, record schema,
//! tracing bridge and small cache that ship with it.

pub mod cache;
pub mod config;
pub mod error;
pub mod error_sink;
pub mod jsonl_store;
pub mod schema;
pub mod sqlite_store;
pub mod store;
pub mod table_logger;
pub mod tail_reader;
pub mod tracing_layer;

// Re-export commonly used types
pub use cache::TtlCache;
pub use config::{LoggerConfig, StoreKind};
pub use error::{LoggerError, StoreError};
pub use error_sink::{ErrorSink, StderrSink};
pub use jsonl_store::JsonlStore;
pub use schema::LogRecord;
pub use sqlite_store::SqliteStore;
pub use store::{Dated, MemoryStore, StoreFactory, TableStore};
pub use table_logger::{FlushOutcome, TableLogger, DEFAULT_BATCH_SIZE};
pub use tail_reader::read_last_n_lines;
pub use tracing_layer::TableLoggerLayer;
pub use tokio_util::sync::CancellationToken;
