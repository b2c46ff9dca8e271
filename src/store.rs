//! Storage collaborators for the table logger
//!
//! A [`TableStore`] persists one batch per call. The logger never reuses a
//! store handle: every batch write asks the [`StoreFactory`] for a fresh one
//! and drops it when the write returns.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// A table that accepts ordered batches of rows.
#[async_trait]
pub trait TableStore<L: Send + 'static>: Send {
    /// Persist the whole batch as one transactional write.
    ///
    /// On error the entire batch is considered unpersisted, except the rows
    /// a [`StoreError::PartialWrite`] says were written.
    async fn insert_batch(&mut self, batch: Vec<L>) -> Result<(), StoreError>;
}

/// Produces a fresh [`TableStore`] handle for each batch write.
///
/// Any `Fn() -> Result<S, StoreError>` closure is a factory.
pub trait StoreFactory<L: Send + 'static>: Send + Sync {
    type Store: TableStore<L>;

    fn open(&self) -> Result<Self::Store, StoreError>;
}

impl<L, S, F> StoreFactory<L> for F
where
    L: Send + 'static,
    S: TableStore<L>,
    F: Fn() -> Result<S, StoreError> + Send + Sync,
{
    type Store = S;

    fn open(&self) -> Result<S, StoreError> {
        self()
    }
}

/// Rows that carry their own timestamp.
///
/// File and SQL stores use it to partition and index rows.
pub trait Dated {
    fn logged_at(&self) -> DateTime<Utc>;

    /// Partition key in `YYYY-MM-DD` form
    fn partition_date(&self) -> String {
        self.logged_at().format("%Y-%m-%d").to_string()
    }
}

struct MemoryTable<L> {
    rows: Vec<(i64, L)>,
    next_id: i64,
}

/// In-memory table with auto-increment ids.
///
/// Clones share the same table, so a clone handed out per batch writes
/// into the table the caller is holding.
pub struct MemoryStore<L> {
    table: Arc<Mutex<MemoryTable<L>>>,
}

impl<L> Clone for MemoryStore<L> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<L> Default for MemoryStore<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> MemoryStore<L> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(MemoryTable {
                rows: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Number of persisted rows
    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all rows with their assigned ids, in insertion order
    pub fn rows(&self) -> Vec<(i64, L)>
    where
        L: Clone,
    {
        self.table.lock().rows.clone()
    }

    /// A factory handing out handles onto this table
    pub fn factory(&self) -> impl Fn() -> Result<Self, StoreError> + Send + Sync + 'static
    where
        L: Send + 'static,
    {
        let store = self.clone();
        move || Ok(store.clone())
    }
}

#[async_trait]
impl<L: Send + 'static> TableStore<L> for MemoryStore<L> {
    async fn insert_batch(&mut self, batch: Vec<L>) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        for row in batch {
            let id = table.next_id;
            table.next_id += 1;
            table.rows.push((id, row));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_assigns_increasing_ids() {
        let store: MemoryStore<&str> = MemoryStore::new();
        let mut handle = store.clone();

        handle.insert_batch(vec!["a", "b"]).await.unwrap();
        handle.insert_batch(vec!["c"]).await.unwrap();

        assert_eq!(store.rows(), vec![(1, "a"), (2, "b"), (3, "c")]);
    }

    #[tokio::test]
    async fn test_memory_store_factory_shares_table() {
        let store: MemoryStore<u32> = MemoryStore::new();
        let factory = store.factory();

        let mut first = factory().unwrap();
        let mut second = factory().unwrap();
        first.insert_batch(vec![1, 2]).await.unwrap();
        second.insert_batch(vec![3]).await.unwrap();

        assert_eq!(store.len(), 3);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_partition_date_from_timestamp() {
        struct Row(DateTime<Utc>);
        impl Dated for Row {
            fn logged_at(&self) -> DateTime<Utc> {
                self.0
            }
        }

        let ts = DateTime::parse_from_rfc3339("2025-03-04T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Row(ts).partition_date(), "2025-03-04");
    }
}
