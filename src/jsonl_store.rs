//! Daily JSONL files as a log table
//!
//! Each batch is appended to `<dir>/<YYYY-MM-DD>.jsonl`, one record per
//! line. Rows are grouped by their partition date, serialized up front, and
//! each file receives its share in a single locked write.

use crate::error::StoreError;
use crate::store::{Dated, TableStore};
use async_trait::async_trait;
use fs2::FileExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Environment variable overriding the log directory
pub const LOG_DIR_ENV: &str = "TABLE_LOGGER_DIR";

/// JSONL store rooted at a log directory
#[derive(Debug, Clone)]
pub struct JsonlStore {
    logs_dir: PathBuf,
}

impl JsonlStore {
    /// Create a new store, creating the directory if needed
    pub fn new(logs_dir: PathBuf) -> io::Result<Self> {
        if !logs_dir.exists() {
            fs::create_dir_all(&logs_dir)?;
        }

        Ok(Self { logs_dir })
    }

    /// Create from environment variable or default location
    pub fn from_env() -> io::Result<Self> {
        let logs_dir = match std::env::var(LOG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_logs_dir()?,
        };

        Self::new(logs_dir)
    }

    /// Get the log file path for a specific date
    pub fn get_log_file_path(&self, date: &str) -> PathBuf {
        self.logs_dir.join(format!("{}.jsonl", date))
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// A factory handing out handles onto this directory
    pub fn factory(&self) -> impl Fn() -> Result<Self, StoreError> + Send + Sync + 'static {
        let store = self.clone();
        move || Ok(store.clone())
    }

    /// Append a batch synchronously, returning the number of lines written
    ///
    /// Serialization happens before any file is touched, so a row that fails
    /// to serialize leaves every file unchanged. The exclusive lock keeps
    /// lines from concurrent processes from interleaving.
    ///
    /// A batch spanning several dates is one append per file. If a later file
    /// fails, the rows already appended stay and the error is a
    /// [`StoreError::PartialWrite`] carrying their count.
    pub fn write_batch_sync<L>(&self, batch: &[L]) -> Result<usize, StoreError>
    where
        L: Serialize + Dated,
    {
        let mut by_date: BTreeMap<String, (usize, Vec<u8>)> = BTreeMap::new();
        for row in batch {
            let (rows, buf) = by_date.entry(row.partition_date()).or_default();
            serde_json::to_writer(&mut *buf, row)?;
            buf.push(b'\n');
            *rows += 1;
        }

        let mut persisted = 0;
        for (date, (rows, lines)) in &by_date {
            if let Err(e) = self.append(date, lines) {
                return Err(match persisted {
                    0 => e.into(),
                    _ => StoreError::PartialWrite {
                        persisted,
                        source: Box::new(e.into()),
                    },
                });
            }
            persisted += rows;
        }

        Ok(persisted)
    }

    fn append(&self, date: &str, lines: &[u8]) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.get_log_file_path(date))?;

        file.lock_exclusive()?;

        let mut writer = BufWriter::with_capacity(8192, file);
        writer.write_all(lines)?;
        writer.flush()?;

        // Lock is released when the file is dropped
        Ok(())
    }
}

#[async_trait]
impl<L> TableStore<L> for JsonlStore
where
    L: Serialize + Dated + Send + 'static,
{
    async fn insert_batch(&mut self, batch: Vec<L>) -> Result<(), StoreError> {
        let store = self.clone();

        // Run synchronous I/O in blocking thread pool
        tokio::task::spawn_blocking(move || store.write_batch_sync(&batch)).await??;
        Ok(())
    }
}

/// `~/.table-logger`, the default for every store file
pub(crate) fn default_logs_dir() -> io::Result<PathBuf> {
    // Respect $HOME first (for tests/sandbox), fall back to dirs::home_dir()
    let home = std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Could not determine home directory")
        })?;
    Ok(home.join(".table-logger"))
}
