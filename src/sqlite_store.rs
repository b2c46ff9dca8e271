//! SQLite table store
//!
//! Rows are stored as JSON payloads next to an auto-increment key and their
//! timestamp. Every batch is inserted inside one transaction.

use crate::error::StoreError;
use crate::store::{Dated, TableStore};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Table used when the configuration does not name one
pub const DEFAULT_TABLE: &str = "logs";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection onto a log table
pub struct SqliteStore {
    // Taken while a write runs on the blocking pool
    conn: Option<Connection>,
    table: String,
}

impl SqliteStore {
    /// Open the database and create the table if it does not exist
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;

        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                logged_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );"
        ))?;

        Ok(Self {
            conn: Some(conn),
            table: table.to_string(),
        })
    }

    /// A factory opening a new connection per batch
    pub fn factory(
        path: PathBuf,
        table: String,
    ) -> impl Fn() -> Result<Self, StoreError> + Send + Sync + 'static {
        move || Self::open(&path, &table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of rows in the table
    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.connection()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// All rows with their keys, in key order
    pub fn rows<L: DeserializeOwned>(&self) -> Result<Vec<(i64, L)>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, payload FROM {} ORDER BY id",
            self.table
        ))?;
        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, payload)| -> Result<(i64, L), StoreError> {
                Ok((id, serde_json::from_str(&payload)?))
            })
            .collect()
    }

    /// The newest `n` rows with their keys, oldest first
    pub fn last_rows<L: DeserializeOwned>(&self, n: usize) -> Result<Vec<(i64, L)>, StoreError> {
        let conn = self.connection()?;
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&format!(
            "SELECT id, payload FROM {} ORDER BY id DESC LIMIT ?1",
            self.table
        ))?;
        let raw = stmt
            .query_map(params![limit], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .rev()
            .map(|(id, payload)| -> Result<(i64, L), StoreError> {
                Ok((id, serde_json::from_str(&payload)?))
            })
            .collect()
    }

    fn connection(&self) -> Result<&Connection, StoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| StoreError::Rejected("connection lost in a failed write".to_string()))
    }
}

#[async_trait]
impl<L> TableStore<L> for SqliteStore
where
    L: Serialize + Dated + Send + 'static,
{
    async fn insert_batch(&mut self, batch: Vec<L>) -> Result<(), StoreError> {
        let rows = batch
            .iter()
            .map(|row| -> Result<(String, String), StoreError> {
                Ok((row.logged_at().to_rfc3339(), serde_json::to_string(row)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| StoreError::Rejected("connection lost in a failed write".to_string()))?;
        let table = self.table.clone();

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = insert_rows(&mut conn, &table, &rows);
            (conn, result)
        })
        .await?;

        self.conn = Some(conn);
        result?;
        Ok(())
    }
}

fn insert_rows(
    conn: &mut Connection,
    table: &str,
    rows: &[(String, String)],
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} (logged_at, payload) VALUES (?1, ?2)"
        ))?;
        for (logged_at, payload) in rows {
            stmt.execute(params![logged_at, payload])?;
        }
    }
    tx.commit()
}

/// Table names are interpolated into SQL, so only identifiers pass
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::Rejected(format!("invalid table name: {:?}", table)))
    }
}
