//! Configuration for the table logger and its stores

use crate::jsonl_store::{default_logs_dir, LOG_DIR_ENV};
use crate::sqlite_store::DEFAULT_TABLE;
use crate::table_logger::DEFAULT_BATCH_SIZE;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const BATCH_SIZE_ENV: &str = "TABLE_LOGGER_BATCH_SIZE";
pub const STORE_KIND_ENV: &str = "TABLE_LOGGER_STORE";
pub const SQLITE_PATH_ENV: &str = "TABLE_LOGGER_SQLITE_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Jsonl,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_kind")]
    pub kind: StoreKind,

    /// Directory for daily JSONL files
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            dir: default_dir(),
            sqlite_path: default_sqlite_path(),
            table: default_table(),
        }
    }
}

impl LoggerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;
        let config: LoggerConfig =
            toml::from_str(&contents).context("Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from environment variables; unparseable values are ignored
    pub fn apply_env(&mut self) {
        if let Ok(size) = std::env::var(BATCH_SIZE_ENV) {
            if let Ok(size) = size.parse::<usize>() {
                if size > 0 {
                    self.batch_size = size;
                }
            }
        }

        if let Ok(kind) = std::env::var(STORE_KIND_ENV) {
            match kind.to_ascii_lowercase().as_str() {
                "jsonl" => self.store.kind = StoreKind::Jsonl,
                "sqlite" => self.store.kind = StoreKind::Sqlite,
                _ => {}
            }
        }

        if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
            self.store.dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var(SQLITE_PATH_ENV) {
            self.store.sqlite_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.store.table.is_empty() {
            bail!("store.table must not be empty");
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path.as_ref(), contents).context("Failed to write configuration file")?;
        Ok(())
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_store_kind() -> StoreKind {
    StoreKind::Jsonl
}

fn default_dir() -> PathBuf {
    // No home directory at all: relative to the working directory
    default_logs_dir().unwrap_or_else(|_| PathBuf::from(".table-logger"))
}

fn default_sqlite_path() -> PathBuf {
    default_dir().join("logs.db")
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}
