//! Table Logger - batching log writer for JSONL and SQLite tables
//!
//! All commands share one configuration: a TOML file passed with `--config`,
//! or environment variables (`TABLE_LOGGER_STORE`, `TABLE_LOGGER_DIR`,
//! `TABLE_LOGGER_SQLITE_PATH`, `TABLE_LOGGER_BATCH_SIZE`).
//!
//! ## Usage
//!
//! ### Ingest newline-delimited JSON
//! ```bash
//! my-app 2>&1 | jq -c '{level, message, source}' | table-logger ingest
//! ```
//!
//! ### Write one record
//! ```bash
//! table-logger write --level WARN --source deploy "rollout paused"
//! ```
//!
//! ### Read recent records
//! ```bash
//! table-logger tail --lines 20
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use table_logger::schema::DEFAULT_LEVEL;
use table_logger::{
    read_last_n_lines, CancellationToken, JsonlStore, LogRecord, LoggerConfig, LoggerError,
    SqliteStore, StoreFactory, StoreKind, TableLogger,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "table-logger")]
#[command(about = "Table Logger - batching log writer for JSONL and SQLite tables", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Rows per batch (overrides config)
    #[arg(short, long, global = true)]
    batch_size: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read JSON records from stdin, one per line, and log them
    Ingest,
    /// Log a single message
    Write {
        #[arg(short, long, default_value = DEFAULT_LEVEL)]
        level: String,
        #[arg(short, long)]
        source: Option<String>,
        message: String,
    },
    /// Print the most recent records
    Tail {
        /// Date to read (YYYY-MM-DD format, JSONL store only), defaults to today
        #[arg(short, long)]
        date: Option<String>,
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

/// Loose input accepted by `ingest` when a line is not a full record
#[derive(Debug, Deserialize)]
struct IngestInput {
    level: Option<String>,
    message: String,
    source: Option<String>,
    stack_trace: Option<String>,
}

enum Job {
    Write(LogRecord),
    Ingest,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for tail output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => LoggerConfig::from_file(path)?,
        None => LoggerConfig::from_env(),
    };
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;

    let job = match cli.command {
        Commands::Tail { date, lines } => return run_tail(&config, date, lines),
        Commands::Write {
            level,
            source,
            message,
        } => {
            let mut record = LogRecord::new(level, message);
            if let Some(source) = source {
                record = record.with_source(source);
            }
            Job::Write(record)
        }
        Commands::Ingest => Job::Ingest,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_job(config, job));
    // A stdin read parked on the blocking pool cannot be cancelled
    runtime.shutdown_background();
    result
}

/// Build the configured store and run `job` against it
async fn run_job(config: LoggerConfig, job: Job) -> Result<()> {
    match config.store.kind {
        StoreKind::Jsonl => {
            let store = JsonlStore::new(config.store.dir.clone())
                .context("Failed to create log directory")?;
            let logger = TableLogger::new(store.factory()).with_batch_size(config.batch_size);
            run_with_logger(Arc::new(logger), job).await
        }
        StoreKind::Sqlite => {
            let path = config.store.sqlite_path.clone();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
            // Fail on a bad path or table name before reading any input
            SqliteStore::open(&path, &config.store.table).context("Failed to open database")?;

            let factory = SqliteStore::factory(path, config.store.table.clone());
            let logger = TableLogger::new(factory).with_batch_size(config.batch_size);
            run_with_logger(Arc::new(logger), job).await
        }
    }
}

async fn run_with_logger<F>(logger: Arc<TableLogger<LogRecord, F>>, job: Job) -> Result<()>
where
    F: StoreFactory<LogRecord> + 'static,
{
    let cancel = CancellationToken::new();

    let summary = match job {
        Job::Write(record) => {
            logger.enqueue(record, &cancel).await?;
            None
        }
        Job::Ingest => {
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });
            let stdin = BufReader::new(tokio::io::stdin());
            Some(ingest_lines(stdin, &logger, &cancel).await?)
        }
    };

    // Rows queued behind a cancelled or failed flush still get written
    logger.flush(&CancellationToken::new()).await?;

    if let Some(summary) = summary {
        summary.ensure_persisted()?;
    }
    Ok(())
}

/// Tasks kept in flight before ingest waits for the oldest ones
const MAX_INGEST_TASKS: usize = 1024;

#[derive(Debug, Default, PartialEq, Eq)]
struct IngestSummary {
    accepted: usize,
    skipped: usize,
    /// Flushes that hit a store failure
    failed: usize,
    dropped: usize,
}

impl IngestSummary {
    fn record(&mut self, joined: std::result::Result<LoggerResult, JoinError>) -> Result<()> {
        match joined? {
            Ok(_) | Err(LoggerError::OperationCancelled) => self.accepted += 1,
            Err(e) => {
                error!("{}", e);
                if let LoggerError::LoggingFailure { dropped, .. } = e {
                    self.dropped += dropped;
                }
                self.failed += 1;
            }
        }
        Ok(())
    }

    fn ensure_persisted(&self) -> Result<()> {
        if self.failed > 0 {
            bail!(
                "{} batches failed to persist, {} records dropped",
                self.failed,
                self.dropped
            );
        }
        Ok(())
    }
}

type LoggerResult = std::result::Result<table_logger::FlushOutcome, LoggerError>;

/// Enqueue every input line on its own task so lines arriving during a
/// write are batched together
///
/// Stops reading as soon as `cancel` fires, even while waiting for input.
async fn ingest_lines<R, F>(
    reader: R,
    logger: &Arc<TableLogger<LogRecord, F>>,
    cancel: &CancellationToken,
) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
    F: StoreFactory<LogRecord> + 'static,
{
    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();
    let mut summary = IngestSummary::default();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Interrupted, no further input will be read");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let record = match parse_ingest_line(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping line: {:#}", e);
                summary.skipped += 1;
                continue;
            }
        };

        while let Some(joined) = tasks.try_join_next() {
            summary.record(joined)?;
        }
        if tasks.len() >= MAX_INGEST_TASKS {
            if let Some(joined) = tasks.join_next().await {
                summary.record(joined)?;
            }
        }

        let logger = Arc::clone(logger);
        let cancel = cancel.clone();
        tasks.spawn(async move { logger.enqueue(record, &cancel).await });
    }

    while let Some(joined) = tasks.join_next().await {
        summary.record(joined)?;
    }

    info!(
        accepted = summary.accepted,
        skipped = summary.skipped,
        failed = summary.failed,
        "Ingest finished"
    );
    Ok(summary)
}

/// Accept a full `LogRecord` or a `{level, message, source, stack_trace}` object
fn parse_ingest_line(line: &str) -> Result<LogRecord> {
    if let Ok(record) = serde_json::from_str::<LogRecord>(line) {
        return Ok(record);
    }

    let input: IngestInput = serde_json::from_str(line).context("Invalid JSON input")?;
    let mut record = LogRecord::new(
        input.level.unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        input.message,
    );
    if let Some(source) = input.source {
        record = record.with_source(source);
    }
    if let Some(stack_trace) = input.stack_trace {
        record = record.with_stack_trace(stack_trace);
    }
    Ok(record)
}

fn run_tail(config: &LoggerConfig, date: Option<String>, lines: usize) -> Result<()> {
    let records: Vec<LogRecord> = match config.store.kind {
        StoreKind::Jsonl => {
            let date = date.unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
            validate_date_format(&date)?;

            let store = JsonlStore::new(config.store.dir.clone())?;
            let log_file_path = store.get_log_file_path(&date);
            if !log_file_path.exists() {
                println!("No logs found for date: {}", date);
                return Ok(());
            }

            read_last_n_lines(&log_file_path, lines).context("Failed to read log file")?
        }
        StoreKind::Sqlite => {
            if date.is_some() {
                bail!("--date applies to the JSONL store only");
            }
            let store = SqliteStore::open(&config.store.sqlite_path, &config.store.table)
                .context("Failed to open database")?;
            store
                .last_rows::<LogRecord>(lines)?
                .into_iter()
                .map(|(id, mut record)| {
                    record.id = Some(id);
                    record
                })
                .collect()
        }
    };

    for record in records {
        println!("{}", record.summary());
    }
    Ok(())
}

/// Validate date format (YYYY-MM-DD)
fn validate_date_format(date: &str) -> Result<()> {
    if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() || date.len() != 10 {
        bail!("Invalid date format. Expected YYYY-MM-DD");
    }
    Ok(())
}
