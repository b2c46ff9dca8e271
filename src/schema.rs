//! Log record written by the bundled stores, CLI and tracing bridge
//!
//! The logger itself is generic over its row type; `LogRecord` is the row
//! this crate ships for callers that have no table shape of their own.

use crate::store::Dated;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Level used when a caller does not name one
pub const DEFAULT_LEVEL: &str = "INFO";

/// One row of the log table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Schema version for migration support
    pub schema_version: u32,
    /// Key assigned by a store; absent until persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Correlation ID for linking related records
    pub correlation_id: Uuid,
    /// When the record was created
    pub logged_at: DateTime<Utc>,
    /// Date in YYYY-MM-DD format for file organization
    pub date: String,
    /// Log level (INFO, ERROR, WARN, etc.)
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Class, module or target that produced the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            id: None,
            correlation_id: Uuid::new_v4(),
            logged_at: now,
            date: now.format("%Y-%m-%d").to_string(),
            level: level.into(),
            message: message.into(),
            stack_trace: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// One-line rendering used by the CLI tail output
    pub fn summary(&self) -> String {
        let mut line = format!(
            "[{}] [{}] {}",
            self.logged_at.format("%H:%M:%S"),
            self.level,
            self.message
        );
        if let Some(source) = &self.source {
            line.push_str(&format!(" ({})", source));
        }
        line
    }
}

impl Dated for LogRecord {
    fn logged_at(&self) -> DateTime<Utc> {
        self.logged_at
    }

    fn partition_date(&self) -> String {
        self.date.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_fields() {
        let record = LogRecord::new("ERROR", "disk full")
            .with_source("worker")
            .with_stack_trace("at main");

        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert_eq!(record.id, None);
        assert_eq!(record.date, record.logged_at.format("%Y-%m-%d").to_string());
        assert_eq!(record.source.as_deref(), Some("worker"));
        assert_eq!(record.stack_trace.as_deref(), Some("at main"));
    }

    #[test]
    fn test_serialization_omits_empty_optionals() {
        let record = LogRecord::new("INFO", "Test message");

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"level\":\"INFO\""));
        assert!(json.contains("\"message\":\"Test message\""));
        assert!(json.contains("\"schema_version\":1"));
        assert!(!json.contains("stack_trace"));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_partition_date_uses_date_field() {
        let mut record = LogRecord::new("INFO", "backdated");
        record.date = "2025-01-02".to_string();
        assert_eq!(record.partition_date(), "2025-01-02");
    }

    #[test]
    fn test_summary_includes_source() {
        let record = LogRecord::new("WARN", "slow query").with_source("db");
        let summary = record.summary();
        assert!(summary.contains("[WARN] slow query (db)"));
    }
}
