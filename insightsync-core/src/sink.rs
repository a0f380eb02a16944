//! Destination table abstraction.
//!
//! A sink accepts one batch of rows at a time. It either commits the whole
//! batch (empty error list) or rejects it with per-row error descriptors, in
//! which case none of that batch's rows are committed.

use crate::normalize::NormalizedRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use thiserror::Error;

/// `project.dataset.table` coordinates of the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// One reason a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowErrorDetail {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub message: String,
}

/// All rejection reasons for the row at `index` within its batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub index: usize,
    pub errors: Vec<RowErrorDetail>,
}

impl RowError {
    pub fn invalid(index: usize, location: &str, message: impl Into<String>) -> Self {
        Self {
            index,
            errors: vec![RowErrorDetail {
                reason: "invalid".to_string(),
                location: Some(location.to_string()),
                message: message.into(),
            }],
        }
    }
}

/// Sink-level failure (the batch could not be attempted at all).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet write failed: {0}")]
    Parquet(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only destination table.
pub trait TableSink {
    /// Human-readable sink name for logs.
    fn name(&self) -> &str;

    /// Insert one batch. Returns the row errors; empty means committed.
    fn insert_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<Vec<RowError>, SinkError>;
}

impl<S: TableSink + ?Sized> TableSink for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn insert_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<Vec<RowError>, SinkError> {
        (**self).insert_rows(table, rows)
    }
}

/// Writes rows as NDJSON to stdout. Never rejects a row.
pub struct StdoutSink;

impl TableSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn insert_rows(&self, _table: &TableRef, rows: &[NormalizedRow]) -> Result<Vec<RowError>, SinkError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for row in rows {
            serde_json::to_writer(&mut out, row)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(Vec::new())
    }
}
