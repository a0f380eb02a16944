//! Batched insert into a [`TableSink`].
//!
//! Rows are written in contiguous batches. The first batch that comes back
//! with row errors stops the load; earlier batches stay committed. Loads are
//! not idempotent: loading the same rows twice appends them twice.

use crate::diagnostics::{truncate_chars, MAX_DIAGNOSTIC_CHARS};
use crate::normalize::NormalizedRow;
use crate::sink::{RowError, SinkError, TableRef, TableSink};
use thiserror::Error;

/// Default maximum rows per insert call.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// How many row errors from a failing batch are written to the log.
pub const LOGGED_ROW_ERRORS: usize = 5;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(
        "insert into {table} failed: batch {batch} rejected with {} row error(s) ({committed} row(s) already committed)",
        .errors.len()
    )]
    RowErrors {
        table: String,
        /// Zero-based index of the rejected batch.
        batch: usize,
        committed: usize,
        errors: Vec<RowError>,
    },

    #[error("insert into {table} failed at batch {batch} ({committed} row(s) already committed): {source}")]
    Sink {
        table: String,
        batch: usize,
        committed: usize,
        #[source]
        source: SinkError,
    },
}

impl LoadError {
    /// Rows durably appended before the failure.
    pub fn committed(&self) -> usize {
        match self {
            LoadError::RowErrors { committed, .. } | LoadError::Sink { committed, .. } => *committed,
        }
    }
}

/// Splits rows into fixed-size batches and inserts them in order.
#[derive(Debug, Clone, Copy)]
pub struct BulkLoader {
    batch_size: usize,
}

impl Default for BulkLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BulkLoader {
    /// A batch size of zero is clamped to one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert `rows` into `table`. Returns the number of rows committed.
    pub fn load<S: TableSink + ?Sized>(
        &self,
        sink: &S,
        table: &TableRef,
        rows: &[NormalizedRow],
    ) -> Result<usize, LoadError> {
        let mut committed = 0usize;

        for (batch, chunk) in rows.chunks(self.batch_size).enumerate() {
            let errors = sink
                .insert_rows(table, chunk)
                .map_err(|source| LoadError::Sink {
                    table: table.to_string(),
                    batch,
                    committed,
                    source,
                })?;

            if !errors.is_empty() {
                log_row_errors(table, batch, &errors);
                return Err(LoadError::RowErrors {
                    table: table.to_string(),
                    batch,
                    committed,
                    errors,
                });
            }

            committed += chunk.len();
            tracing::debug!(batch, rows = chunk.len(), committed, "batch committed");
        }

        tracing::info!(table = %table, sink = sink.name(), rows = committed, "inserted rows");
        Ok(committed)
    }
}

fn log_row_errors(table: &TableRef, batch: usize, errors: &[RowError]) {
    let head = &errors[..errors.len().min(LOGGED_ROW_ERRORS)];
    let rendered = serde_json::to_string_pretty(head).unwrap_or_else(|e| format!("<unrenderable: {e}>"));
    tracing::error!(
        table = %table,
        batch,
        total_errors = errors.len(),
        "insert errors (first {}):\n{}",
        head.len(),
        truncate_chars(&rendered, MAX_DIAGNOSTIC_CHARS)
    );
}
