//! Append-only Parquet table store with Hive-style partitioning.
//!
//! Layout: `{root}/{project}/{dataset}/{table}/load_date={YYYY-MM-DD}/part-{nanos}-{seq}.parquet`
//!
//! - Every accepted batch becomes new part files; nothing is ever rewritten
//! - Atomic writes (write to .tmp, rename into place)
//! - Batches are validated before writing; one bad row rejects the batch
//! - Metadata sidecar per part (row count, BLAKE3 hash, load timestamp)

use crate::normalize::NormalizedRow;
use crate::schema::InsightsSchema;
use crate::sink::{RowError, SinkError, TableRef, TableSink};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest scale (fractional digits) accepted in a decimal column.
pub const MAX_DECIMAL_SCALE: usize = 9;
/// Largest number of integer digits accepted in a decimal column.
pub const MAX_DECIMAL_INTEGER_DIGITS: usize = 29;

const DECIMAL_COLUMNS: &[&str] = &["spend", "cpc", "cpm"];
const DATE_COLUMNS: &[&str] = &["date_start", "date_stop"];

/// Sidecar written next to every part file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartMeta {
    pub table: String,
    pub load_date: NaiveDate,
    pub load_timestamp: DateTime<Utc>,
    pub row_count: usize,
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

/// Per-partition summary returned by [`ParquetTableSink::table_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStatus {
    pub load_date: String,
    pub files: usize,
    pub rows: usize,
    pub bytes: u64,
}

/// The Parquet table store.
pub struct ParquetTableSink {
    root: PathBuf,
    seq: AtomicU64,
}

impl ParquetTableSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a table: `{root}/{project}/{dataset}/{table}/`
    pub fn table_dir(&self, table: &TableRef) -> PathBuf {
        self.root
            .join(&table.project)
            .join(&table.dataset)
            .join(&table.table)
    }

    fn partition_dir(&self, table: &TableRef, load_date: NaiveDate) -> PathBuf {
        self.table_dir(table).join(format!("load_date={load_date}"))
    }

    fn next_part_name(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("part-{nanos}-{seq:05}")
    }

    /// Write one validated batch, one part file per load date.
    fn write_batch(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<(), SinkError> {
        let mut by_date: BTreeMap<NaiveDate, Vec<NormalizedRow>> = BTreeMap::new();
        for row in rows {
            by_date.entry(row.load_date).or_default().push(row.clone());
        }

        for (load_date, part_rows) in &by_date {
            let dir = self.partition_dir(table, *load_date);
            fs::create_dir_all(&dir)?;
            let name = self.next_part_name();
            write_part(&dir, &name, table, *load_date, part_rows)?;
        }

        Ok(())
    }

    /// Partitions of `table` with file, row and byte counts, oldest first.
    pub fn table_status(&self, table: &TableRef) -> Result<Vec<PartitionStatus>, SinkError> {
        let table_dir = self.table_dir(table);
        if !table_dir.exists() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in fs::read_dir(&table_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(load_date) = name.strip_prefix("load_date=") else {
                continue;
            };

            let mut status = PartitionStatus {
                load_date: load_date.to_string(),
                files: 0,
                rows: 0,
                bytes: 0,
            };
            for path in part_files(&entry.path())? {
                status.files += 1;
                status.bytes += fs::metadata(&path)?.len();
                status.rows += read_parquet(&path)?.height();
            }
            out.push(status);
        }

        out.sort_by(|a, b| a.load_date.cmp(&b.load_date));
        Ok(out)
    }

    /// Read every committed row of `table` into one DataFrame.
    pub fn read_table(&self, table: &TableRef) -> Result<DataFrame, SinkError> {
        let mut combined: Option<DataFrame> = None;
        let table_dir = self.table_dir(table);
        if !table_dir.exists() {
            return InsightsSchema::to_dataframe(&[])
                .map_err(|e| SinkError::Parquet(format!("empty frame: {e}")));
        }

        let mut partitions: Vec<PathBuf> = fs::read_dir(&table_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        partitions.sort();

        for dir in partitions {
            for path in part_files(&dir)? {
                let df = read_parquet(&path)?;
                match combined.as_mut() {
                    Some(acc) => {
                        acc.vstack_mut(&df)
                            .map_err(|e| SinkError::Parquet(format!("vstack: {e}")))?;
                    }
                    None => combined = Some(df),
                }
            }
        }

        match combined {
            Some(df) => Ok(df),
            None => InsightsSchema::to_dataframe(&[])
                .map_err(|e| SinkError::Parquet(format!("empty frame: {e}"))),
        }
    }
}

impl TableSink for ParquetTableSink {
    fn name(&self) -> &str {
        "parquet"
    }

    fn insert_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<Vec<RowError>, SinkError> {
        let errors = validate_rows(rows);
        if !errors.is_empty() {
            return Ok(errors);
        }
        if !rows.is_empty() {
            self.write_batch(table, rows)?;
        }
        Ok(Vec::new())
    }
}

// ── Row validation ──────────────────────────────────────────────────

/// True for `[+-]digits[.digits]` within the table's precision and scale.
pub fn is_decimal_literal(s: &str) -> bool {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return false;
    }
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    all_digits(int_part)
        && all_digits(frac_part)
        && int_part.trim_start_matches('0').len() <= MAX_DECIMAL_INTEGER_DIGITS
        && frac_part.len() <= MAX_DECIMAL_SCALE
}

fn is_calendar_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn column_value<'a>(row: &'a NormalizedRow, column: &str) -> Option<&'a str> {
    match column {
        "spend" => row.spend.as_deref(),
        "cpc" => row.cpc.as_deref(),
        "cpm" => row.cpm.as_deref(),
        "date_start" => row.date_start.as_deref(),
        "date_stop" => row.date_stop.as_deref(),
        _ => None,
    }
}

/// Check every row against the column constraints of the table.
pub fn validate_rows(rows: &[NormalizedRow]) -> Vec<RowError> {
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let mut row_error: Option<RowError> = None;
        let mut reject = |location: &str, message: String| {
            let detail = RowError::invalid(index, location, message);
            match row_error.as_mut() {
                Some(e) => e.errors.extend(detail.errors),
                None => row_error = Some(detail),
            }
        };

        for col in DECIMAL_COLUMNS {
            if let Some(v) = column_value(row, col) {
                if !is_decimal_literal(v) {
                    reject(col, format!("Invalid NUMERIC value: {v}"));
                }
            }
        }
        for col in DATE_COLUMNS {
            if let Some(v) = column_value(row, col) {
                if !is_calendar_date(v) {
                    reject(col, format!("Invalid date: '{v}'"));
                }
            }
        }

        errors.extend(row_error);
    }

    errors
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Write one part file and its sidecar under `dir`.
///
/// The sidecar is written before the part is renamed into place, so the
/// rename is the commit point: a part is either visible with its sidecar or
/// not visible at all.
fn write_part(
    dir: &Path,
    name: &str,
    table: &TableRef,
    load_date: NaiveDate,
    rows: &[NormalizedRow],
) -> Result<(), SinkError> {
    let path = dir.join(format!("{name}.parquet"));
    let tmp_path = path.with_extension("parquet.tmp");
    let meta_path = dir.join(format!("{name}.meta.json"));

    let mut df = InsightsSchema::to_dataframe(rows)
        .map_err(|e| SinkError::Parquet(format!("dataframe creation: {e}")))?;
    write_parquet(&mut df, &tmp_path)?;

    let meta = PartMeta {
        table: table.to_string(),
        load_date,
        load_timestamp: rows[0].load_timestamp,
        row_count: rows.len(),
        data_hash: blake3::hash(&serde_json::to_vec(rows)?).to_hex().to_string(),
        written_at: Utc::now(),
    };
    let sidecar = serde_json::to_string_pretty(&meta)
        .map_err(SinkError::from)
        .and_then(|json| fs::write(&meta_path, json).map_err(SinkError::from));
    if let Err(e) = sidecar {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, &path) {
        let _ = fs::remove_file(&tmp_path);
        let _ = fs::remove_file(&meta_path);
        return Err(e.into());
    }

    tracing::debug!(path = %path.display(), rows = rows.len(), "wrote parquet part");
    Ok(())
}

fn part_files(dir: &Path) -> Result<Vec<PathBuf>, SinkError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("parquet"))
        .collect();
    files.sort();
    Ok(files)
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), SinkError> {
    let file = fs::File::create(path)?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| SinkError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame, SinkError> {
    let file = fs::File::open(path)?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| SinkError::Parquet(format!("read {}: {e}", path.display())))
}
