//! insightsync core: pull paginated ad-insights records and append them to a table.
//!
//! This crate contains the pipeline:
//! - Window resolution (explicit overrides or lookback ending yesterday)
//! - Paginated insights fetcher over a pluggable HTTP transport
//! - Per-column coercion of loosely-typed records into a fixed row schema
//! - Batched, non-transactional bulk load into a table sink
//! - The driver that composes them, plus configuration and sinks

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod insights;
pub mod loader;
pub mod normalize;
pub mod parquet_sink;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod transport;
pub mod window;

pub use config::{ConfigError, PipelineConfig, Settings};
pub use error::PipelineError;
pub use insights::{Credentials, FetchError, InsightsEndpoint, InsightsFetcher, RawRecord};
pub use loader::{BulkLoader, LoadError};
pub use normalize::{normalize, NormalizedRow};
pub use parquet_sink::{ParquetTableSink, PartitionStatus};
pub use pipeline::{PipelineDriver, RunRequest, RunSummary};
pub use schema::InsightsSchema;
pub use sink::{RowError, SinkError, StdoutSink, TableRef, TableSink};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use window::{resolve_window, ValidationError, Window, WindowOverrides};
