//! Pipeline driver: window → fetch → normalize → load.
//!
//! The ingestion instant is captured once, after the fetch completes, and is
//! shared by every row of the run. An empty fetch never reaches the sink.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::insights::{Credentials, InsightsFetcher};
use crate::loader::BulkLoader;
use crate::normalize::normalize;
use crate::sink::{TableRef, TableSink};
use crate::transport::HttpTransport;
use crate::window::{resolve_window, Window, WindowOverrides};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Inputs for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub credentials: Credentials,
    pub account_id: String,
    pub table: TableRef,
    pub overrides: WindowOverrides,
    pub lookback_days: u32,
    pub breakdown: bool,
    /// Reference date for the lookback window.
    pub today: NaiveDate,
}

impl RunRequest {
    /// Request for `config`, with the window anchored at the local date.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            credentials: config.credentials.clone(),
            account_id: config.account_id.clone(),
            table: config.table.clone(),
            overrides: config.overrides.clone(),
            lookback_days: config.lookback_days,
            breakdown: config.api.breakdown_publisher_platform,
            today: chrono::Local::now().date_naive(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub window: Window,
    pub fetched: usize,
    pub loaded: usize,
    /// `None` when nothing was fetched.
    pub load_timestamp: Option<DateTime<Utc>>,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Composes the fetcher, normalizer and loader over one sink.
pub struct PipelineDriver<T: HttpTransport, S: TableSink> {
    fetcher: InsightsFetcher<T>,
    sink: S,
    loader: BulkLoader,
    clock: Clock,
}

impl<T: HttpTransport, S: TableSink> PipelineDriver<T, S> {
    pub fn new(fetcher: InsightsFetcher<T>, sink: S, loader: BulkLoader) -> Self {
        Self {
            fetcher,
            sink,
            loader,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the ingestion clock.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn fetcher(&self) -> &InsightsFetcher<T> {
        &self.fetcher
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run the pipeline once.
    pub fn run(&self, request: &RunRequest) -> Result<RunSummary, PipelineError> {
        let window = resolve_window(&request.overrides, request.lookback_days, request.today)?;
        tracing::info!(
            account_id = %request.account_id,
            window = %window,
            breakdown = request.breakdown,
            "fetching insights (daily, campaign level)"
        );

        let records = self.fetcher.fetch_all(
            &request.credentials,
            &request.account_id,
            &window,
            request.breakdown,
        )?;
        let fetched = records.len();
        tracing::info!(rows = fetched, "fetched rows");

        if records.is_empty() {
            tracing::info!("no rows to insert (nothing returned upstream)");
            return Ok(RunSummary {
                window,
                fetched: 0,
                loaded: 0,
                load_timestamp: None,
            });
        }

        let load_timestamp = (self.clock)();
        let rows = normalize(&records, load_timestamp);
        let loaded = self.loader.load(&self.sink, &request.table, &rows)?;

        tracing::info!(fetched, loaded, table = %request.table, "run complete");
        Ok(RunSummary {
            window,
            fetched,
            loaded,
            load_timestamp: Some(load_timestamp),
        })
    }
}
