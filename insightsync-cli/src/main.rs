//! insightsync CLI: run the insights pipeline and inspect the destination table.
//!
//! Commands:
//! - `run`: resolve the window, fetch all insight pages, append to the table
//! - `status`: report partitions, row counts and sizes of the local table

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insightsync_core::config::{
    env_lookup, resolve_sink_root, resolve_table, ENV_LOOKBACK_DAYS, ENV_SINCE, ENV_SINK_DIR,
    ENV_UNTIL,
};
use insightsync_core::{
    BulkLoader, InsightsFetcher, ParquetTableSink, PipelineConfig, PipelineDriver, ReqwestTransport,
    RunRequest, RunSummary, Settings, StdoutSink, TableSink,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "insightsync",
    about = "Daily campaign insights → columnar table loader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch insights for the resolved window and append them to the table.
    Run {
        /// Path to a TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Window start (YYYY-MM-DD). Only used together with --until.
        #[arg(long)]
        since: Option<String>,

        /// Window end (YYYY-MM-DD). Only used together with --since.
        #[arg(long)]
        until: Option<String>,

        /// Days to look back when no explicit window is given.
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Table root directory. Overrides INSIGHTSYNC_SINK_DIR.
        #[arg(long)]
        sink_dir: Option<PathBuf>,

        /// Request campaign totals instead of per-platform rows.
        #[arg(long, default_value_t = false)]
        no_breakdown: bool,

        /// Write rows to stdout as NDJSON instead of the table.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Report partitions, row counts and sizes of the destination table.
    Status {
        /// Path to a TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Table root directory. Overrides INSIGHTSYNC_SINK_DIR.
        #[arg(long)]
        sink_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            since,
            until,
            lookback_days,
            sink_dir,
            no_breakdown,
            dry_run,
        } => {
            let mut flags = HashMap::new();
            flags.insert(ENV_SINCE, since);
            flags.insert(ENV_UNTIL, until);
            flags.insert(ENV_LOOKBACK_DAYS, lookback_days.map(|d| d.to_string()));
            flags.insert(ENV_SINK_DIR, sink_dir.map(|p| p.display().to_string()));
            run_pipeline(config.as_deref(), &flags, no_breakdown, dry_run)
        }
        Commands::Status { config, sink_dir } => run_status(config.as_deref(), sink_dir),
    }
}

/// Logs go to stderr so `--dry-run` output stays clean NDJSON.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insightsync=info,insightsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(p) => Settings::from_file(p).with_context(|| format!("loading settings from {}", p.display())),
        None => Ok(Settings::default()),
    }
}

fn run_pipeline(
    config_path: Option<&Path>,
    flags: &HashMap<&str, Option<String>>,
    no_breakdown: bool,
    dry_run: bool,
) -> Result<()> {
    let settings = load_settings(config_path)?;

    // Command-line flags shadow the environment.
    let lookup = |name: &str| match flags.get(name) {
        Some(Some(value)) => Some(value.clone()),
        _ => env_lookup(name),
    };
    let mut config = PipelineConfig::resolve(settings, lookup)?;
    if no_breakdown {
        config.api.breakdown_publisher_platform = false;
    }

    let summary = if dry_run {
        execute(&config, StdoutSink)?
    } else {
        execute(&config, ParquetTableSink::new(&config.sink_root))?
    };

    if dry_run {
        print_summary(&summary, &config, &mut std::io::stderr())?;
    } else {
        print_summary(&summary, &config, &mut std::io::stdout())?;
    }
    Ok(())
}

fn execute<S: TableSink>(config: &PipelineConfig, sink: S) -> Result<RunSummary> {
    let transport = ReqwestTransport::with_timeout_secs(config.api.timeout_secs)?;
    let fetcher = InsightsFetcher::new(transport, config.endpoint())
        .with_page_limit(config.api.page_limit)
        .with_inline_link_clicks(config.api.inline_link_clicks);
    let driver = PipelineDriver::new(fetcher, sink, BulkLoader::new(config.batch_size));

    driver.run(&RunRequest::from_config(config)).map_err(|e| {
        tracing::error!(stage = e.stage(), "run failed: {e}");
        anyhow::Error::new(e)
    })
}

fn print_summary(summary: &RunSummary, config: &PipelineConfig, out: &mut dyn Write) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "=== Run Summary ===")?;
    writeln!(out, "Account:        {}", config.account_id)?;
    writeln!(out, "Window:         {}", summary.window)?;
    writeln!(out, "Table:          {}", config.table)?;
    writeln!(out, "Fetched:        {}", summary.fetched)?;
    writeln!(out, "Loaded:         {}", summary.loaded)?;
    match summary.load_timestamp {
        Some(ts) => writeln!(out, "Load timestamp: {}", ts.to_rfc3339())?,
        None => writeln!(out, "Load timestamp: (nothing to load)")?,
    }
    Ok(())
}

fn run_status(config_path: Option<&Path>, sink_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config_path)?;
    let table = resolve_table(&settings.sink, &env_lookup)?;
    let root = sink_dir.unwrap_or_else(|| resolve_sink_root(&settings.sink, &env_lookup));

    let sink = ParquetTableSink::new(&root);
    let table_dir = sink.table_dir(&table);
    if !table_dir.exists() {
        println!("Table does not exist yet: {}", table_dir.display());
        return Ok(());
    }

    let partitions = sink.table_status(&table)?;
    if partitions.is_empty() {
        println!("Table is empty: {table}");
        return Ok(());
    }

    let total_rows: usize = partitions.iter().map(|p| p.rows).sum();
    let total_bytes: u64 = partitions.iter().map(|p| p.bytes).sum();

    println!("Table: {table}");
    println!("Location: {}", table_dir.display());
    println!("Partitions: {}", partitions.len());
    println!("Rows: {total_rows}");
    println!("Total size: {}", format_size(total_bytes));
    println!();
    println!("{:<12} {:>6} {:>10} {:>10}", "Load Date", "Files", "Rows", "Size");
    println!("{}", "-".repeat(41));
    for p in &partitions {
        println!(
            "{:<12} {:>6} {:>10} {:>10}",
            p.load_date,
            p.files,
            p.rows,
            format_size(p.bytes)
        );
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
