//! medallion: a watcher that ingests trip-record files from an object
//! store, cleans them, and maintains curated aggregate tables.
//!
//! The watcher polls the raw zone, processes files that are not yet in the
//! processed-file ledger, and records progress after each file so a restart
//! picks up exactly where it left off.

use clap::{Parser, Subcommand};
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use medallion::config::Config;
use medallion::error::{
    AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError, PipelineStorageSnafu, SeedSnafu,
};
use medallion::storage::StorageProvider;
use medallion::watcher::{CycleOutcome, Watcher, shutdown_signal};
use medallion::{metrics, seed};

/// Trip-record ingestion and curation pipeline.
#[derive(Parser, Debug)]
#[command(name = "medallion")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. Without it, configuration is read
    /// from the environment (BUCKET_NAME, ACCESS_KEY, SECRET_KEY,
    /// POLL_INTERVAL_SECONDS).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the raw zone and process new files until interrupted.
    Watch,
    /// Run a single discovery-and-process cycle, then exit.
    Run,
    /// Upload a local directory of parquet files into the raw zone.
    Seed {
        /// Directory holding the files to upload.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("medallion starting");

    let config = load_config(&args)?;

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    match args.command {
        Command::Watch => run_watch(&config).await,
        Command::Run => run_once(&config).await,
        Command::Seed { data_dir } => run_seed(&config, &data_dir).await,
    }
}

/// Load configuration from the file argument or the environment.
fn load_config(args: &Args) -> Result<Config, PipelineError> {
    match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu),
        None => Config::from_env().context(ConfigSnafu),
    }
}

/// Poll until interrupted.
async fn run_watch(config: &Config) -> Result<(), PipelineError> {
    let watcher = Watcher::connect(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    watcher.run(shutdown).await;
    Ok(())
}

/// Run one cycle and report it.
async fn run_once(config: &Config) -> Result<(), PipelineError> {
    let watcher = Watcher::connect(config).await?;

    match watcher.run_cycle().await? {
        CycleOutcome::NoNewFiles => info!("No new files found"),
        CycleOutcome::Processed(stats) => {
            info!("Cycle finished");
            info!("  Files discovered: {}", stats.discovered);
            info!("  Files processed: {}", stats.processed);
            info!("  Files filtered empty: {}", stats.filtered);
            info!("  Files failed: {}", stats.failed);
        }
    }
    Ok(())
}

/// Seed the raw zone from a local directory.
async fn run_seed(config: &Config, data_dir: &std::path::Path) -> Result<(), PipelineError> {
    let storage = Arc::new(
        StorageProvider::for_url_with_options(&config.storage.url, config.storage.options.clone())
            .await
            .context(PipelineStorageSnafu)?,
    );

    let stats = seed::seed_raw_zone(
        &storage,
        &config.source.prefix,
        data_dir,
        &config.source.suffix,
    )
    .await
    .context(SeedSnafu)?;

    info!(
        "Seed finished: {} uploaded, {} skipped",
        stats.uploaded, stats.skipped
    );
    Ok(())
}
