//! Fetch-list generator entry point
//!
//! This is the command-line interface for generating a segment of fetch lists
//! from a crawl-state store.

use anyhow::{anyhow, Context};
use chrono::{Duration, Utc};
use clap::Parser;
use fetchlist_generator::config::{load_config_with_hash, Config};
use fetchlist_generator::{GenerateOptions, Generator, PluginRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when no URL was due for fetching
const EXIT_NOTHING_SELECTED: u8 = 2;

/// Exit status of a failed run
const EXIT_FAILURE: u8 = 1;

/// Generates a segment of fetch lists from a crawl-state store
///
/// Selects the best-scoring URLs that are due for fetching, caps them per
/// host if configured, and writes them as host-partitioned fetch lists into
/// a new segment.
#[derive(Parser, Debug)]
#[command(name = "fetchlist-generator")]
#[command(version = "1.0.0")]
#[command(about = "Generates fetch lists from a crawl-state store", long_about = None)]
struct Cli {
    /// Path to the crawl-state store
    #[arg(value_name = "STORE")]
    store: PathBuf,

    /// Directory new segments are created in
    #[arg(value_name = "SEGMENTS")]
    segments: PathBuf,

    /// Path to TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Take over an existing store lock
    #[arg(long)]
    force: bool,

    /// Select at most this many URLs
    #[arg(long, value_name = "N")]
    top_n: Option<u64>,

    /// Number of fetch lists to write
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    num_fetchers: Option<u64>,

    /// Pretend the current time is this many days later
    #[arg(long, value_name = "DAYS", default_value_t = 0)]
    adddays: i64,

    /// Do not apply URL filters
    #[arg(long)]
    no_filter: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let status = usage_exit_status(&e);
            let _ = e.print();
            return ExitCode::from(status);
        }
    };

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_NOTHING_SELECTED),
        Err(e) => {
            tracing::error!("Generator failed: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Maps a command-line parse error to an exit status
///
/// Help and version requests succeed. Usage errors are failures, so they are
/// never mistaken for a run that found nothing to select.
fn usage_exit_status(error: &clap::Error) -> u8 {
    if error.exit_code() == 0 {
        0
    } else {
        EXIT_FAILURE
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fetchlist_generator=info,warn"),
            1 => EnvFilter::new("fetchlist_generator=debug,info"),
            2 => EnvFilter::new("fetchlist_generator=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Runs one generation; returns whether a segment was produced
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let (config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path).map_err(|e| {
                anyhow!("Failed to load configuration {}: {}", path.display(), e)
            })?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };

    let plugins = PluginRegistry::builtin().resolve(&config)?;

    let num_lists = cli
        .num_fetchers
        .map(usize::try_from)
        .transpose()
        .context("--num-fetchers is out of range")?;
    let cur_time = Duration::try_days(cli.adddays)
        .and_then(|shift| Utc::now().checked_add_signed(shift))
        .context("--adddays is out of range")?;
    if cli.adddays != 0 {
        tracing::info!("Generator: pretending the time is {}", cur_time.to_rfc3339());
    }

    let options = GenerateOptions {
        num_lists,
        top_n: cli.top_n.unwrap_or(u64::MAX),
        cur_time,
        filter: config.generate.filter && !cli.no_filter,
        force: cli.force,
    };

    let mut generator = Generator::new(config, plugins);
    if let Some(hash) = config_hash {
        generator = generator.with_config_hash(hash);
    }

    let segment = generator
        .generate(&cli.store, &cli.segments, options)
        .await?;

    match segment {
        Some(segment) => {
            tracing::info!("Generated segment {}", segment.path().display());
            println!("{}", segment.path().display());
            Ok(true)
        }
        None => {
            tracing::info!("No URLs due for fetching in {}", cli.store.display());
            Ok(false)
        }
    }
}
