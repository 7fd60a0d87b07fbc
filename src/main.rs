//! Catalog-Ingest main entry point
//!
//! This is the command-line interface for the catalogue ingestion pipeline.

use catalog_ingest::config::{load_config_with_hash, Config};
use catalog_ingest::output::{load_statistics, print_run_report, print_statistics};
use catalog_ingest::storage::Checkpoint;
use catalog_ingest::{run_ingest, RunState};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Ingest: a resumable catalogue ingestion pipeline
///
/// Catalog-Ingest works through a persisted queue of catalogue entries,
/// fetches each detail page with bounded retries and merges the extracted
/// records into durable JSON stores. Interrupted runs resume where they
/// stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable catalogue ingestion pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be processed without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the stores and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Move parked failures back into the work queue before running
    #[arg(long)]
    requeue_failures: bool,

    /// Override the number of concurrent workers
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=32))]
    workers: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Command-line overrides
    if cli.requeue_failures {
        config.pipeline.requeue_failures = true;
    }
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_ingest=info,warn"),
            1 => EnvFilter::new("catalog_ingest=debug,info"),
            2 => EnvFilter::new("catalog_ingest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be processed
///
/// Corrupt stores are reported but not backed up, so nothing is written.
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Catalog-Ingest Dry Run ===\n");

    println!("Pipeline Configuration:");
    println!("  Workers: {}", config.pipeline.workers);
    println!(
        "  Politeness delay: {}ms",
        config.pipeline.politeness_delay_ms
    );
    println!("  Requeue failures: {}", config.pipeline.requeue_failures);
    println!("  Duplicate policy: {:?}", config.pipeline.duplicate_policy);

    println!("\nRetry Policy:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Backoff: {:?}", config.retry.backoff.to_backoff());
    println!("  Retry client errors: {}", config.retry.retry_client_errors);
    println!("  Retry parse errors: {}", config.retry.retry_parse_errors);
    println!("  Request timeout: {}s", config.fetcher.timeout_secs);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.user_agent());

    println!("\nStores:");
    println!("  Work queue: {}", config.store.work_queue.display());
    println!("  Results: {}", config.store.results.display());
    println!("  Failures: {}", config.store.failures.display());

    let checkpoint = Checkpoint::load(config.store.paths(), false)?;
    let queue = checkpoint.queue();

    println!("\nPending Items ({}):", queue.len());
    for item in queue.items().iter().take(10) {
        if item.url.is_empty() {
            println!("  - <no url, would be parked>");
        } else {
            println!("  - {}", item.url);
        }
    }
    if queue.len() > 10 {
        println!("  ... and {} more", queue.len() - 10);
    }

    println!("\n✓ Configuration is valid");
    let mut pending = queue.len();
    if config.pipeline.requeue_failures {
        pending += checkpoint
            .failures()
            .entries()
            .iter()
            .filter(|f| f.url().is_empty() || !queue.contains_url(f.url()))
            .count();
    }
    println!("✓ Would process {} work items", pending);

    Ok(())
}

/// Handles the --stats mode: shows statistics from the stores
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Work queue: {}\n", config.store.work_queue.display());

    let checkpoint = Checkpoint::load(config.store.paths(), false)?;
    let stats = load_statistics(&checkpoint);
    print_statistics(&stats);

    Ok(())
}

/// Handles the main ingestion run
async fn handle_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    match run_ingest(config, cancel).await {
        Ok(report) => {
            if report.state == RunState::Interrupted {
                tracing::warn!(
                    "Run interrupted; {} item(s) remain queued for the next run",
                    report.remaining
                );
            } else {
                tracing::info!("Run completed successfully");
            }
            print_run_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Cancels `cancel` on the first Ctrl-C; later ones are ignored so the
/// commit can finish
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut first = true;
        while tokio::signal::ctrl_c().await.is_ok() {
            if first {
                tracing::warn!("Interrupt received; finishing in-flight items and saving progress");
                cancel.cancel();
                first = false;
            } else {
                tracing::warn!("Already shutting down; waiting for the checkpoint to be saved");
            }
        }
    });
}
