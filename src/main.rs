//! Harrow main entry point
//!
//! This is the command-line interface for the Harrow batch crawl
//! orchestrator.

use clap::Parser;
use harrow::backlog::load_backlog;
use harrow::config::load_config_with_hash;
use harrow::dispatch::Dispatcher;
use harrow::engine::{EngineSettings, HttpFetcher, JsonExtractor};
use harrow::identity::{load_identities, IdentityPool, PoolConfig};
use harrow::output::{load_statistics, print_statistics};
use harrow::storage::{open_store, SqliteStore, Store};
use harrow::HarrowError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Harrow: a resilient batch crawl orchestrator
///
/// Harrow works a backlog of paginated searches through a pool of crawl
/// identities, persisting every step so an interrupted run resumes where
/// it stopped.
#[derive(Parser, Debug)]
#[command(name = "harrow")]
#[command(version = "1.0.0")]
#[command(about = "A resilient batch crawl orchestrator", long_about = None)]
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

    /// Resume an interrupted run (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Reset all unfinished tasks and start over
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would run without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        let outcome = handle_run(config, &config_hash, cli.fresh).await?;
        std::process::exit(outcome.exit_code());
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
            0 => EnvFilter::new("harrow=info,warn"),
            1 => EnvFilter::new("harrow=debug,info"),
            2 => EnvFilter::new("harrow=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(config: &harrow::Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Harrow Dry Run ===\n");

    println!("Orchestrator Configuration:");
    println!("  Max retries per task: {}", config.orchestrator.max_retries);
    println!(
        "  Identity retirement threshold: {}",
        config.orchestrator.retirement_threshold
    );
    println!(
        "  Zero-result streak limit: {}",
        config.orchestrator.zero_streak_limit
    );
    println!(
        "  Page budget per task: {}",
        config.orchestrator.max_pages_per_task
    );
    println!(
        "  Workers per identity: {}",
        config.orchestrator.workers_per_identity
    );
    println!(
        "  Fetch timeout: {}s",
        config.orchestrator.fetch_timeout_secs
    );

    println!("\nAPI:");
    println!("  Endpoint: {}", config.api.endpoint);
    println!("  Identities file: {}", config.api.identities_path);
    println!("  Backlog file: {}", config.api.backlog_path);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let identities = load_identities(Path::new(&config.api.identities_path))?;
    println!("\nUsable Identities ({}):", identities.len());
    for identity in &identities {
        match &identity.proxy_url {
            Some(proxy) => println!("  - {} (proxy: {})", identity.id, proxy),
            None => println!("  - {} (direct)", identity.id),
        }
    }

    let backlog = load_backlog(Path::new(&config.api.backlog_path))?;
    println!("\nBacklog ({} searches):", backlog.len());
    for entry in &backlog {
        println!("  - {} [{}]", entry.search_term, entry.key);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would run {} searches across {} identities",
        backlog.len(),
        identities.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &harrow::Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let store = SqliteStore::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main run operation
async fn handle_run(
    config: harrow::Config,
    config_hash: &str,
    fresh: bool,
) -> Result<harrow::RunOutcome, Box<dyn std::error::Error>> {
    let mut store = open_store(Path::new(&config.output.database_path))?;

    if fresh {
        let reset = store.reset_non_terminal()?;
        tracing::info!(tasks = reset, "Fresh start: unfinished tasks reset");
    } else {
        tracing::info!("Starting run (resuming previous state if present)");
    }

    let identities = load_identities(Path::new(&config.api.identities_path))?;
    if identities.is_empty() {
        return Err(HarrowError::NoIdentities(format!(
            "no usable identities in {}",
            config.api.identities_path
        ))
        .into());
    }
    tracing::info!(identities = identities.len(), "Identities loaded");

    let backlog = load_backlog(Path::new(&config.api.backlog_path))?;
    tracing::info!(searches = backlog.len(), "Backlog loaded");

    let pool = Arc::new(IdentityPool::new(
        identities,
        PoolConfig {
            retirement_threshold: config.orchestrator.retirement_threshold,
            rate_limit_cooldown: Duration::from_secs_f64(config.backoff.rate_limit_secs),
            session_cooldown: Duration::from_secs_f64(config.backoff.identity_cooldown_secs),
        },
    ));

    let fetcher = Arc::new(HttpFetcher::new(
        &config.api.endpoint,
        Duration::from_secs(config.orchestrator.fetch_timeout_secs),
    ));

    let settings = EngineSettings {
        max_retries: config.orchestrator.max_retries,
        zero_streak_limit: config.orchestrator.zero_streak_limit,
        max_pages_per_task: config.orchestrator.max_pages_per_task,
        page_delay: Duration::from_millis(config.orchestrator.page_delay_ms),
        backoff: config.backoff_policy(),
    };

    let run_id = store.create_run(config_hash)?;
    let store = Arc::new(Mutex::new(store));

    // Flip the shutdown flag on Ctrl-C; workers stop at the next page
    // boundary
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing current pages");
            let _ = shutdown_tx.send(true);
        }
    });

    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        pool,
        fetcher,
        Arc::new(JsonExtractor::new()),
        settings,
        config.orchestrator.workers_per_identity,
    );

    let outcome = dispatcher.run(run_id, &backlog, shutdown_rx).await?;

    // End-of-run summary, including any permanently failed tasks
    {
        let store = store.lock().unwrap();
        let stats = load_statistics(&*store)?;
        print_statistics(&stats);
    }

    Ok(outcome)
}
