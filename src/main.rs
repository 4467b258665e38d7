//! Shelf-Harvester main entry point
//!
//! This is the command-line interface for the Shelf-Harvester product harvester.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use shelf_harvester::config::{load_config, CategoryEntry, Config};
use shelf_harvester::harvest::{
    harvest_categories, BrowserFetcher, DelayRange, DirectRun, Extractor, HarvestContext,
    HarvestSession, HarvestSettings, HttpProxyProbe,
};
use shelf_harvester::monitoring::{
    check_recent_activity, probe_url, run_health_check, AlertSink, LogAlerts, MetricsSink,
    PrometheusMetrics, WebhookAlerts,
};
use shelf_harvester::output::{
    load_statistics, print_recent, print_results, print_run_summary, print_statistics,
    write_backup, BACKUP_LIMIT, RECENT_LIMIT,
};
use shelf_harvester::queue::{Job, JobQueue, RedisQueue};
use shelf_harvester::storage::{open_storage, RecordStore};
use shelf_harvester::worker::{Worker, WorkerSettings};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Shelf-Harvester: a resilient product-listing harvester
///
/// Shelf-Harvester renders paginated search pages in a headless browser,
/// extracts product records through fallback selector chains, and stores
/// them in SQLite. Jobs can be run directly or spread over workers through
/// a Redis queue.
#[derive(Parser, Debug)]
#[command(name = "shelf-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A resilient product-listing harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest configured categories directly, one after another
    Harvest {
        /// Only harvest the category with this name
        #[arg(long)]
        category: Option<String>,

        /// Pages to harvest per category
        #[arg(long, default_value_t = 3)]
        pages: u32,

        /// Route fetches through the configured proxies
        #[arg(long)]
        proxy: bool,
    },

    /// Add jobs to the queue (every configured category unless --url is given)
    Enqueue {
        /// Target URL of a single job
        #[arg(long, requires = "category")]
        url: Option<String>,

        /// Category of the single job
        #[arg(long, requires = "url")]
        category: Option<String>,

        /// Pages to harvest per job
        #[arg(long, default_value_t = 3)]
        pages: u32,

        /// Route the job's fetches through proxies
        #[arg(long)]
        proxy: bool,

        /// Clear the queue before adding jobs
        #[arg(long)]
        clear: bool,
    },

    /// Show the number of waiting jobs
    QueueSize,

    /// Drop every waiting job
    ClearQueue,

    /// Show the most recent published job results
    Results {
        /// Number of results to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Process jobs from the queue until interrupted
    Work {
        /// Number of concurrent workers (overrides the config)
        #[arg(long)]
        workers: Option<u32>,
    },

    /// Check storage and fetching, and alert on missing recent activity
    Health,

    /// Print statistics and write the backup file
    Export,

    /// Validate the config and show what would be harvested
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config(&cli.config) {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Harvest {
            category,
            pages,
            proxy,
        } => handle_harvest(&config, category.as_deref(), pages, proxy).await,
        Command::Enqueue {
            url,
            category,
            pages,
            proxy,
            clear,
        } => handle_enqueue(&config, url.zip(category), pages, proxy, clear).await,
        Command::QueueSize => {
            let queue = RedisQueue::from_config(&config.queue)?;
            println!("Queue size: {}", queue.size().await?);
            Ok(())
        }
        Command::ClearQueue => {
            let queue = RedisQueue::from_config(&config.queue)?;
            queue.clear().await?;
            println!("Queue cleared");
            Ok(())
        }
        Command::Results { limit } => {
            let queue = RedisQueue::from_config(&config.queue)?;
            print_results(&queue.recent_results(limit).await?);
            Ok(())
        }
        Command::Work { workers } => handle_work(&config, workers).await,
        Command::Health => handle_health(&config).await,
        Command::Export => handle_export(&config),
        Command::Check => handle_check(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_harvester=info,warn"),
            1 => EnvFilter::new("shelf_harvester=debug,info"),
            2 => EnvFilter::new("shelf_harvester=trace,debug"),
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

/// Cancels the returned token on Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, finishing in-flight work");
                trigger.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    token
}

fn install_metrics(config: &Config) -> anyhow::Result<Arc<dyn MetricsSink>> {
    let listen = config
        .monitoring
        .metrics_listen
        .as_deref()
        .map(|addr| {
            addr.parse::<SocketAddr>()
                .with_context(|| format!("invalid metrics-listen address '{}'", addr))
        })
        .transpose()?;

    let metrics = PrometheusMetrics::install(listen).context("failed to install metrics recorder")?;
    Ok(Arc::new(metrics))
}

fn build_alerts(config: &Config) -> anyhow::Result<Arc<dyn AlertSink>> {
    match &config.monitoring.alert_webhook_url {
        Some(url) => Ok(Arc::new(
            WebhookAlerts::new(url.clone()).context("failed to build alert client")?,
        )),
        None => Ok(Arc::new(LogAlerts)),
    }
}

/// Wires the production collaborators together
fn build_context(
    config: &Config,
    storage: Arc<dyn RecordStore>,
    metrics: Arc<dyn MetricsSink>,
) -> anyhow::Result<HarvestContext> {
    Ok(HarvestContext {
        fetcher: Arc::new(BrowserFetcher::new(&config.browser)),
        extractor: Arc::new(Extractor::for_site(&config.harvest.site_origin)?),
        storage,
        metrics,
        alerts: build_alerts(config)?,
        probe: Arc::new(HttpProxyProbe::new(config.proxy.probe_url.clone())),
        settings: Arc::new(HarvestSettings::from_config(config)),
    })
}

fn open_records(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    let path = Path::new(&config.output.database_path);
    let storage = open_storage(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(storage))
}

fn select_categories(
    config: &Config,
    name: Option<&str>,
) -> anyhow::Result<Vec<CategoryEntry>> {
    match name {
        None => Ok(config.categories.clone()),
        Some(name) => config
            .categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| vec![c.clone()])
            .ok_or_else(|| anyhow!("no category named '{}' in config", name)),
    }
}

/// Prints recent records and writes the backup file
fn summarize_storage(config: &Config, storage: &dyn RecordStore) -> anyhow::Result<()> {
    println!("\n=== Database Summary ===");
    print_recent(&storage.recent_records(RECENT_LIMIT)?);

    let backup = storage.recent_records(BACKUP_LIMIT)?;
    if !backup.is_empty() {
        let path = Path::new(&config.output.backup_path);
        let written = write_backup(&backup, path)
            .with_context(|| format!("failed to write backup {}", path.display()))?;
        println!("\n✓ Backup saved to {} ({} records)", path.display(), written);
    }

    Ok(())
}

/// Handles the harvest command: runs sessions for categories in turn
async fn handle_harvest(
    config: &Config,
    category: Option<&str>,
    pages: u32,
    use_proxy: bool,
) -> anyhow::Result<()> {
    let categories = select_categories(config, category)?;
    if categories.is_empty() {
        bail!("no categories configured");
    }

    let storage = open_records(config)?;
    let metrics = install_metrics(config)?;
    let ctx = build_context(config, storage.clone(), metrics)?;
    let shutdown = shutdown_on_ctrl_c();
    let session = HarvestSession::new(ctx, shutdown);

    tracing::info!(
        "Harvesting {} categor{} ({} page(s) each, proxy: {})",
        categories.len(),
        if categories.len() == 1 { "y" } else { "ies" },
        pages,
        use_proxy
    );

    let options = DirectRun {
        page_limit: pages,
        use_proxy,
        category_delay: DelayRange::from_millis(
            config.harvest.category_delay_min_ms,
            config.harvest.category_delay_max_ms,
        ),
    };
    let reports = harvest_categories(&session, &categories, options).await;

    print_run_summary(&reports);
    summarize_storage(config, storage.as_ref())
}

/// Handles the enqueue command: one explicit job or one per category
async fn handle_enqueue(
    config: &Config,
    single: Option<(String, String)>,
    pages: u32,
    use_proxy: bool,
    clear: bool,
) -> anyhow::Result<()> {
    let queue = RedisQueue::from_config(&config.queue)?;

    if clear {
        queue.clear().await?;
    }

    let jobs: Vec<Job> = match single {
        Some((url, category)) => vec![Job::new(url, category, pages, use_proxy)],
        None => config
            .categories
            .iter()
            .map(|c| Job::new(c.url.clone(), c.name.clone(), pages, use_proxy))
            .collect(),
    };

    for job in &jobs {
        job.validate()?;
        queue.enqueue(job).await?;
        println!("Added job: {} ({})", job.category, job.target_url);
    }

    println!("Added {} job(s); queue size: {}", jobs.len(), queue.size().await?);
    Ok(())
}

/// Handles the work command: runs workers until Ctrl-C
async fn handle_work(config: &Config, workers: Option<u32>) -> anyhow::Result<()> {
    let worker_count = workers.unwrap_or(config.queue.workers).max(1);
    let queue: Arc<dyn JobQueue> = Arc::new(RedisQueue::from_config(&config.queue)?);

    let storage = open_records(config)?;
    let metrics = install_metrics(config)?;
    let ctx = build_context(config, storage, metrics)?;
    let shutdown = shutdown_on_ctrl_c();
    let settings = WorkerSettings::from_config(&config.queue);

    tracing::info!("Starting {} worker(s); press Ctrl+C to stop", worker_count);

    let handles: Vec<_> = (1..=worker_count as usize)
        .map(|id| {
            let worker = Worker::new(id, queue.clone(), ctx.clone(), settings, shutdown.clone());
            tokio::spawn(worker.run())
        })
        .collect();

    shutdown.cancelled().await;

    let grace = config.queue.shutdown_grace();
    let drained = tokio::time::timeout(grace, futures::future::join_all(handles)).await;
    match drained {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    tracing::error!("Worker task ended abnormally: {}", e);
                }
            }
            tracing::info!("All workers stopped");
        }
        Err(_) => tracing::warn!(
            "Workers still busy after {}s, exiting anyway",
            grace.as_secs()
        ),
    }

    Ok(())
}

/// Handles the health command
async fn handle_health(config: &Config) -> anyhow::Result<()> {
    let storage = open_records(config)?;
    let metrics = install_metrics(config)?;
    let alerts = build_alerts(config)?;
    let fetcher = BrowserFetcher::new(&config.browser);

    println!("=== Health Check ===\n");
    let report = run_health_check(
        storage.as_ref(),
        &fetcher,
        metrics.as_ref(),
        &probe_url(&config.harvest.site_origin),
        config.browser.fetch_timeout(),
    )
    .await;

    println!(
        "  Database: {}",
        if report.storage_ok { "OK" } else { "FAILED" }
    );
    println!(
        "  Fetching: {} ({} bytes)",
        if report.fetch_ok { "OK" } else { "FAILED" },
        report.markup_len
    );

    if let Some(recent) =
        check_recent_activity(storage.as_ref(), alerts.as_ref(), chrono::Duration::hours(1)).await
    {
        println!("  Records in the last hour: {}", recent);
    }

    if !report.is_healthy() {
        bail!("health check failed: {}", report.failures.join("; "));
    }

    println!("\n✓ Harvester is healthy");
    Ok(())
}

/// Handles the export command: statistics, recent records and backup
fn handle_export(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_records(config)?;
    let stats = load_statistics(storage.as_ref())?;
    print_statistics(&stats);

    summarize_storage(config, storage.as_ref())
}

/// Handles the check command: validates config and shows what would be harvested
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Shelf-Harvester Config Check ===\n");

    println!("Harvest:");
    println!("  Site origin: {}", config.harvest.site_origin);
    println!("  Max retries: {}", config.harvest.max_retries);
    println!("  Backoff base: {}ms", config.harvest.backoff_base_ms);
    println!(
        "  Page delay: {}-{}ms",
        config.harvest.page_delay_min_ms, config.harvest.page_delay_max_ms
    );
    println!(
        "  Category delay: {}-{}ms",
        config.harvest.category_delay_min_ms, config.harvest.category_delay_max_ms
    );

    println!("\nBrowser:");
    println!("  User agent: {}", config.browser.user_agent);
    println!(
        "  Viewport: {}x{}",
        config.browser.viewport_width, config.browser.viewport_height
    );
    println!("  Fetch timeout: {}ms", config.browser.fetch_timeout_ms);

    println!("\nProxies ({}):", config.proxy.endpoints.len());
    for endpoint in &config.proxy.endpoints {
        println!("  - {}", endpoint);
    }

    println!("\nQueue:");
    println!("  Redis: {}", config.queue.redis_url);
    println!(
        "  Keys: {} / {}",
        config.queue.jobs_key, config.queue.results_key
    );
    println!("  Workers: {}", config.queue.workers);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Backup: {}", config.output.backup_path);

    println!("\nCategories ({}):", config.categories.len());
    for category in &config.categories {
        println!("  - {}: {}", category.name, category.url);
    }

    // Building the extractor proves every built-in selector compiles
    Extractor::for_site(&config.harvest.site_origin)?;

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest {} categor{}",
        config.categories.len(),
        if config.categories.len() == 1 { "y" } else { "ies" }
    );

    Ok(())
}
