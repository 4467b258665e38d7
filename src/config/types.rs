use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Shelf-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryEntry>,
}

/// Pagination, retry and pacing behavior
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Origin prefixed to site-relative product links
    #[serde(rename = "site-origin")]
    pub site_origin: String,

    /// Maximum fetch attempts per page
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles after every failed attempt (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(rename = "page-delay-min-ms", default = "default_page_delay_min_ms")]
    pub page_delay_min_ms: u64,

    #[serde(rename = "page-delay-max-ms", default = "default_page_delay_max_ms")]
    pub page_delay_max_ms: u64,

    /// Pause between categories during a direct harvest (milliseconds)
    #[serde(
        rename = "category-delay-min-ms",
        default = "default_category_delay_min_ms"
    )]
    pub category_delay_min_ms: u64,

    #[serde(
        rename = "category-delay-max-ms",
        default = "default_category_delay_max_ms"
    )]
    pub category_delay_max_ms: u64,
}

/// Headless rendering configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "viewport-width", default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(rename = "viewport-height", default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Upper bound for a single page fetch (milliseconds)
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Wait after the document loads, for client-side rendering (milliseconds)
    #[serde(rename = "settle-ms", default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Chrome/Chromium binary; auto-detected when absent
    #[serde(rename = "chrome-executable", default)]
    pub chrome_executable: Option<String>,
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Candidate egress endpoints (e.g. "http://10.0.0.1:3128")
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// URL requested through a proxy to check that it is alive
    #[serde(rename = "probe-url", default = "default_probe_url")]
    pub probe_url: String,

    #[serde(rename = "probe-timeout-ms", default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Job queue and worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(rename = "redis-url", default = "default_redis_url")]
    pub redis_url: String,

    #[serde(rename = "jobs-key", default = "default_jobs_key")]
    pub jobs_key: String,

    #[serde(rename = "results-key", default = "default_results_key")]
    pub results_key: String,

    /// How long a worker blocks waiting for a job (milliseconds)
    #[serde(rename = "dequeue-timeout-ms", default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,

    /// Pause after a job fails at the worker boundary (milliseconds)
    #[serde(rename = "cooldown-ms", default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Number of concurrent workers started by `work`
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// How long shutdown waits for workers to reach a safe point (milliseconds)
    #[serde(rename = "shutdown-grace-ms", default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the plain-text record backup
    #[serde(rename = "backup-path", default = "default_backup_path")]
    pub backup_path: String,
}

/// Observability configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConfig {
    /// Address for the Prometheus scrape endpoint (e.g. "0.0.0.0:8000")
    #[serde(rename = "metrics-listen", default)]
    pub metrics_listen: Option<String>,

    /// Webhook receiving JSON alert notifications
    #[serde(rename = "alert-webhook-url", default)]
    pub alert_webhook_url: Option<String>,
}

/// A named search-results URL harvested as one category
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub url: String,
}

impl HarvestConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl BrowserConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl QueueConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            settle_ms: default_settle_ms(),
            chrome_executable: None,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            probe_url: default_probe_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            jobs_key: default_jobs_key(),
            results_key: default_results_key(),
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
            cooldown_ms: default_cooldown_ms(),
            workers: default_workers(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_page_delay_min_ms() -> u64 {
    2_000
}

fn default_page_delay_max_ms() -> u64 {
    5_000
}

fn default_category_delay_min_ms() -> u64 {
    10_000
}

fn default_category_delay_max_ms() -> u64 {
    20_000
}

pub(crate) fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36"
        .to_string()
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_fetch_timeout_ms() -> u64 {
    60_000
}

fn default_settle_ms() -> u64 {
    2_000
}

fn default_probe_url() -> String {
    "http://httpbin.org/ip".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_jobs_key() -> String {
    "scraping_jobs".to_string()
}

fn default_results_key() -> String {
    "scraping_results".to_string()
}

fn default_dequeue_timeout_ms() -> u64 {
    30_000
}

fn default_cooldown_ms() -> u64 {
    5_000
}

fn default_workers() -> u32 {
    1
}

fn default_shutdown_grace_ms() -> u64 {
    90_000
}

fn default_backup_path() -> String {
    "./records_backup.txt".to_string()
}
