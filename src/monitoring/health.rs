//! Health checks
//!
//! [`run_health_check`] is a one-shot probe of storage, fetching and
//! metrics. [`check_recent_activity`] raises an alert when nothing has been
//! harvested within a window.

use crate::harvest::{FetchOutcome, PageFetcher};
use crate::monitoring::{AlertSink, MetricsSink};
use crate::storage::RecordStore;
use chrono::Utc;
use std::time::Duration;

/// Rendered pages shorter than this are treated as blocked or broken
pub const MIN_HEALTHY_MARKUP_LEN: usize = 1000;

/// Outcome of one health check run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub storage_ok: bool,
    pub fetch_ok: bool,
    pub markup_len: usize,
    pub failures: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.storage_ok && self.fetch_ok
    }
}

/// Builds the search URL used to probe the site
pub fn probe_url(site_origin: &str) -> String {
    format!("{}/s?k=test", site_origin.trim_end_matches('/'))
}

/// Checks that storage answers and that a search page renders with content
///
/// # Arguments
///
/// * `storage` - Record store to query
/// * `fetcher` - Fetcher used for one unproxied attempt
/// * `metrics` - Sink that receives the health-check counters
/// * `url` - Page to fetch
/// * `timeout` - Fetch time budget
pub async fn run_health_check(
    storage: &dyn RecordStore,
    fetcher: &dyn PageFetcher,
    metrics: &dyn MetricsSink,
    url: &str,
    timeout: Duration,
) -> HealthReport {
    let mut failures = Vec::new();

    let storage_ok = match storage.count_records() {
        Ok(count) => {
            tracing::info!("Database connection: OK ({} records)", count);
            true
        }
        Err(e) => {
            tracing::error!("Database connection: FAILED ({})", e);
            failures.push(format!("storage: {}", e));
            false
        }
    };

    let (fetch_ok, markup_len) = match fetcher.fetch(url, None, timeout).await {
        FetchOutcome::Success(markup) if markup.len() > MIN_HEALTHY_MARKUP_LEN => {
            tracing::info!("Basic fetch: OK ({} bytes)", markup.len());
            (true, markup.len())
        }
        FetchOutcome::Success(markup) => {
            tracing::error!("Basic fetch: FAILED (only {} bytes)", markup.len());
            failures.push(format!("fetch: page too short ({} bytes)", markup.len()));
            (false, markup.len())
        }
        FetchOutcome::Failure(failure) => {
            tracing::error!("Basic fetch: FAILED ({}: {})", failure.kind, failure.message);
            failures.push(format!("fetch: {}", failure.message));
            (false, 0)
        }
    };

    let report = HealthReport {
        storage_ok,
        fetch_ok,
        markup_len,
        failures,
    };

    if report.is_healthy() {
        metrics.record_request("health_check", "system");
    } else {
        metrics.record_error("health_check_failed");
    }

    report
}

/// Alerts when no record was observed within `window`
///
/// # Returns
///
/// The number of records observed in the window, or `None` if storage
/// could not be queried (an alert is raised in that case too).
pub async fn check_recent_activity(
    storage: &dyn RecordStore,
    alerts: &dyn AlertSink,
    window: chrono::Duration,
) -> Option<u64> {
    let since = Utc::now() - window;

    match storage.count_observed_since(since) {
        Ok(0) => {
            alerts
                .notify(
                    "No Recent Scraping Activity",
                    &format!(
                        "No records have been harvested in the last {} minutes.",
                        window.num_minutes()
                    ),
                )
                .await;
            Some(0)
        }
        Ok(count) => {
            tracing::info!("{} records harvested in the last {} minutes", count, window.num_minutes());
            Some(count)
        }
        Err(e) => {
            alerts
                .notify(
                    "Harvester Health Check Failed",
                    &format!("Failed to check recent activity: {}", e),
                )
                .await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_url() {
        assert_eq!(probe_url("https://www.amazon.in"), "https://www.amazon.in/s?k=test");
        assert_eq!(probe_url("https://shop.test/"), "https://shop.test/s?k=test");
    }
}
