//! Harvest metrics
//!
//! Sessions and workers report through the [`MetricsSink`] trait. The
//! Prometheus-backed sink writes to the process-wide `metrics` recorder;
//! tests substitute their own sink.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

pub const REQUESTS_TOTAL: &str = "scraper_requests_total";
pub const PRODUCTS_SCRAPED_TOTAL: &str = "products_scraped_total";
pub const ERRORS_TOTAL: &str = "scraper_errors_total";
pub const DATABASE_OPERATIONS_TOTAL: &str = "database_operations_total";
pub const ACTIVE_PROXIES: &str = "active_proxies_count";
pub const REQUEST_DURATION_SECONDS: &str = "scraper_request_duration_seconds";

/// Destination for harvest counters, gauges and timings
pub trait MetricsSink: Send + Sync {
    /// Counts a fetch attempt or session milestone
    fn record_request(&self, status: &str, category: &str);

    /// Adds harvested records for a category
    fn record_products(&self, count: usize, category: &str);

    /// Counts an error by its stable kind label
    fn record_error(&self, error_type: &str);

    /// Counts a storage operation
    fn record_database_operation(&self, operation: &str);

    /// Sets the number of proxies not yet proven dead
    fn set_active_proxies(&self, count: usize);

    /// Records the wall-clock duration of a harvest session
    fn observe_duration(&self, category: &str, duration: Duration);
}

/// Metrics sink backed by the global Prometheus recorder
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    /// Installs the Prometheus recorder and registers metric descriptions
    ///
    /// # Arguments
    ///
    /// * `listen` - Address for the `/metrics` HTTP endpoint; when `None` the
    ///   recorder is installed without an exporter
    ///
    /// Must be called from within a Tokio runtime when `listen` is set.
    pub fn install(listen: Option<SocketAddr>) -> Result<Self, BuildError> {
        match listen {
            Some(addr) => {
                PrometheusBuilder::new().with_http_listener(addr).install()?;
                tracing::info!("Metrics exporter listening on http://{}/metrics", addr);
            }
            None => {
                PrometheusBuilder::new().install_recorder()?;
            }
        }

        describe_counter!(REQUESTS_TOTAL, "Total harvest requests by status and category");
        describe_counter!(PRODUCTS_SCRAPED_TOTAL, "Total records harvested by category");
        describe_counter!(ERRORS_TOTAL, "Total harvest errors by type");
        describe_counter!(DATABASE_OPERATIONS_TOTAL, "Total database operations by kind");
        describe_gauge!(ACTIVE_PROXIES, "Proxies not yet proven dead in the current session");
        describe_histogram!(
            REQUEST_DURATION_SECONDS,
            "Duration of harvest sessions in seconds"
        );

        Ok(Self)
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_request(&self, status: &str, category: &str) {
        counter!(REQUESTS_TOTAL, "status" => status.to_string(), "category" => category.to_string())
            .increment(1);
    }

    fn record_products(&self, count: usize, category: &str) {
        counter!(PRODUCTS_SCRAPED_TOTAL, "category" => category.to_string()).increment(count as u64);
    }

    fn record_error(&self, error_type: &str) {
        counter!(ERRORS_TOTAL, "error_type" => error_type.to_string()).increment(1);
    }

    fn record_database_operation(&self, operation: &str) {
        counter!(DATABASE_OPERATIONS_TOTAL, "operation" => operation.to_string()).increment(1);
    }

    fn set_active_proxies(&self, count: usize) {
        gauge!(ACTIVE_PROXIES).set(count as f64);
    }

    fn observe_duration(&self, category: &str, duration: Duration) {
        histogram!(REQUEST_DURATION_SECONDS, "category" => category.to_string())
            .record(duration.as_secs_f64());
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_request(&self, _status: &str, _category: &str) {}
    fn record_products(&self, _count: usize, _category: &str) {}
    fn record_error(&self, _error_type: &str) {}
    fn record_database_operation(&self, _operation: &str) {}
    fn set_active_proxies(&self, _count: usize) {}
    fn observe_duration(&self, _category: &str, _duration: Duration) {}
}
