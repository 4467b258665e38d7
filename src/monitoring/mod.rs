//! Metrics, alerts and health checks

mod alerts;
mod health;
mod metrics;

pub use self::alerts::{Alert, AlertSink, LogAlerts, WebhookAlerts};
pub use self::health::{
    check_recent_activity, probe_url, run_health_check, HealthReport, MIN_HEALTHY_MARKUP_LEN,
};
pub use self::metrics::{
    MetricsSink, NoopMetrics, PrometheusMetrics, ACTIVE_PROXIES, DATABASE_OPERATIONS_TOTAL,
    ERRORS_TOTAL, PRODUCTS_SCRAPED_TOTAL, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS,
};
