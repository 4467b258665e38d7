use crate::config::types::{
    BrowserConfig, CategoryEntry, Config, HarvestConfig, MonitoringConfig, OutputConfig,
    ProxyConfig, QueueConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_browser_config(&config.browser)?;
    validate_proxy_config(&config.proxy)?;
    validate_queue_config(&config.queue)?;
    validate_output_config(&config.output)?;
    validate_monitoring_config(&config.monitoring)?;
    validate_categories(&config.categories)?;
    Ok(())
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    let origin = validate_http_url("site-origin", &config.site_origin)?;
    if origin.path() != "/" || origin.query().is_some() {
        return Err(ConfigError::Validation(format!(
            "site-origin must be a bare origin without path or query, got '{}'",
            config.site_origin
        )));
    }

    if config.max_retries < 1 || config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 1 and 10, got {}",
            config.max_retries
        )));
    }

    check_range(
        "page-delay",
        config.page_delay_min_ms,
        config.page_delay_max_ms,
    )?;
    check_range(
        "category-delay",
        config.category_delay_min_ms,
        config.category_delay_max_ms,
    )?;

    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.viewport_width == 0 || config.viewport_height == 0 {
        return Err(ConfigError::Validation(format!(
            "viewport must be non-zero, got {}x{}",
            config.viewport_width, config.viewport_height
        )));
    }

    if config.fetch_timeout_ms < 1_000 {
        return Err(ConfigError::Validation(format!(
            "fetch-timeout-ms must be >= 1000ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if config.settle_ms >= config.fetch_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "settle-ms ({}ms) must be shorter than fetch-timeout-ms ({}ms)",
            config.settle_ms, config.fetch_timeout_ms
        )));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for endpoint in &config.endpoints {
        let url = Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid proxy endpoint '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https" | "socks5") {
            return Err(ConfigError::Validation(format!(
                "Proxy endpoint '{}' must use http, https or socks5",
                endpoint
            )));
        }
    }

    validate_http_url("probe-url", &config.probe_url)?;

    if config.probe_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "probe-timeout-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.redis_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid redis-url: {}", e)))?;
    if !matches!(url.scheme(), "redis" | "rediss") {
        return Err(ConfigError::Validation(format!(
            "redis-url must use the redis:// or rediss:// scheme, got '{}'",
            config.redis_url
        )));
    }

    if config.jobs_key.is_empty() || config.results_key.is_empty() {
        return Err(ConfigError::Validation(
            "jobs-key and results-key cannot be empty".to_string(),
        ));
    }

    if config.jobs_key == config.results_key {
        return Err(ConfigError::Validation(
            "jobs-key and results-key must differ".to_string(),
        ));
    }

    if config.dequeue_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "dequeue-timeout-ms must be >= 100ms, got {}ms",
            config.dequeue_timeout_ms
        )));
    }

    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.backup_path.is_empty() {
        return Err(ConfigError::Validation(
            "backup-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_monitoring_config(config: &MonitoringConfig) -> Result<(), ConfigError> {
    if let Some(listen) = &config.metrics_listen {
        listen.parse::<std::net::SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!("metrics-listen '{}' is not an address: {}", listen, e))
        })?;
    }

    if let Some(webhook) = &config.alert_webhook_url {
        validate_http_url("alert-webhook-url", webhook)?;
    }

    Ok(())
}

fn validate_categories(categories: &[CategoryEntry]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();

    for entry in categories {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Category name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate category '{}'",
                entry.name
            )));
        }

        validate_http_url(&format!("category '{}'", entry.name), &entry.url)?;
    }

    Ok(())
}

/// Parses a URL and requires an http(s) scheme
fn validate_http_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(url)
}

fn check_range(name: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{}-min-ms ({}) must not exceed {}-max-ms ({})",
            name, min, name, max
        )));
    }
    Ok(())
}
