//! Shelf-Harvester: a resilient product-listing harvester
//!
//! This crate pulls structured product records out of paginated retail search
//! pages. Pages are rendered in a headless browser (optionally through a proxy),
//! fields are resolved through ordered fallback chains, and jobs are spread over
//! any number of workers through a shared queue.

pub mod config;
pub mod harvest;
pub mod monitoring;
pub mod output;
pub mod queue;
pub mod storage;
pub mod worker;

use thiserror::Error;

/// Main error type for harvesting operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch timed out for {url}")]
    FetchTimeout { url: String },

    #[error("Navigation failed for {url}: {message}")]
    FetchNavigation { url: String, message: String },

    #[error("No usable proxy endpoint available")]
    ProxyUnavailable,

    #[error("Page {page} yielded no records")]
    ExtractionEmpty { page: u32 },

    #[error("Harvest of category '{category}' found no records")]
    SessionFailed { category: String },

    #[error("Queue unavailable: {0}")]
    QueueUnavailable(#[from] queue::QueueError),

    #[error("Storage write failed: {0}")]
    StorageWrite(#[from] storage::StorageError),

    #[error("Invalid CSS selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job task ended abnormally: {0}")]
    WorkerTask(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: harvest::SessionState,
        to: harvest::SessionState,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Stable label used for the `errors{type}` metric
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::FetchTimeout { .. } => "fetch_timeout",
            Self::FetchNavigation { .. } => "fetch_navigation",
            Self::ProxyUnavailable => "proxy_unavailable",
            Self::ExtractionEmpty { .. } => "extraction_empty",
            Self::SessionFailed { .. } => "session_failed",
            Self::QueueUnavailable(_) => "queue_unavailable",
            Self::StorageWrite(_) => "storage_write",
            Self::Selector { .. } => "selector",
            Self::InvalidJob(_) => "invalid_job",
            Self::WorkerTask(_) => "queue_worker_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::UrlParse(_) => "url_parse",
            Self::Io(_) => "io",
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvesting operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use harvest::{Extractor, HarvestContext, HarvestSession, Listing, Record};
pub use queue::{HarvestResult, HarvestStatus, Job, JobQueue};
pub use worker::Worker;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        let err = HarvestError::FetchTimeout {
            url: "https://example.com".to_string(),
        };
        assert_eq!(err.kind(), "fetch_timeout");
        assert_eq!(HarvestError::ProxyUnavailable.kind(), "proxy_unavailable");
    }
}
