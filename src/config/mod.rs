//! Configuration module for Shelf-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use shelf_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Harvesting {} categories", config.categories.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, CategoryEntry, Config, HarvestConfig, MonitoringConfig, OutputConfig,
    ProxyConfig, QueueConfig,
};

// Re-export parser functions
pub use parser::{load_config, parse_config, DATABASE_PATH_ENV, REDIS_URL_ENV};
pub use validation::validate;
