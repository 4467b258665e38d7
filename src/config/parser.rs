use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Environment variable overriding `[queue] redis-url`
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Environment variable overriding `[output] database-path`
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

/// Loads and parses a configuration file from the given path
///
/// Connection settings may be overridden from the environment
/// (`REDIS_URL`, `DATABASE_PATH`) before validation runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use shelf_harvester::config::load_config;
///
/// let config = load_config(Path::new("harvester.toml")).unwrap();
/// println!("Max retries: {}", config.harvest.max_retries);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Parses TOML content without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Applies environment overrides through the given lookup
fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(REDIS_URL_ENV).filter(|v| !v.is_empty()) {
        tracing::debug!("Overriding redis-url from {}", REDIS_URL_ENV);
        config.queue.redis_url = url;
    }

    if let Some(path) = lookup(DATABASE_PATH_ENV).filter(|v| !v.is_empty()) {
        tracing::debug!("Overriding database-path from {}", DATABASE_PATH_ENV);
        config.output.database_path = path;
    }
}
