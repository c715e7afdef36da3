use crate::config::types::{Config, CrawlerConfig, EnvironmentsConfig, OutputConfig, TargetsConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_environments(&config.environments)?;
    validate_targets(&config.targets)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > 100 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and 100, got {}",
            config.batch_size
        )));
    }

    if config.max_concurrent_pages_open < 1 || config.max_concurrent_pages_open > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_pages_open must be between 1 and 100, got {}",
            config.max_concurrent_pages_open
        )));
    }

    if config.request_timeout < 1000 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1000ms, got {}ms",
            config.request_timeout
        )));
    }

    Ok(())
}

/// Validates the control and experimental hosts
fn validate_environments(config: &EnvironmentsConfig) -> Result<(), ConfigError> {
    validate_host("control_host", &config.control_host)?;
    validate_host("experimental_host", &config.experimental_host)?;
    Ok(())
}

fn validate_host(name: &str, host: &str) -> Result<(), ConfigError> {
    let url = Url::parse(host)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, host, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            name, host
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            name, host
        )));
    }

    Ok(())
}

/// Validates canonical target URLs
fn validate_targets(config: &TargetsConfig) -> Result<(), ConfigError> {
    for entry in &config.urls {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Validation(
                "target urls cannot contain empty entries".to_string(),
            ));
        }

        if trimmed.starts_with('/') {
            continue;
        }

        let url = Url::parse(trimmed).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid target URL '{}': {}", trimmed, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Target URL '{}' must use http or https",
                trimmed
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if matches!(config.export_dir.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "export_dir cannot be empty when set".to_string(),
        ));
    }

    if matches!(config.snapshot_dir.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "snapshot_dir cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}
